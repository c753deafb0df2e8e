use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::{Mutex, mpsc};
use tokio_stream::wrappers::ReceiverStream;
use tonic::service::interceptor::InterceptedService;
use tonic::transport::{Channel, ClientTlsConfig, Endpoint};
use tracing::{debug, info, warn};

use poolnode_model::{Job, NodeMeta};

use crate::proto::{self, pool_connector_client::PoolConnectorClient};
use crate::{
    CacheChunk, CacheChunkStream, CacheEntryHeader, CallMetadata, ChunkStream, CreateDisk,
    FrameStream, PendingJobsQuery, Pool, PoolConfig, RpcError, TemplateAnnouncement,
};

type Client = PoolConnectorClient<InterceptedService<Channel, CallMetadata>>;

/// Requests buffered between the frame producer and the outbound gRPC stream.
const REQUEST_QUEUE: usize = 4;

/// Moves `frames` onto a bounded queue and turns every frame into a request.
///
/// The returned stream ends when `frames` does, or stops early if tonic drops it.
fn request_stream<T, F>(mut frames: FrameStream, mut request: F) -> ReceiverStream<T>
where
    T: Send + 'static,
    F: FnMut(Vec<u8>) -> T + Send + 'static,
{
    let (tx, rx) = mpsc::channel(REQUEST_QUEUE);
    tokio::spawn(async move {
        while let Some(data) = frames.next().await {
            if tx.send(request(data)).await.is_err() {
                break;
            }
        }
    });
    ReceiverStream::new(rx)
}

/// gRPC connection to the coordinator, shared by every task of a node.
///
/// The client is created on first use and dropped whenever a call reports a lost
/// connection, so the next call reconnects. Retrying is left to the caller.
pub struct GrpcPool {
    cfg: PoolConfig,
    metadata: CallMetadata,
    client: Mutex<Option<Client>>,
}

impl GrpcPool {
    pub fn new(cfg: PoolConfig) -> Result<Self, RpcError> {
        let metadata = CallMetadata::from_config(&cfg)?;
        Ok(Self {
            cfg,
            metadata,
            client: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &PoolConfig {
        &self.cfg
    }

    fn endpoint(&self) -> Result<Endpoint, RpcError> {
        let uri = self.cfg.endpoint_uri();
        let endpoint = Endpoint::from_shared(uri.clone())
            .map_err(|e| RpcError::InvalidEndpoint(format!("{uri}: {e}")))?
            .connect_timeout(self.cfg.connect_timeout);

        if self.cfg.ssl {
            Ok(endpoint.tls_config(ClientTlsConfig::new().with_native_roots())?)
        } else {
            Ok(endpoint)
        }
    }

    async fn client(&self) -> Result<Client, RpcError> {
        let mut slot = self.client.lock().await;
        if let Some(client) = slot.as_ref() {
            return Ok(client.clone());
        }

        info!(endpoint = %self.cfg.endpoint_uri(), ssl = self.cfg.ssl, "connecting to pool");
        let channel = self.endpoint()?.connect().await?;
        let client = PoolConnectorClient::with_interceptor(channel, self.metadata.clone())
            .max_decoding_message_size(self.cfg.max_message_bytes)
            .max_encoding_message_size(self.cfg.max_message_bytes);

        *slot = Some(client.clone());
        Ok(client)
    }

    /// Drops the cached client if `result` shows the connection is gone.
    async fn observe<T>(&self, result: Result<T, tonic::Status>) -> Result<T, RpcError> {
        let err = match result {
            Ok(value) => return Ok(value),
            Err(status) => RpcError::from(status),
        };
        if err.is_connection_lost() {
            warn!(error = %err, "pool connection lost; reconnecting on next call");
            self.client.lock().await.take();
        }
        Err(err)
    }
}

#[async_trait]
impl Pool for GrpcPool {
    async fn announce_node(&self, node: &NodeMeta) -> Result<u64, RpcError> {
        let mut client = self.client().await?;
        let request = proto::AnnounceNodeRequest {
            icon_url: node.icon.clone(),
            name: node.name.clone(),
            description: node.description.clone(),
            version: node.version.clone(),
        };
        let response = self.observe(client.announce_node(request).await).await?;
        Ok(response.into_inner().refresh_interval)
    }

    async fn announce_template(&self, template: &TemplateAnnouncement) -> Result<u64, RpcError> {
        let mut client = self.client().await?;
        let request = proto::AnnounceTemplateRequest {
            meta: template.meta.clone(),
            template: template.template.clone(),
            sockets: template.sockets.clone(),
        };
        let response = self
            .observe(client.announce_event_template(request).await)
            .await?;
        Ok(response.into_inner().refresh_interval)
    }

    async fn pending_jobs(&self, query: &PendingJobsQuery) -> Result<Vec<Job>, RpcError> {
        let mut client = self.client().await?;
        let request = proto::GetPendingJobsRequest {
            filters: query.filters.iter().map(proto::JobFilter::from).collect(),
            prices: query.prices.iter().map(proto::Price::from).collect(),
            wait: query.wait_ms,
            exclude_id: query.exclude_ids.clone(),
        };
        let response = self.observe(client.get_pending_jobs(request).await).await?;
        Ok(response
            .into_inner()
            .jobs
            .into_iter()
            .map(Job::from)
            .collect())
    }

    async fn accept_job(&self, job_id: &str) -> Result<(), RpcError> {
        let mut client = self.client().await?;
        let request = proto::AcceptJobRequest {
            job_id: job_id.to_string(),
        };
        self.observe(client.accept_job(request).await).await?;
        Ok(())
    }

    async fn cancel_job(&self, job_id: &str, reason: &str) -> Result<(), RpcError> {
        let mut client = self.client().await?;
        let request = proto::CancelJobRequest {
            job_id: job_id.to_string(),
            reason: reason.to_string(),
        };
        self.observe(client.cancel_job(request).await).await?;
        Ok(())
    }

    async fn complete_job(&self, job_id: &str, output: &str) -> Result<(), RpcError> {
        let mut client = self.client().await?;
        let request = proto::CompleteJobRequest {
            job_id: job_id.to_string(),
            output: output.to_string(),
        };
        self.observe(client.complete_job(request).await).await?;
        Ok(())
    }

    async fn log_for_job(&self, job_id: &str, text: &str) -> Result<(), RpcError> {
        let mut client = self.client().await?;
        let request = proto::JobLogRequest {
            job_id: job_id.to_string(),
            log: text.to_string(),
        };
        self.observe(client.log_for_job(request).await).await?;
        Ok(())
    }

    async fn open_disk(&self, url: &str) -> Result<String, RpcError> {
        let mut client = self.client().await?;
        let request = proto::OpenDiskRequest {
            url: url.to_string(),
        };
        let response = self.observe(client.open_disk(request).await).await?;
        Ok(response.into_inner().disk_id)
    }

    async fn create_disk(&self, request: &CreateDisk) -> Result<String, RpcError> {
        let mut client = self.client().await?;
        let request = proto::CreateDiskRequest {
            name: request.name.clone(),
            encryption_key: request.encryption_key.clone(),
            include_encryption_key_in_url: request.include_key_in_url,
        };
        let response = self.observe(client.create_disk(request).await).await?;
        Ok(response.into_inner().url)
    }

    async fn close_disk(&self, disk_id: &str) -> Result<(), RpcError> {
        let mut client = self.client().await?;
        let request = proto::CloseDiskRequest {
            disk_id: disk_id.to_string(),
        };
        let response = self.observe(client.close_disk(request).await).await?;
        if !response.into_inner().success {
            return Err(RpcError::Rejected(format!("close disk {disk_id}")));
        }
        Ok(())
    }

    async fn disk_list_files(&self, disk_id: &str, prefix: &str) -> Result<Vec<String>, RpcError> {
        let mut client = self.client().await?;
        let request = proto::DiskListFilesRequest {
            disk_id: disk_id.to_string(),
            path: prefix.to_string(),
        };
        let response = self.observe(client.disk_list_files(request).await).await?;
        Ok(response.into_inner().files)
    }

    async fn disk_delete_file(&self, disk_id: &str, path: &str) -> Result<bool, RpcError> {
        let mut client = self.client().await?;
        let request = proto::DiskDeleteFileRequest {
            disk_id: disk_id.to_string(),
            path: path.to_string(),
        };
        let response = self.observe(client.disk_delete_file(request).await).await?;
        Ok(response.into_inner().success)
    }

    async fn disk_write_file(
        &self,
        disk_id: &str,
        path: &str,
        frames: FrameStream,
    ) -> Result<bool, RpcError> {
        let mut client = self.client().await?;
        let (disk_id, path) = (disk_id.to_string(), path.to_string());
        let requests = request_stream(frames, move |data| proto::DiskWriteFileRequest {
            disk_id: disk_id.clone(),
            path: path.clone(),
            data,
        });
        let response = self.observe(client.disk_write_file(requests).await).await?;
        Ok(response.into_inner().success)
    }

    async fn disk_read_file(&self, disk_id: &str, path: &str) -> Result<ChunkStream, RpcError> {
        let mut client = self.client().await?;
        let request = proto::DiskReadFileRequest {
            disk_id: disk_id.to_string(),
            path: path.to_string(),
        };
        let stream = self.observe(client.disk_read_file(request).await).await?;
        debug!(disk_id, path, "disk read stream opened");
        Ok(stream
            .into_inner()
            .map(|frame| frame.map(|f| f.data).map_err(RpcError::from))
            .boxed())
    }

    async fn cache_set(
        &self,
        header: &CacheEntryHeader,
        frames: FrameStream,
    ) -> Result<bool, RpcError> {
        let mut client = self.client().await?;
        let header = header.clone();
        let requests = request_stream(frames, move |data| proto::CacheSetRequest {
            key: header.key.clone(),
            data,
            version: header.version,
            expire_at: header.expire_at,
        });
        let response = self.observe(client.cache_set(requests).await).await?;
        Ok(response.into_inner().success)
    }

    async fn cache_get(&self, key: &str, last_version: u64) -> Result<CacheChunkStream, RpcError> {
        let mut client = self.client().await?;
        let request = proto::CacheGetRequest {
            key: key.to_string(),
            last_version,
        };
        let stream = self.observe(client.cache_get(request).await).await?;
        Ok(stream
            .into_inner()
            .map(|frame| {
                frame
                    .map(|f| CacheChunk {
                        exists: f.exists,
                        data: f.data,
                    })
                    .map_err(RpcError::from)
            })
            .boxed())
    }
}
