use async_trait::async_trait;
use futures::stream::BoxStream;

use poolnode_model::{EpochMillis, Job, JobFilter, NodeMeta, Price};

use crate::RpcError;

/// Outbound payload frames of a client-streaming call, in order.
pub type FrameStream = BoxStream<'static, Vec<u8>>;

/// Inbound payload frames of a server-streaming call, in order.
pub type ChunkStream = BoxStream<'static, Result<Vec<u8>, RpcError>>;

/// Inbound frames of a remote cache lookup.
pub type CacheChunkStream = BoxStream<'static, Result<CacheChunk, RpcError>>;

/// Runner announcement payload. `meta` and `sockets` are json documents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateAnnouncement {
    pub meta: String,
    pub template: String,
    pub sockets: String,
}

/// One long-poll for jobs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingJobsQuery {
    pub filters: Vec<JobFilter>,
    pub prices: Vec<Price>,
    /// Server-side wait before returning an empty answer.
    pub wait_ms: u32,
    /// Job ids the coordinator must not hand out in this answer.
    pub exclude_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateDisk {
    pub name: Option<String>,
    pub encryption_key: Option<String>,
    pub include_key_in_url: bool,
}

/// Key, version and expiry sent with every frame of a remote cache write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheEntryHeader {
    pub key: String,
    pub version: u64,
    /// `0` means never.
    pub expire_at: EpochMillis,
}

/// One frame of a remote cache answer. A frame with `exists == false` means the entry is absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheChunk {
    pub exists: bool,
    pub data: Vec<u8>,
}

/// Everything a node asks of the coordinator.
///
/// The production implementation is [`GrpcPool`](crate::GrpcPool); tests use
/// the in-memory coordinator from the `testing` feature.
#[async_trait]
pub trait Pool: Send + Sync + 'static {
    /// Returns the refresh interval in milliseconds.
    async fn announce_node(&self, node: &NodeMeta) -> Result<u64, RpcError>;

    /// Returns the refresh interval in milliseconds.
    async fn announce_template(&self, template: &TemplateAnnouncement) -> Result<u64, RpcError>;

    async fn pending_jobs(&self, query: &PendingJobsQuery) -> Result<Vec<Job>, RpcError>;

    async fn accept_job(&self, job_id: &str) -> Result<(), RpcError>;

    async fn cancel_job(&self, job_id: &str, reason: &str) -> Result<(), RpcError>;

    async fn complete_job(&self, job_id: &str, output: &str) -> Result<(), RpcError>;

    async fn log_for_job(&self, job_id: &str, text: &str) -> Result<(), RpcError>;

    /// Returns the disk id.
    async fn open_disk(&self, url: &str) -> Result<String, RpcError>;

    /// Returns the url of the new disk.
    async fn create_disk(&self, request: &CreateDisk) -> Result<String, RpcError>;

    async fn close_disk(&self, disk_id: &str) -> Result<(), RpcError>;

    async fn disk_list_files(&self, disk_id: &str, prefix: &str) -> Result<Vec<String>, RpcError>;

    async fn disk_delete_file(&self, disk_id: &str, path: &str) -> Result<bool, RpcError>;

    /// Streams `frames` into `path`; resolves once the coordinator answers.
    async fn disk_write_file(
        &self,
        disk_id: &str,
        path: &str,
        frames: FrameStream,
    ) -> Result<bool, RpcError>;

    async fn disk_read_file(&self, disk_id: &str, path: &str) -> Result<ChunkStream, RpcError>;

    async fn cache_set(
        &self,
        header: &CacheEntryHeader,
        frames: FrameStream,
    ) -> Result<bool, RpcError>;

    async fn cache_get(&self, key: &str, last_version: u64) -> Result<CacheChunkStream, RpcError>;
}
