use std::future::Future;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use poolnode_rpc::{ChunkStream, RpcError};

use super::StreamOptions;
use crate::DiskError;

/// Read half of a remote file.
///
/// A background task pulls frames from the coordinator into a bounded queue; `read`
/// reassembles them into byte slices of the requested size.
pub struct DiskReader {
    queue: mpsc::Receiver<Result<Vec<u8>, RpcError>>,
    buffer: Vec<u8>,
    exhausted: bool,
    pump: Option<JoinHandle<()>>,
}

impl DiskReader {
    pub(crate) fn spawn<Fut>(options: &StreamOptions, open: Fut) -> Self
    where
        Fut: Future<Output = Result<ChunkStream, RpcError>> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(options.queue_capacity.max(1));
        let pump = tokio::spawn(async move {
            let mut chunks = match open.await {
                Ok(chunks) => chunks,
                Err(e) => {
                    let _ = tx.send(Err(e)).await;
                    return;
                }
            };
            loop {
                let chunk = tokio::select! {
                    _ = tx.closed() => break,
                    chunk = chunks.next() => chunk,
                };
                let Some(chunk) = chunk else { break };
                let failed = chunk.is_err();
                if tx.send(chunk).await.is_err() || failed {
                    break;
                }
            }
        });

        Self {
            queue: rx,
            buffer: Vec::new(),
            exhausted: false,
            pump: Some(pump),
        }
    }

    /// Up to `n` bytes. Returns fewer only when the stream has ended; an empty result means end of file.
    pub async fn read(&mut self, n: usize) -> Result<Vec<u8>, DiskError> {
        while self.buffer.len() < n && !self.exhausted {
            match self.queue.recv().await {
                Some(Ok(chunk)) => self.buffer.extend_from_slice(&chunk),
                Some(Err(e)) => {
                    self.exhausted = true;
                    return Err(e.into());
                }
                None => self.exhausted = true,
            }
        }
        let take = n.min(self.buffer.len());
        Ok(self.buffer.drain(..take).collect())
    }

    /// Everything left in the stream.
    pub async fn read_to_end(&mut self) -> Result<Vec<u8>, DiskError> {
        while !self.exhausted {
            match self.queue.recv().await {
                Some(Ok(chunk)) => self.buffer.extend_from_slice(&chunk),
                Some(Err(e)) => {
                    self.exhausted = true;
                    return Err(e.into());
                }
                None => self.exhausted = true,
            }
        }
        Ok(std::mem::take(&mut self.buffer))
    }

    /// Stops consumption and waits for the background task. Idempotent.
    pub async fn close(&mut self) -> Result<(), DiskError> {
        self.exhausted = true;
        self.queue.close();
        if let Some(pump) = self.pump.take() {
            pump.await.map_err(|e| DiskError::Task(e.to_string()))?;
        }
        Ok(())
    }
}
