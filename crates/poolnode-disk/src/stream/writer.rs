use std::future::Future;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use poolnode_rpc::{FrameStream, RpcError};

use super::{StreamOptions, queue_frames};
use crate::DiskError;

/// Write half of a remote file.
///
/// `write` enqueues a payload and suspends while the queue is full. The upload runs in a
/// background task that re-chunks queued payloads into frames of at most `chunk_size` bytes.
/// `close` ends the stream and waits for the coordinator's answer.
pub struct DiskWriter {
    queue: Option<mpsc::Sender<Vec<u8>>>,
    upload: Option<JoinHandle<Result<bool, RpcError>>>,
    outcome: Option<bool>,
}

impl DiskWriter {
    pub(crate) fn spawn<F, Fut>(options: &StreamOptions, upload: F) -> Self
    where
        F: FnOnce(FrameStream) -> Fut,
        Fut: Future<Output = Result<bool, RpcError>> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(options.queue_capacity.max(1));
        let frames = queue_frames(rx, options.chunk_size.max(1));
        Self {
            queue: Some(tx),
            upload: Some(tokio::spawn(upload(frames))),
            outcome: None,
        }
    }

    /// Fails with [`DiskError::StreamClosed`] after `end`/`close` or once the upload is gone.
    pub async fn write(&mut self, bytes: impl Into<Vec<u8>>) -> Result<(), DiskError> {
        let queue = self.queue.as_ref().ok_or(DiskError::StreamClosed)?;
        queue
            .send(bytes.into())
            .await
            .map_err(|_| DiskError::StreamClosed)
    }

    /// Marks the end of the payload; queued data is still uploaded.
    pub fn end(&mut self) {
        self.queue.take();
    }

    /// Ends the stream and returns the coordinator's answer. Calling it again returns the same answer.
    pub async fn close(&mut self) -> Result<bool, DiskError> {
        self.end();
        if let Some(outcome) = self.outcome {
            return Ok(outcome);
        }
        let Some(upload) = self.upload.take() else {
            return Ok(false);
        };

        let result = match upload.await {
            Ok(result) => result.map_err(DiskError::from),
            Err(e) => Err(DiskError::Task(e.to_string())),
        };
        let outcome = *result.as_ref().unwrap_or(&false);
        self.outcome = Some(outcome);
        debug!(success = outcome, "disk write stream closed");
        result
    }
}
