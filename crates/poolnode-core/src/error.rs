use poolnode_cache::CacheError;
use poolnode_disk::DiskError;
use poolnode_rpc::RpcError;
use thiserror::Error;

/// Failure raised by runner code; scoped to one job (or to one cycle for `init`).
#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("{0}")]
    Failed(String),

    #[error(transparent)]
    Disk(#[from] DiskError),

    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("job context is closed")]
    ContextClosed,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RunnerError {
    pub fn failed(reason: impl Into<String>) -> Self {
        RunnerError::Failed(reason.into())
    }
}

/// Loop-level failure of the node runtime.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("rpc error: {0}")]
    Rpc(#[from] RpcError),

    #[error("runner init failed: {0}")]
    Init(#[from] RunnerError),

    #[error("runner metadata is not serializable: {0}")]
    Meta(#[from] serde_json::Error),
}
