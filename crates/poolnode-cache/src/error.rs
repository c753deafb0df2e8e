use poolnode_rpc::RpcError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid cache metadata: {0}")]
    Meta(serde_json::Error),

    #[error("invalid cache key: {0:?}")]
    InvalidKey(String),

    #[error("rpc error: {0}")]
    Rpc(#[from] RpcError),

    #[error("value encoding failed: {0}")]
    Encoding(serde_json::Error),
}
