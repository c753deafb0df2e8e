use poolnode_rpc::RpcError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DiskError {
    #[error("rpc error: {0}")]
    Rpc(#[from] RpcError),

    #[error("disk {0} is closed")]
    Closed(String),

    #[error("stream is closed")]
    StreamClosed,

    #[error("stream ended after {actual} of {expected} bytes")]
    UnexpectedEof { expected: usize, actual: usize },

    #[error("string of {0} bytes does not fit a 32-bit length prefix")]
    StringTooLong(usize),

    #[error("invalid utf-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    #[error("stream task failed: {0}")]
    Task(String),
}
