use thiserror::Error;

#[derive(Error, Debug)]
pub enum RpcError {
    #[error("failed to connect to pool: {0}")]
    Transport(#[from] tonic::transport::Error),

    #[error("grpc call failed: {0}")]
    Status(#[source] Box<tonic::Status>),

    #[error("invalid pool endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("invalid call metadata for {key}: {reason}")]
    InvalidMetadata { key: &'static str, reason: String },

    #[error("pool rejected request: {0}")]
    Rejected(String),
}

impl From<tonic::Status> for RpcError {
    fn from(status: tonic::Status) -> Self {
        RpcError::Status(Box::new(status))
    }
}

impl RpcError {
    /// `true` for failures that mean the underlying connection is gone and must be rebuilt.
    pub fn is_connection_lost(&self) -> bool {
        match self {
            RpcError::Transport(_) => true,
            RpcError::Status(status) => status.code() == tonic::Code::Unavailable,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_unavailable_means_reconnect() {
        assert!(RpcError::from(tonic::Status::unavailable("gone")).is_connection_lost());
        assert!(!RpcError::from(tonic::Status::unknown("handler raised")).is_connection_lost());
        assert!(!RpcError::from(tonic::Status::not_found("no disk")).is_connection_lost());
        assert!(!RpcError::Rejected("close disk".into()).is_connection_lost());
    }
}
