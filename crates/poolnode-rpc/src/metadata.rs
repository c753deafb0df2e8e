use tonic::metadata::AsciiMetadataValue;
use tonic::service::Interceptor;
use tonic::{Request, Status};

use crate::{PoolConfig, RpcError};

const AUTHORIZATION: &str = "authorization";
const PAYMENT_CREDENTIAL: &str = "payment-credential";

/// Attaches the node's credentials to every outgoing call, unary and streaming alike.
#[derive(Debug, Clone, Default)]
pub struct CallMetadata {
    token: Option<AsciiMetadataValue>,
    payment: Option<AsciiMetadataValue>,
}

impl CallMetadata {
    pub fn from_config(cfg: &PoolConfig) -> Result<Self, RpcError> {
        Ok(Self {
            token: cfg
                .token
                .as_deref()
                .map(|v| ascii(AUTHORIZATION, v))
                .transpose()?,
            payment: cfg
                .payment_credential
                .as_deref()
                .map(|v| ascii(PAYMENT_CREDENTIAL, v))
                .transpose()?,
        })
    }
}

fn ascii(key: &'static str, value: &str) -> Result<AsciiMetadataValue, RpcError> {
    AsciiMetadataValue::try_from(value).map_err(|e| RpcError::InvalidMetadata {
        key,
        reason: e.to_string(),
    })
}

impl Interceptor for CallMetadata {
    fn call(&mut self, mut request: Request<()>) -> Result<Request<()>, Status> {
        if let Some(token) = &self.token {
            request.metadata_mut().insert(AUTHORIZATION, token.clone());
        }
        if let Some(payment) = &self.payment {
            request.metadata_mut().insert(PAYMENT_CREDENTIAL, payment.clone());
        }
        Ok(request)
    }
}
