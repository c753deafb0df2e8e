use std::time::Duration;

use tracing::warn;

/// Where the coordinator lives and how the node authenticates against it.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub address: String,
    pub port: u16,
    pub ssl: bool,
    /// Sent as `authorization` metadata on every call.
    pub token: Option<String>,
    /// Sent as `payment-credential` metadata; without it the node is free-tier only.
    pub payment_credential: Option<String>,
    pub max_message_bytes: usize,
    pub connect_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".to_string(),
            port: 5000,
            ssl: false,
            token: None,
            payment_credential: None,
            max_message_bytes: 20 * 1024 * 1024,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl PoolConfig {
    /// Build from `POOL_ADDRESS`, `POOL_PORT`, `POOL_SSL`, `NODE_TOKEN` and
    /// `NODE_PAYMENT_CREDENTIAL` as returned by `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        if let Some(address) = lookup("POOL_ADDRESS").filter(|s| !s.trim().is_empty()) {
            cfg.address = address.trim().to_string();
        }
        if let Some(port) = lookup("POOL_PORT") {
            match port.trim().parse() {
                Ok(port) => cfg.port = port,
                Err(_) => warn!(value = %port, "invalid POOL_PORT, using {}", cfg.port),
            }
        }
        cfg.ssl = lookup("POOL_SSL").is_some_and(|v| v.trim().eq_ignore_ascii_case("true"));
        cfg.token = lookup("NODE_TOKEN").filter(|s| !s.is_empty());
        cfg.payment_credential = lookup("NODE_PAYMENT_CREDENTIAL").filter(|s| !s.is_empty());
        cfg
    }

    pub fn endpoint_uri(&self) -> String {
        let scheme = if self.ssl { "https" } else { "http" };
        format!("{scheme}://{}:{}", self.address, self.port)
    }

    #[inline]
    pub fn is_payable(&self) -> bool {
        self.payment_credential.is_some()
    }
}
