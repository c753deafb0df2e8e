//! Remote batching log sink.
//!
//! Events are turned into json objects by [`RemoteSinkLayer`] and shipped in batches to
//! `{endpoint}/api/{org}/{stream}/_json` by a background task.

mod flush;
mod layer;

pub use layer::RemoteSinkLayer;

use std::time::Duration;

use crate::logger::normalize_level;

pub const DEFAULT_BATCH_SIZE: usize = 21;
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(5000);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkAuth {
    None,
    /// Already base64 encoded `user:password`.
    Encoded(String),
    Credentials { username: String, password: String },
}

#[derive(Debug, Clone)]
pub struct SinkConfig {
    pub endpoint: String,
    pub org: String,
    pub stream: String,
    pub auth: SinkAuth,
    pub batch_size: usize,
    pub flush_interval: Duration,
    /// Filter applied to the sink only.
    pub level: String,
    pub app_name: String,
    pub app_version: String,
}

impl SinkConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            org: "default".to_string(),
            stream: "default".to_string(),
            auth: SinkAuth::None,
            batch_size: DEFAULT_BATCH_SIZE,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            level: "info".to_string(),
            app_name: String::new(),
            app_version: String::new(),
        }
    }

    pub fn url(&self) -> String {
        format!(
            "{}/api/{}/{}/_json",
            self.endpoint.trim_end_matches('/'),
            self.org,
            self.stream
        )
    }

    /// `None` unless `LOG_SINK_ENDPOINT` is set.
    pub(crate) fn from_lookup(
        lookup: &impl Fn(&str) -> Option<String>,
        default_level: &str,
        app_name: &str,
        app_version: &str,
        fallbacks: &mut Vec<String>,
    ) -> Option<Self> {
        let endpoint = lookup("LOG_SINK_ENDPOINT").filter(|e| !e.trim().is_empty())?;
        let mut cfg = Self::new(endpoint.trim());
        let set = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(org) = set("LOG_SINK_ORG") {
            cfg.org = org;
        }
        if let Some(stream) = set("LOG_SINK_STREAM") {
            cfg.stream = stream;
        }
        cfg.auth = match (set("LOG_SINK_BASICAUTH"), set("LOG_SINK_USERNAME"), set("LOG_SINK_PASSWORD")) {
            (Some(encoded), _, _) => SinkAuth::Encoded(encoded),
            (None, Some(username), Some(password)) => SinkAuth::Credentials { username, password },
            _ => SinkAuth::None,
        };
        if let Some(raw) = set("LOG_SINK_BATCHSIZE") {
            match raw.trim().parse::<usize>() {
                Ok(n) if n > 0 => cfg.batch_size = n,
                _ => fallbacks.push(format!(
                    "LOG_SINK_BATCHSIZE={raw:?} is not a positive integer; using {DEFAULT_BATCH_SIZE}"
                )),
            }
        }
        if let Some(raw) = set("LOG_SINK_FLUSHINTERVAL") {
            match raw.trim().parse::<u64>() {
                Ok(ms) if ms > 0 => cfg.flush_interval = Duration::from_millis(ms),
                _ => fallbacks.push(format!(
                    "LOG_SINK_FLUSHINTERVAL={raw:?} is not a positive integer; using {}",
                    DEFAULT_FLUSH_INTERVAL.as_millis()
                )),
            }
        }
        cfg.level = set("LOG_SINK_LEVEL")
            .map(|l| normalize_level(&l))
            .unwrap_or_else(|| default_level.to_string());
        cfg.app_name = app_name.to_string();
        cfg.app_version = app_version.to_string();
        Some(cfg)
    }
}
