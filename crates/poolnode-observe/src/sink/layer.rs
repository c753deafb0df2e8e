use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

use super::{SinkConfig, flush};
use crate::LoggerError;

/// Crates whose events come from the sink's own HTTP traffic.
const TRANSPORT_TARGETS: &[&str] = &["reqwest", "hyper", "hyper_util", "h2", "rustls", "tower"];

/// Layer that queues every event as a json entry for the remote sink.
pub struct RemoteSinkLayer {
    entries: mpsc::UnboundedSender<Value>,
    app_name: String,
    app_version: String,
}

impl RemoteSinkLayer {
    /// Starts the flush task on the current tokio runtime.
    pub fn spawn(cfg: &SinkConfig) -> Result<Self, LoggerError> {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| LoggerError::RemoteSink(format!("needs a tokio runtime: {e}")))?;
        let (tx, rx) = mpsc::unbounded_channel();
        handle.spawn(flush::run(cfg.clone(), rx));
        Ok(Self::with_sender(tx, &cfg.app_name, &cfg.app_version))
    }

    fn with_sender(entries: mpsc::UnboundedSender<Value>, app_name: &str, app_version: &str) -> Self {
        Self {
            entries,
            app_name: app_name.to_string(),
            app_version: app_version.to_string(),
        }
    }
}

fn level_name(level: &Level) -> &'static str {
    match *level {
        Level::ERROR => "error",
        Level::WARN => "warn",
        Level::INFO => "info",
        Level::DEBUG => "debug",
        Level::TRACE => "trace",
    }
}

fn is_transport(target: &str) -> bool {
    TRANSPORT_TARGETS
        .iter()
        .any(|t| target == *t || target.strip_prefix(t).is_some_and(|rest| rest.starts_with("::")))
}

impl<S: Subscriber> Layer<S> for RemoteSinkLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        if is_transport(meta.target()) {
            return;
        }

        let mut fields = JsonFields::default();
        event.record(&mut fields);
        let mut entry = fields.0;
        entry.entry("message").or_insert_with(|| Value::String(String::new()));
        entry.insert("level".into(), level_name(meta.level()).into());
        entry.insert("_timestamp".into(), now_ms().into());
        entry.insert("target".into(), meta.target().into());
        entry.insert("appName".into(), self.app_name.clone().into());
        entry.insert("appVersion".into(), self.app_version.clone().into());

        let _ = self.entries.send(Value::Object(entry));
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[derive(Default)]
struct JsonFields(Map<String, Value>);

impl Visit for JsonFields {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.0.insert(field.name().into(), format!("{value:?}").into());
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.0.insert(field.name().into(), value.into());
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.0.insert(field.name().into(), value.into());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.0.insert(field.name().into(), value.into());
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.0.insert(field.name().into(), value.into());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.0.insert(field.name().into(), value.into());
    }
}
