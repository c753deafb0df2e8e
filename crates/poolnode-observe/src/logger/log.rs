use time::{UtcOffset, format_description::well_known::Rfc3339};
use tracing::Subscriber;
use tracing_subscriber::{
    EnvFilter, Layer, filter::Filtered, fmt, fmt::time::OffsetTime, layer::SubscriberExt,
    registry::LookupSpan, util::SubscriberInitExt,
};

use crate::logger::{config::LoggerConfig, error::LoggerError};
use crate::sink::RemoteSinkLayer;

pub struct Logger;

impl Logger {
    pub fn text(cfg: &LoggerConfig) -> Result<(), LoggerError> {
        let console = fmt::layer()
            .with_ansi(cfg.use_color)
            .with_target(cfg.with_targets)
            .with_timer(mk_timer())
            .with_filter(mk_filter(&cfg.level)?);

        let subscriber = tracing_subscriber::registry().with(console);
        let subscriber = subscriber.with(mk_sink(cfg)?);
        init_with(subscriber)
    }

    pub fn json(cfg: &LoggerConfig) -> Result<(), LoggerError> {
        let console = fmt::layer()
            .json()
            .with_ansi(false)
            .with_target(cfg.with_targets)
            .with_timer(mk_timer())
            .with_filter(mk_filter(&cfg.level)?);

        let subscriber = tracing_subscriber::registry().with(console);
        let subscriber = subscriber.with(mk_sink(cfg)?);
        init_with(subscriber)
    }

    pub fn journald(cfg: &LoggerConfig) -> Result<(), LoggerError> {
        mk_journald(cfg)
    }
}

fn mk_filter(level: &str) -> Result<EnvFilter, LoggerError> {
    EnvFilter::try_new(level).map_err(|_| LoggerError::InvalidLogLevel(level.to_string()))
}

fn mk_timer() -> OffsetTime<Rfc3339> {
    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
    OffsetTime::new(offset, Rfc3339)
}

/// Remote sink layer with its own filter, if one is configured.
fn mk_sink<S>(
    cfg: &LoggerConfig,
) -> Result<Option<Filtered<RemoteSinkLayer, EnvFilter, S>>, LoggerError>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    let Some(sink) = cfg.sink.as_ref() else {
        return Ok(None);
    };
    let filter = mk_filter(&sink.level)?;
    Ok(Some(RemoteSinkLayer::spawn(sink)?.with_filter(filter)))
}

fn as_error(e: impl std::fmt::Display) -> LoggerError {
    let s = e.to_string();
    if s.contains("SetGlobalDefaultError") || s.contains("global default") {
        LoggerError::AlreadyInitialized
    } else {
        LoggerError::InitializationFailed(s)
    }
}

fn init_with<S>(subscriber: S) -> Result<(), LoggerError>
where
    S: Subscriber + Send + Sync + 'static,
{
    subscriber.try_init().map_err(as_error)
}

#[cfg(all(target_os = "linux", feature = "journald"))]
fn mk_journald(cfg: &LoggerConfig) -> Result<(), LoggerError> {
    let journald = tracing_journald::layer()
        .map_err(|e| LoggerError::InitializationFailed(format!("journald: {e}")))?
        .with_filter(mk_filter(&cfg.level)?);
    let subscriber = tracing_subscriber::registry().with(journald);
    let subscriber = subscriber.with(mk_sink(cfg)?);
    init_with(subscriber)
}

#[cfg(not(all(target_os = "linux", feature = "journald")))]
fn mk_journald(_cfg: &LoggerConfig) -> Result<(), LoggerError> {
    Err(LoggerError::JournaldNotSupported)
}
