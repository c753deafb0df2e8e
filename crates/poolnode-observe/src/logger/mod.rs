mod config;
mod error;
mod format;
mod log;

pub use config::LoggerConfig;
pub(crate) use config::normalize_level;
pub use error::LoggerError;
pub use format::LoggerFormat;

/// Installs the process-wide subscriber described by `cfg`.
///
/// The remote sink, when configured, must be started from inside a tokio runtime.
pub fn logger_init(cfg: &LoggerConfig) -> Result<(), LoggerError> {
    match cfg.format {
        LoggerFormat::Text => log::Logger::text(cfg)?,
        LoggerFormat::Json => log::Logger::json(cfg)?,
        LoggerFormat::Journald => log::Logger::journald(cfg)?,
    }
    for fallback in &cfg.fallbacks {
        tracing::warn!("{fallback}");
    }
    Ok(())
}
