use std::io::IsTerminal;
use std::str::FromStr;

use crate::logger::format::LoggerFormat;
use crate::sink::SinkConfig;

#[derive(Debug, Clone)]
pub struct LoggerConfig {
    pub format: LoggerFormat,
    /// `EnvFilter` directive, usually a bare level.
    pub level: String,
    pub with_targets: bool,
    pub use_color: bool,
    /// Remote batching sink, enabled when an endpoint is configured.
    pub sink: Option<SinkConfig>,
    /// Values that were malformed and replaced by defaults; reported once the logger is up.
    pub fallbacks: Vec<String>,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            format: LoggerFormat::Text,
            level: "info".to_string(),
            with_targets: true,
            use_color: cfg!(test) || std::io::stdout().is_terminal(),
            sink: None,
            fallbacks: Vec::new(),
        }
    }
}

impl LoggerConfig {
    /// Reads `LOG_LEVEL`, `LOG_FORMAT` and the `LOG_SINK_*` family through `lookup`.
    ///
    /// `app_name`/`app_version` are attached to every entry sent to the remote sink.
    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
        app_name: &str,
        app_version: &str,
    ) -> Self {
        let mut cfg = Self::default();
        if let Some(level) = lookup("LOG_LEVEL").filter(|l| !l.trim().is_empty()) {
            cfg.level = normalize_level(&level);
        }
        if let Some(raw) = lookup("LOG_FORMAT") {
            match LoggerFormat::from_str(&raw) {
                Ok(format) => cfg.format = format,
                Err(e) => cfg.fallbacks.push(format!("LOG_FORMAT: {e}; using text")),
            }
        }
        cfg.sink = SinkConfig::from_lookup(&lookup, &cfg.level, app_name, app_version, &mut cfg.fallbacks);
        cfg
    }
}

/// Maps the legacy `fine`/`finer`/`finest` names onto `trace`; anything else is kept as a directive.
pub(crate) fn normalize_level(level: &str) -> String {
    match level.trim().to_ascii_lowercase().as_str() {
        "fine" | "finer" | "finest" => "trace".to_string(),
        "warning" => "warn".to_string(),
        _ => level.trim().to_string(),
    }
}
