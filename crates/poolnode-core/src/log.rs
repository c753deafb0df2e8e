use std::sync::Arc;

use tracing::{debug, error, info, trace, warn};

use poolnode_model::LogLevel;
use poolnode_rpc::Pool;

/// Destination for job log lines besides the local subscriber.
pub trait LogSink: Send + Sync + 'static {
    fn emit(&self, level: LogLevel, text: &str, job_id: Option<&str>);
}

/// Forwards job log lines at `threshold` or above to the coordinator, fire-and-forget.
pub struct PoolLogSink {
    pool: Arc<dyn Pool>,
    threshold: LogLevel,
}

impl PoolLogSink {
    pub fn new(pool: Arc<dyn Pool>) -> Self {
        Self {
            pool,
            threshold: LogLevel::Info,
        }
    }

    pub fn with_threshold(mut self, threshold: LogLevel) -> Self {
        self.threshold = threshold;
        self
    }
}

impl LogSink for PoolLogSink {
    fn emit(&self, level: LogLevel, text: &str, job_id: Option<&str>) {
        let Some(job_id) = job_id else { return };
        if !level.at_least(self.threshold) {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };

        let pool = Arc::clone(&self.pool);
        let (job_id, text) = (job_id.to_string(), text.to_string());
        runtime.spawn(async move {
            if let Err(e) = pool.log_for_job(&job_id, &text).await {
                warn!(job_id = %job_id, error = %e, "job log not delivered");
            }
        });
    }
}

/// Logger handed to runner code through the job context.
///
/// Lines go to the local `tracing` subscriber and to the node's [`LogSink`].
#[derive(Clone)]
pub struct JobLogger {
    runner: String,
    job_id: Option<String>,
    sink: Arc<dyn LogSink>,
}

impl JobLogger {
    pub fn new(runner: impl Into<String>, job_id: Option<String>, sink: Arc<dyn LogSink>) -> Self {
        Self {
            runner: runner.into(),
            job_id,
            sink,
        }
    }

    pub fn job_id(&self) -> Option<&str> {
        self.job_id.as_deref()
    }

    pub fn log(&self, level: LogLevel, text: impl AsRef<str>) {
        let text = text.as_ref();
        let job_id = self.job_id.as_deref().unwrap_or("-");
        match level {
            LogLevel::Error => error!(runner = %self.runner, job_id, "{text}"),
            LogLevel::Warn => warn!(runner = %self.runner, job_id, "{text}"),
            LogLevel::Info => info!(runner = %self.runner, job_id, "{text}"),
            LogLevel::Debug => debug!(runner = %self.runner, job_id, "{text}"),
            LogLevel::Trace => trace!(runner = %self.runner, job_id, "{text}"),
        }
        self.sink.emit(level, text, self.job_id.as_deref());
    }

    pub fn error(&self, text: impl AsRef<str>) {
        self.log(LogLevel::Error, text);
    }

    pub fn warn(&self, text: impl AsRef<str>) {
        self.log(LogLevel::Warn, text);
    }

    pub fn info(&self, text: impl AsRef<str>) {
        self.log(LogLevel::Info, text);
    }

    pub fn debug(&self, text: impl AsRef<str>) {
        self.log(LogLevel::Debug, text);
    }

    pub fn trace(&self, text: impl AsRef<str>) {
        self.log(LogLevel::Trace, text);
    }
}
