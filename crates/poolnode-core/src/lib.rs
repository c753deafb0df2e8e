//! Node runtime: runner contract, per-job context and the poll, announce and tick loops.

pub mod error;
pub use error::{CoreError, RunnerError};

mod runner;
pub use runner::Runner;

mod log;
pub use log::{JobLogger, LogSink, PoolLogSink};

mod locks;
pub use locks::LockSet;

mod config;
pub use config::NodeConfig;

mod context;
pub use context::JobContext;

mod node;
pub use node::{Node, NodeHandle, RegistrationId};

pub use poolnode_cache::now_ms;
