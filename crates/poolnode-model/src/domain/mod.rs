mod job;
pub use job::{Job, JobInput, JobParam};

mod filter;
pub use filter::JobFilter;

mod price;
pub use price::Price;

mod node;
pub use node::NodeMeta;

mod level;
pub use level::{LogLevel, ParseLevelError};

/// Identifier of a job as issued by the coordinator.
pub type JobId = String;

/// Absolute timestamp in milliseconds since the unix epoch.
///
/// `0` is reserved for "never" wherever an expiry is expected.
pub type EpochMillis = u64;
