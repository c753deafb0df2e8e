mod meta;
pub use meta::RunnerMeta;

mod config;
pub use config::RunnerConfig;
