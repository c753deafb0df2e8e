use async_trait::async_trait;

use poolnode_model::{NodeMeta, RunnerConfig};

use crate::{JobContext, RunnerError};

/// A pluggable job handler.
///
/// For every job the node calls `can_run`, then (after accepting the job) `pre_run`,
/// `run` and `post_run`. The string returned by `run` is the job output sent to the
/// coordinator. Any error after acceptance cancels the job with the error text as reason.
#[async_trait]
pub trait Runner: Send + Sync + 'static {
    /// Declaration announced to the coordinator and used to filter jobs.
    fn config(&self) -> &RunnerConfig;

    fn name(&self) -> &str {
        self.config().name()
    }

    /// Jobs of a parallel runner are spawned instead of awaited by the poll loop.
    fn run_in_parallel(&self) -> bool {
        false
    }

    /// Called once, before the first poll for this runner.
    async fn init(&self, _node: &NodeMeta) -> Result<(), RunnerError> {
        Ok(())
    }

    async fn can_run(&self, _ctx: &JobContext) -> Result<bool, RunnerError> {
        Ok(true)
    }

    async fn pre_run(&self, _ctx: &JobContext) -> Result<(), RunnerError> {
        Ok(())
    }

    async fn run(&self, ctx: &JobContext) -> Result<String, RunnerError>;

    async fn post_run(&self, _ctx: &JobContext) -> Result<(), RunnerError> {
        Ok(())
    }

    /// Idle hook, called once per tick of the node.
    async fn tick(&self) {}
}
