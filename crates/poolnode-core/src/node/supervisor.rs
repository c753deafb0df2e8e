use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

use poolnode_model::Job;

use super::{Node, Registration};
use crate::{CoreError, JobContext, Runner, RunnerError};

/// Poll loop of one registration: fetch jobs, dispatch them in order, repeat.
pub(super) struct RunnerSupervisor {
    node: Node,
    reg: Arc<Registration>,
}

impl RunnerSupervisor {
    pub(super) fn new(node: Node, reg: Arc<Registration>) -> Self {
        Self { node, reg }
    }

    pub(super) async fn run(self, token: CancellationToken) {
        let runner = self.reg.name().to_string();
        loop {
            if token.is_cancelled() {
                break;
            }
            if !self.node.is_registered(self.reg.id).await {
                debug!(runner = %runner, "registration revoked; supervisor exiting");
                break;
            }
            if let Err(e) = self.cycle(&token).await {
                error!(runner = %runner, error = %e, "poll cycle failed");
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(self.node.cfg.error_backoff) => {}
                }
            }
        }
        debug!(runner = %runner, "supervisor stopped");
    }

    async fn cycle(&self, token: &CancellationToken) -> Result<(), CoreError> {
        let runner = &self.reg.runner;
        self.reg
            .init
            .get_or_try_init(|| guarded("init", runner.init(&self.node.cfg.meta)))
            .await?;

        let query = self.node.poll_query(&self.reg).await;
        let jobs = tokio::select! {
            _ = token.cancelled() => return Ok(()),
            jobs = self.node.pool.pending_jobs(&query) => jobs?,
        };
        if jobs.is_empty() {
            trace!(runner = runner.name(), "no pending jobs");
            return Ok(());
        }
        debug!(runner = runner.name(), count = jobs.len(), "pending jobs");

        for job in jobs {
            self.dispatch(job).await;
        }
        Ok(())
    }

    /// Takes one job through can_run, accept and pre_run, then runs it inline or spawned.
    async fn dispatch(&self, job: Job) {
        let started = Instant::now();
        let runner = Arc::clone(&self.reg.runner);
        let ctx = self.node.job_context(&self.reg, job);

        match guarded("can_run", runner.can_run(&ctx)).await {
            Ok(true) => {}
            Ok(false) => {
                trace!(runner = runner.name(), job_id = ctx.job_id(), "job skipped");
                ctx.close().await;
                return;
            }
            Err(e) => {
                self.node.lock_job(ctx.job_id()).await;
                fail(&self.node, &ctx, started, e, false).await;
                return;
            }
        }

        self.node.lock_job(ctx.job_id()).await;
        if let Err(e) = self.node.pool.accept_job(ctx.job_id()).await {
            fail(&self.node, &ctx, started, e.into(), false).await;
            return;
        }
        ctx.logger()
            .info(format!("job started on node {}", self.node.cfg.meta.name));

        if let Err(e) = guarded("pre_run", runner.pre_run(&ctx)).await {
            fail(&self.node, &ctx, started, e, true).await;
            return;
        }

        let execution = execute(self.node.clone(), runner, ctx, started);
        if self.reg.runner.run_in_parallel() {
            tokio::spawn(execution);
        } else {
            execution.await;
        }
    }
}

/// Awaits one runner hook; a panic inside it becomes a [`RunnerError::Failed`].
pub(super) async fn guarded<T>(
    hook: &'static str,
    fut: impl Future<Output = Result<T, RunnerError>>,
) -> Result<T, RunnerError> {
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => Err(RunnerError::failed(format!(
            "{hook} panicked: {}",
            panic_message(&*panic)
        ))),
    }
}

pub(super) fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(msg) = panic.downcast_ref::<&'static str>() {
        *msg
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "non-string panic payload"
    }
}

/// run → post_run → complete for an accepted job; the context is closed either way.
async fn execute(node: Node, runner: Arc<dyn Runner>, ctx: JobContext, started: Instant) {
    let result = async {
        let output = guarded("run", runner.run(&ctx)).await?;
        guarded("post_run", runner.post_run(&ctx)).await?;
        node.pool.complete_job(ctx.job_id(), &output).await?;
        Ok::<_, RunnerError>(())
    }
    .await;

    match result {
        Ok(()) => {
            ctx.logger().info(format!(
                "job completed in {} ms on node {}",
                started.elapsed().as_millis(),
                node.cfg.meta.name
            ));
            ctx.close().await;
        }
        Err(e) => fail(&node, &ctx, started, e, true).await,
    }
}

/// Logs the failure, cancels the job if it was accepted and closes the context.
async fn fail(node: &Node, ctx: &JobContext, started: Instant, err: RunnerError, accepted: bool) {
    let elapsed_ms = started.elapsed().as_millis() as u64;
    ctx.logger()
        .error(format!("job failed in {elapsed_ms} ms: {err}"));

    if accepted {
        let mut reason = err.to_string();
        if reason.trim().is_empty() {
            reason = "job failed".to_string();
        }
        if let Err(e) = node.pool.cancel_job(ctx.job_id(), &reason).await {
            warn!(job_id = ctx.job_id(), error = %e, "cancel not delivered");
        }
    }
    ctx.close().await;
}
