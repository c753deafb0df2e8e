mod announce;
mod supervisor;
mod tick;

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use futures::FutureExt;
use tokio::sync::{Mutex, OnceCell, RwLock};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use poolnode_cache::Cache;
use poolnode_model::Job;
use poolnode_rpc::{GrpcPool, PendingJobsQuery, Pool};

use crate::{
    CoreError, JobContext, JobLogger, LockSet, LogSink, NodeConfig, PoolLogSink, Runner, now_ms,
};

pub type RegistrationId = u64;

/// One registered runner and its announcement / init state.
pub(crate) struct Registration {
    id: RegistrationId,
    runner: Arc<dyn Runner>,
    /// Epoch millis of the next template announcement.
    next_announce: AtomicU64,
    init: OnceCell<()>,
    supervised: AtomicBool,
}

impl Registration {
    fn name(&self) -> &str {
        self.runner.name()
    }
}

/// A worker node: owns the runner registry and drives the poll, announce and tick loops.
///
/// Cloning is cheap; clones share all state.
#[derive(Clone)]
pub struct Node {
    cfg: Arc<NodeConfig>,
    pool: Arc<dyn Pool>,
    cache: Cache,
    log_sink: Arc<dyn LogSink>,
    registry: Arc<RwLock<Vec<Arc<Registration>>>>,
    locks: Arc<Mutex<LockSet>>,
    next_node_announce: Arc<Mutex<u64>>,
    next_id: Arc<AtomicU64>,
}

impl Node {
    pub fn new(cfg: NodeConfig, pool: Arc<dyn Pool>) -> Self {
        let cache = Cache::new(cfg.cache_dir.clone(), Arc::clone(&pool))
            .with_chunk_size(cfg.stream.chunk_size);
        let log_sink: Arc<dyn LogSink> = Arc::new(PoolLogSink::new(Arc::clone(&pool)));
        let locks = LockSet::new(cfg.lock_ttl);
        Self {
            cfg: Arc::new(cfg),
            pool,
            cache,
            log_sink,
            registry: Arc::new(RwLock::new(Vec::new())),
            locks: Arc::new(Mutex::new(locks)),
            next_node_announce: Arc::new(Mutex::new(0)),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Node talking gRPC to the coordinator described by `cfg.pool`.
    pub fn connect(cfg: NodeConfig) -> Result<Self, CoreError> {
        let pool = GrpcPool::new(cfg.pool.clone())?;
        Ok(Self::new(cfg, Arc::new(pool)))
    }

    /// Replaces the sink job log lines are forwarded to.
    pub fn with_log_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.log_sink = sink;
        self
    }

    pub fn config(&self) -> &NodeConfig {
        &self.cfg
    }

    pub fn pool(&self) -> &Arc<dyn Pool> {
        &self.pool
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    /// Adds a runner. Works before and after `start`; a started node picks it up
    /// within one scan interval. Registering the same instance twice returns the first id.
    pub async fn register_runner(&self, runner: Arc<dyn Runner>) -> RegistrationId {
        let mut registry = self.registry.write().await;
        if let Some(existing) = registry.iter().find(|r| Arc::ptr_eq(&r.runner, &runner)) {
            return existing.id;
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        info!(runner = runner.name(), id, "runner registered");
        registry.push(Arc::new(Registration {
            id,
            runner,
            next_announce: AtomicU64::new(0),
            init: OnceCell::new(),
            supervised: AtomicBool::new(false),
        }));
        id
    }

    /// Revokes every registration of the runner named `name`; their supervisors exit at
    /// the start of their next cycle. Returns whether anything was removed.
    pub async fn unregister_runner(&self, name: &str) -> bool {
        let mut registry = self.registry.write().await;
        let before = registry.len();
        registry.retain(|r| r.name() != name);
        let removed = registry.len() != before;
        if removed {
            info!(runner = name, "runner unregistered");
        }
        removed
    }

    pub async fn runner_names(&self) -> Vec<String> {
        self.registry
            .read()
            .await
            .iter()
            .map(|r| r.name().to_string())
            .collect()
    }

    async fn registrations(&self) -> Vec<Arc<Registration>> {
        self.registry.read().await.clone()
    }

    async fn is_registered(&self, id: RegistrationId) -> bool {
        self.registry.read().await.iter().any(|r| r.id == id)
    }

    /// Excludes `job_id` from polls for the lock window.
    async fn lock_job(&self, job_id: &str) {
        self.locks.lock().await.insert(job_id, now_ms());
    }

    /// Poll request for one runner: its filters, its prices and every currently locked id.
    async fn poll_query(&self, reg: &Registration) -> PendingJobsQuery {
        let exclude_ids = {
            let mut locks = self.locks.lock().await;
            locks.purge(now_ms());
            locks.ids()
        };
        let cfg = reg.runner.config();
        PendingJobsQuery {
            filters: cfg.filters.clone(),
            prices: self.cfg.prices_for(cfg.meta.price.as_ref()),
            wait_ms: self.cfg.poll_wait_ms,
            exclude_ids,
        }
    }

    fn job_context(&self, reg: &Registration, job: Job) -> JobContext {
        let logger = JobLogger::new(reg.name(), Some(job.id.clone()), Arc::clone(&self.log_sink));
        JobContext::new(
            job,
            reg.name(),
            logger,
            self.cache.clone(),
            Arc::clone(&self.pool),
            self.cfg.stream,
        )
    }

    /// Spawns the announcement loop, the tick loop and the registry scan that gives every
    /// registration its own poll supervisor.
    pub fn start(&self) -> NodeHandle {
        let token = CancellationToken::new();
        let tracker = TaskTracker::new();

        info!(
            node = %self.cfg.meta.name,
            version = %self.cfg.meta.version,
            pool = %self.cfg.pool.endpoint_uri(),
            "starting node"
        );
        if !self.cfg.pool.is_payable() {
            warn!("no payment credential configured; advertising free tier only");
        }

        tracker.spawn(self.clone().announce_loop(token.clone()));
        tracker.spawn(self.clone().tick_loop(token.clone()));
        tracker.spawn(self.clone().scan_loop(token.clone(), tracker.clone()));

        NodeHandle { token, tracker }
    }

    async fn scan_loop(self, token: CancellationToken, tracker: TaskTracker) {
        let mut interval = tokio::time::interval(self.cfg.scan_interval);
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = interval.tick() => {}
            }
            for reg in self.registrations().await {
                if reg.supervised.swap(true, Ordering::AcqRel) {
                    continue;
                }
                debug!(runner = reg.name(), "spawning poll supervisor");
                let supervisor = supervisor::RunnerSupervisor::new(self.clone(), Arc::clone(&reg));
                let token = token.clone();
                tracker.spawn(async move {
                    let run = AssertUnwindSafe(supervisor.run(token)).catch_unwind();
                    if let Err(panic) = run.await {
                        error!(
                            runner = reg.name(),
                            "poll supervisor panicked: {}",
                            supervisor::panic_message(&*panic)
                        );
                    }
                    // picked up again by the next scan unless revoked or shutting down
                    reg.supervised.store(false, Ordering::Release);
                });
            }
        }
    }
}

/// Running node. Dropping the handle leaves the loops running; call `shutdown` to stop them.
pub struct NodeHandle {
    token: CancellationToken,
    tracker: TaskTracker,
}

impl NodeHandle {
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn is_running(&self) -> bool {
        !self.token.is_cancelled()
    }

    /// Stops every loop and waits for them. Jobs of parallel runners already in flight are detached.
    pub async fn shutdown(self) {
        self.token.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        info!("node stopped");
    }
}
