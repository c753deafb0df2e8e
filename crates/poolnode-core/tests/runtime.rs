use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use poolnode_core::{JobContext, Node, NodeConfig, Runner, RunnerError};
use poolnode_model::{Job, JobInput, JobParam, RunnerConfig, RunnerMeta};
use poolnode_rpc::Pool;
use poolnode_rpc::testing::MemoryPool;

fn config(dir: &tempfile::TempDir) -> NodeConfig {
    NodeConfig {
        cache_dir: dir.path().to_path_buf(),
        tick_interval: Duration::from_millis(10),
        poll_wait_ms: 50,
        announce_interval: Duration::from_millis(20),
        error_backoff: Duration::from_millis(20),
        scan_interval: Duration::from_millis(10),
        ..NodeConfig::default()
    }
}

fn job(id: &str, text: &str) -> Job {
    Job {
        id: id.to_string(),
        inputs: vec![JobInput {
            data: text.to_string(),
            input_type: "text".into(),
            marker: String::new(),
            source: String::new(),
        }],
        ..Job::default()
    }
}

async fn eventually(what: &str, cond: impl Fn() -> bool) {
    for _ in 0..300 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}

struct Echo {
    cfg: RunnerConfig,
    parallel: bool,
    delay: Duration,
    running: AtomicUsize,
    max_running: AtomicUsize,
    ticks: AtomicUsize,
    inits: AtomicUsize,
}

impl Echo {
    fn new(name: &str) -> Self {
        Self {
            cfg: RunnerConfig::new(RunnerMeta::new(5003, name)),
            parallel: false,
            delay: Duration::ZERO,
            running: AtomicUsize::new(0),
            max_running: AtomicUsize::new(0),
            ticks: AtomicUsize::new(0),
            inits: AtomicUsize::new(0),
        }
    }

    fn parallel(mut self, delay: Duration) -> Self {
        self.parallel = true;
        self.delay = delay;
        self
    }

    fn serial(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl Runner for Echo {
    fn config(&self) -> &RunnerConfig {
        &self.cfg
    }

    fn run_in_parallel(&self) -> bool {
        self.parallel
    }

    async fn init(&self, _node: &poolnode_model::NodeMeta) -> Result<(), RunnerError> {
        self.inits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn can_run(&self, ctx: &JobContext) -> Result<bool, RunnerError> {
        Ok(ctx.param_value("skip").is_none())
    }

    async fn run(&self, ctx: &JobContext) -> Result<String, RunnerError> {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.running.fetch_sub(1, Ordering::SeqCst);

        let input = ctx.input(None).map(|i| i.data.clone()).unwrap_or_default();
        Ok(input.to_uppercase())
    }

    async fn tick(&self) {
        self.ticks.fetch_add(1, Ordering::SeqCst);
    }
}

struct Failing {
    cfg: RunnerConfig,
}

#[async_trait]
impl Runner for Failing {
    fn config(&self) -> &RunnerConfig {
        &self.cfg
    }

    async fn run(&self, ctx: &JobContext) -> Result<String, RunnerError> {
        let disk = ctx.create_storage(Some("scratch"), None, false).await?;
        disk.write_utf8("partial.txt", "half done").await?;
        ctx.open_storage("mem://inputs").await?;
        Err(RunnerError::failed("model exploded"))
    }
}

fn start(pool: &Arc<MemoryPool>, dir: &tempfile::TempDir) -> Node {
    let shared: Arc<dyn Pool> = pool.clone();
    Node::new(config(dir), shared)
}

#[tokio::test]
async fn serial_runner_completes_jobs_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let pool = Arc::new(MemoryPool::new());
    pool.push_job(job("job-1", "hello"));
    pool.push_job(job("job-2", "world"));

    let runner = Arc::new(Echo::new("echo").serial(Duration::from_millis(20)));
    let node = start(&pool, &dir);
    node.register_runner(runner.clone()).await;
    let handle = node.start();

    eventually("two completions", || pool.completed().len() == 2).await;
    assert_eq!(
        pool.completed(),
        vec![
            ("job-1".to_string(), "HELLO".to_string()),
            ("job-2".to_string(), "WORLD".to_string())
        ]
    );
    assert_eq!(pool.accepted(), vec!["job-1".to_string(), "job-2".to_string()]);
    assert_eq!(runner.max_running.load(Ordering::SeqCst), 1);
    assert!(pool.cancelled().is_empty());

    handle.shutdown().await;
    assert_eq!(runner.inits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn parallel_runner_overlaps_jobs() {
    let dir = tempfile::tempdir().unwrap();
    let pool = Arc::new(MemoryPool::new());
    for i in 0..3 {
        pool.push_job(job(&format!("job-{i}"), "x"));
    }

    let runner = Arc::new(Echo::new("echo").parallel(Duration::from_millis(150)));
    let node = start(&pool, &dir);
    node.register_runner(runner.clone()).await;
    let handle = node.start();

    eventually("three completions", || pool.completed().len() == 3).await;
    assert!(runner.max_running.load(Ordering::SeqCst) > 1);
    handle.shutdown().await;
}

#[tokio::test]
async fn failing_job_is_cancelled_once_and_polling_continues() {
    let dir = tempfile::tempdir().unwrap();
    let pool = Arc::new(MemoryPool::new());
    pool.push_job(job("job-bad", "x"));

    let node = start(&pool, &dir);
    node.register_runner(Arc::new(Failing {
        cfg: RunnerConfig::new(RunnerMeta::new(5003, "failing")),
    }))
    .await;
    let handle = node.start();

    eventually("a cancel", || !pool.cancelled().is_empty()).await;
    let polls_after_failure = pool.polls().len();
    eventually("further polls", || pool.polls().len() > polls_after_failure + 2).await;

    let cancelled = pool.cancelled();
    assert_eq!(cancelled.len(), 1);
    assert_eq!(cancelled[0].0, "job-bad");
    assert!(cancelled[0].1.contains("model exploded"));
    assert_eq!(pool.closed_disks().len(), 2);
    assert!(pool.completed().is_empty());

    let logs = pool.logs();
    assert!(logs.iter().any(|(id, text)| id == "job-bad" && text.contains("job failed")));

    handle.shutdown().await;
}

#[tokio::test]
async fn locked_jobs_are_excluded_from_later_polls() {
    let dir = tempfile::tempdir().unwrap();
    let pool = Arc::new(MemoryPool::new());
    pool.push_job(job("job-1", "x"));

    let node = start(&pool, &dir);
    node.register_runner(Arc::new(Echo::new("echo"))).await;
    let handle = node.start();

    eventually("completion", || pool.completed().len() == 1).await;
    eventually("a poll excluding job-1", || {
        pool.polls()
            .iter()
            .any(|q| q.exclude_ids.contains(&"job-1".to_string()))
    })
    .await;
    assert_eq!(pool.polls()[0].wait_ms, 50);
    assert!(pool.polls()[0].exclude_ids.is_empty());
    handle.shutdown().await;
}

#[tokio::test]
async fn skipped_jobs_are_neither_accepted_nor_locked() {
    let dir = tempfile::tempdir().unwrap();
    let pool = Arc::new(MemoryPool::new());
    let mut skipped = job("job-skip", "x");
    skipped.params.push(JobParam {
        key: "skip".into(),
        values: vec!["yes".into()],
    });
    pool.push_job(skipped);

    let node = start(&pool, &dir);
    node.register_runner(Arc::new(Echo::new("echo"))).await;
    let handle = node.start();

    eventually("several polls", || pool.polls().len() > 3).await;
    handle.shutdown().await;

    assert!(pool.accepted().is_empty());
    assert!(pool.cancelled().is_empty());
    assert!(pool.polls().iter().all(|q| q.exclude_ids.is_empty()));
}

#[tokio::test]
async fn poll_errors_back_off_and_recover() {
    let dir = tempfile::tempdir().unwrap();
    let pool = Arc::new(MemoryPool::new());
    pool.fail_polls(2);
    pool.push_job(job("job-1", "late"));

    let node = start(&pool, &dir);
    node.register_runner(Arc::new(Echo::new("echo"))).await;
    let handle = node.start();

    eventually("completion after failures", || pool.completed().len() == 1).await;
    assert!(pool.polls().len() >= 3);
    handle.shutdown().await;
}

#[tokio::test]
async fn announcements_follow_refresh_interval_and_retry() {
    let dir = tempfile::tempdir().unwrap();
    let pool = Arc::new(MemoryPool::new().with_refresh_interval(60_000));
    pool.fail_announcements(1);

    let node = start(&pool, &dir);
    node.register_runner(Arc::new(Echo::new("echo"))).await;

    // first node announcement fails, the template goes through
    node.announce_once().await;
    assert_eq!(pool.node_announcements(), 0);
    assert_eq!(pool.template_announcements().len(), 1);

    // template not due yet; node retried only after the retry delay
    node.announce_once().await;
    assert_eq!(pool.template_announcements().len(), 1);
    tokio::time::sleep(Duration::from_millis(30)).await;
    node.announce_once().await;
    assert_eq!(pool.node_announcements(), 1);
    assert_eq!(pool.template_announcements().len(), 1);

    let template = &pool.template_announcements()[0];
    let meta: serde_json::Value = serde_json::from_str(&template.meta).unwrap();
    assert_eq!(meta["name"], "echo");
}

#[tokio::test]
async fn runners_registered_late_and_unregistered() {
    let dir = tempfile::tempdir().unwrap();
    let pool = Arc::new(MemoryPool::new());
    let node = start(&pool, &dir);
    let handle = node.start();

    let runner = Arc::new(Echo::new("late"));
    let first = node.register_runner(runner.clone()).await;
    assert_eq!(node.register_runner(runner.clone()).await, first);

    pool.push_job(job("job-late", "x"));
    eventually("late runner completes", || pool.completed().len() == 1).await;
    eventually("ticks", || runner.ticks.load(Ordering::SeqCst) > 2).await;

    assert!(node.unregister_runner("late").await);
    assert!(!node.unregister_runner("late").await);
    assert!(node.runner_names().await.is_empty());

    tokio::time::sleep(Duration::from_millis(150)).await;
    pool.push_job(job("job-orphan", "x"));
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(pool.completed().len(), 1);

    handle.shutdown().await;
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Stage {
    CanRun,
    PreRun,
    Run,
    Panic,
    Never,
}

/// Opens one disk per job in `can_run`, then fails at the chosen stage.
struct Staged {
    cfg: RunnerConfig,
    fails_at: Stage,
    parallel: bool,
}

impl Staged {
    fn new(fails_at: Stage) -> Self {
        Self {
            cfg: RunnerConfig::new(RunnerMeta::new(5003, "staged")),
            fails_at,
            parallel: false,
        }
    }

    fn parallel(mut self) -> Self {
        self.parallel = true;
        self
    }
}

#[async_trait]
impl Runner for Staged {
    fn config(&self) -> &RunnerConfig {
        &self.cfg
    }

    fn run_in_parallel(&self) -> bool {
        self.parallel
    }

    async fn can_run(&self, ctx: &JobContext) -> Result<bool, RunnerError> {
        ctx.open_storage(&format!("mem://{}", ctx.job_id())).await?;
        if self.fails_at == Stage::CanRun {
            return Err(RunnerError::failed("cannot judge job"));
        }
        Ok(true)
    }

    async fn pre_run(&self, _ctx: &JobContext) -> Result<(), RunnerError> {
        if self.fails_at == Stage::PreRun {
            return Err(RunnerError::failed("warm-up failed"));
        }
        Ok(())
    }

    async fn run(&self, _ctx: &JobContext) -> Result<String, RunnerError> {
        match self.fails_at {
            Stage::Run => Err(RunnerError::failed("model exploded")),
            Stage::Panic => panic!("tensor index out of range"),
            _ => Ok("done".to_string()),
        }
    }
}

fn excluded_later(pool: &MemoryPool, id: &str) -> bool {
    pool.polls()
        .iter()
        .any(|q| q.exclude_ids.iter().any(|x| x == id))
}

async fn polls_continue(pool: &MemoryPool) {
    let before = pool.polls().len();
    eventually("further polls", || pool.polls().len() > before + 2).await;
}

async fn panicking_job_is_contained(parallel: bool) {
    let dir = tempfile::tempdir().unwrap();
    let pool = Arc::new(MemoryPool::new());
    pool.push_job(job("job-panic", "x"));

    let runner = Staged::new(Stage::Panic);
    let runner = if parallel { runner.parallel() } else { runner };
    let node = start(&pool, &dir);
    node.register_runner(Arc::new(runner)).await;
    let handle = node.start();

    eventually("the job disk closed", || pool.closed_disks().len() == 1).await;
    polls_continue(&pool).await;

    let cancelled = pool.cancelled();
    assert_eq!(cancelled.len(), 1);
    assert_eq!(cancelled[0].0, "job-panic");
    assert!(cancelled[0].1.contains("run panicked: tensor index out of range"));
    assert!(pool.completed().is_empty());

    handle.shutdown().await;
}

#[tokio::test]
async fn panicking_serial_job_is_cancelled_and_polling_continues() {
    panicking_job_is_contained(false).await;
}

#[tokio::test]
async fn panicking_parallel_job_is_cancelled_and_polling_continues() {
    panicking_job_is_contained(true).await;
}

#[tokio::test]
async fn failing_parallel_job_is_cancelled_once() {
    let dir = tempfile::tempdir().unwrap();
    let pool = Arc::new(MemoryPool::new());
    pool.push_job(job("job-bad", "x"));

    let node = start(&pool, &dir);
    node.register_runner(Arc::new(Staged::new(Stage::Run).parallel()))
        .await;
    let handle = node.start();

    eventually("the job disk closed", || pool.closed_disks().len() == 1).await;
    polls_continue(&pool).await;

    assert_eq!(
        pool.cancelled(),
        vec![("job-bad".to_string(), "model exploded".to_string())]
    );
    assert!(pool.completed().is_empty());
    handle.shutdown().await;
}

#[tokio::test]
async fn pre_run_error_cancels_the_accepted_job_once() {
    let dir = tempfile::tempdir().unwrap();
    let pool = Arc::new(MemoryPool::new());
    pool.push_job(job("job-warm", "x"));

    let node = start(&pool, &dir);
    node.register_runner(Arc::new(Staged::new(Stage::PreRun))).await;
    let handle = node.start();

    eventually("the job disk closed", || pool.closed_disks().len() == 1).await;
    polls_continue(&pool).await;

    assert_eq!(pool.accepted(), vec!["job-warm".to_string()]);
    assert_eq!(
        pool.cancelled(),
        vec![("job-warm".to_string(), "warm-up failed".to_string())]
    );
    assert!(pool.completed().is_empty());
    handle.shutdown().await;
}

#[tokio::test]
async fn rejected_accept_closes_the_context_without_cancel() {
    let dir = tempfile::tempdir().unwrap();
    let pool = Arc::new(MemoryPool::new());
    pool.fail_accepts(1);
    pool.push_job(job("job-taken", "x"));

    let node = start(&pool, &dir);
    node.register_runner(Arc::new(Staged::new(Stage::Never))).await;
    let handle = node.start();

    eventually("the job disk closed", || pool.closed_disks().len() == 1).await;
    eventually("the job locked", || excluded_later(&pool, "job-taken")).await;

    assert!(pool.accepted().is_empty());
    assert!(pool.cancelled().is_empty());
    assert!(pool.completed().is_empty());
    handle.shutdown().await;
}

#[tokio::test]
async fn can_run_error_locks_the_job_without_cancel() {
    let dir = tempfile::tempdir().unwrap();
    let pool = Arc::new(MemoryPool::new());
    pool.push_job(job("job-odd", "x"));

    let node = start(&pool, &dir);
    node.register_runner(Arc::new(Staged::new(Stage::CanRun))).await;
    let handle = node.start();

    eventually("the job disk closed", || pool.closed_disks().len() == 1).await;
    eventually("the job locked", || excluded_later(&pool, "job-odd")).await;

    assert!(pool.accepted().is_empty());
    assert!(pool.cancelled().is_empty());
    eventually("the failure forwarded", || {
        pool.logs()
            .iter()
            .any(|(id, text)| id == "job-odd" && text.contains("cannot judge job"))
    })
    .await;
    handle.shutdown().await;
}
