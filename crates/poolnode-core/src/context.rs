use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Mutex;
use tracing::{debug, warn};

use poolnode_cache::Cache;
use poolnode_disk::{Disk, StreamOptions};
use poolnode_model::{Job, JobInput};
use poolnode_rpc::{CreateDisk, Pool};

use crate::{JobLogger, RunnerError};

/// Disks opened during one job, reachable by url, by id and by creation name.
#[derive(Default)]
struct DiskTable {
    by_url: HashMap<String, Arc<Disk>>,
    by_id: HashMap<String, Arc<Disk>>,
    by_name: HashMap<String, Arc<Disk>>,
}

impl DiskTable {
    fn insert(&mut self, disk: Arc<Disk>, name: Option<&str>) {
        self.by_url.insert(disk.url().to_string(), Arc::clone(&disk));
        if let Some(name) = name {
            self.by_name.insert(name.to_string(), Arc::clone(&disk));
        }
        self.by_id.insert(disk.id().to_string(), disk);
    }
}

/// Per-job scope handed to every runner hook.
///
/// Closing the context closes every disk opened through it; closing twice is a no-op.
pub struct JobContext {
    job: Job,
    runner: String,
    logger: JobLogger,
    cache: Cache,
    pool: Arc<dyn Pool>,
    stream: StreamOptions,
    disks: Mutex<DiskTable>,
    closed: AtomicBool,
}

impl JobContext {
    pub fn new(
        job: Job,
        runner: impl Into<String>,
        logger: JobLogger,
        cache: Cache,
        pool: Arc<dyn Pool>,
        stream: StreamOptions,
    ) -> Self {
        Self {
            job,
            runner: runner.into(),
            logger,
            cache,
            pool,
            stream,
            disks: Mutex::new(DiskTable::default()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn job(&self) -> &Job {
        &self.job
    }

    pub fn job_id(&self) -> &str {
        &self.job.id
    }

    pub fn runner_name(&self) -> &str {
        &self.runner
    }

    pub fn logger(&self) -> &JobLogger {
        &self.logger
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    pub fn param_values(&self, key: &str) -> Option<&[String]> {
        self.job.param_values(key)
    }

    pub fn param_value(&self, key: &str) -> Option<&str> {
        self.job.param_value(key)
    }

    pub fn inputs(&self, marker: Option<&str>) -> Vec<&JobInput> {
        self.job.inputs_marked(marker).collect()
    }

    pub fn input(&self, marker: Option<&str>) -> Option<&JobInput> {
        self.job.input(marker)
    }

    pub fn output_format(&self) -> &str {
        &self.job.output_format
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> Result<(), RunnerError> {
        if self.is_closed() {
            return Err(RunnerError::ContextClosed);
        }
        Ok(())
    }

    /// Opens the disk at `url`, reusing the handle if this job already opened it.
    pub async fn open_storage(&self, url: &str) -> Result<Arc<Disk>, RunnerError> {
        self.ensure_open()?;
        let mut disks = self.disks.lock().await;
        if let Some(disk) = disks.by_url.get(url) {
            return Ok(Arc::clone(disk));
        }

        let id = self.pool.open_disk(url).await?;
        let disk = Arc::new(Disk::new(id, url, Arc::clone(&self.pool)).with_options(self.stream));
        debug!(job_id = %self.job.id, disk_id = %disk.id(), url, "disk opened");
        disks.insert(Arc::clone(&disk), None);
        Ok(disk)
    }

    /// Creates a new disk and opens it. A named disk is created once per job.
    pub async fn create_storage(
        &self,
        name: Option<&str>,
        encryption_key: Option<&str>,
        include_key_in_url: bool,
    ) -> Result<Arc<Disk>, RunnerError> {
        self.ensure_open()?;
        let mut disks = self.disks.lock().await;
        if let Some(disk) = name.and_then(|n| disks.by_name.get(n)) {
            return Ok(Arc::clone(disk));
        }

        let request = CreateDisk {
            name: name.map(str::to_string),
            encryption_key: encryption_key.map(str::to_string),
            include_key_in_url,
        };
        let url = self.pool.create_disk(&request).await?;
        if let Some(disk) = disks.by_url.get(&url).cloned() {
            if let Some(name) = name {
                disks.by_name.insert(name.to_string(), Arc::clone(&disk));
            }
            return Ok(disk);
        }

        let id = self.pool.open_disk(&url).await?;
        let disk = Arc::new(Disk::new(id, url, Arc::clone(&self.pool)).with_options(self.stream));
        debug!(job_id = %self.job.id, disk_id = %disk.id(), ?name, "disk created");
        disks.insert(Arc::clone(&disk), name);
        Ok(disk)
    }

    /// Releases every disk opened through this context.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let table = std::mem::take(&mut *self.disks.lock().await);
        for (id, disk) in table.by_id {
            if let Err(e) = disk.close().await {
                warn!(job_id = %self.job.id, disk_id = %id, error = %e, "disk close failed");
            }
        }
    }
}
