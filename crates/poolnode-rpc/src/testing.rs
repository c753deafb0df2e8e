//! In-memory coordinator.
//!
//! Implements [`Pool`] against plain collections and records every call, so the
//! node runtime, disks and caches can be exercised without a network.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use futures::{StreamExt, stream};
use tonic::Status;

use poolnode_model::{Job, NodeMeta};

use crate::{
    CacheChunk, CacheChunkStream, CacheEntryHeader, ChunkStream, CreateDisk, FrameStream,
    PendingJobsQuery, Pool, RpcError, TemplateAnnouncement,
};

/// Longest the in-memory pool holds an empty poll, regardless of the requested wait.
const MAX_EMPTY_POLL_WAIT: Duration = Duration::from_millis(20);

#[derive(Default)]
struct State {
    pending: VecDeque<Job>,
    polls: Vec<PendingJobsQuery>,
    poll_failures: usize,
    accept_failures: usize,
    accepted: Vec<String>,
    completed: Vec<(String, String)>,
    cancelled: Vec<(String, String)>,
    logs: Vec<(String, String)>,
    node_announcements: usize,
    template_announcements: Vec<TemplateAnnouncement>,
    announce_failures: usize,
    refresh_interval_ms: u64,

    disks_by_url: HashMap<String, String>,
    files: HashMap<String, HashMap<String, Vec<u8>>>,
    written_frames: Vec<usize>,
    closed_disks: Vec<String>,
    next_disk: u64,

    cache: HashMap<String, (Vec<u8>, u64, u64)>,
}

/// In-memory stand-in for the coordinator.
pub struct MemoryPool {
    state: Mutex<State>,
    read_frame_size: usize,
}

impl Default for MemoryPool {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryPool {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                refresh_interval_ms: 60_000,
                ..State::default()
            }),
            read_frame_size: 4,
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Size of the frames served by `disk_read_file`.
    pub fn with_read_frame_size(mut self, size: usize) -> Self {
        self.read_frame_size = size.max(1);
        self
    }

    pub fn with_refresh_interval(self, ms: u64) -> Self {
        self.state().refresh_interval_ms = ms;
        self
    }

    pub fn push_job(&self, job: Job) {
        self.state().pending.push_back(job);
    }

    /// The next `n` polls fail with `Unavailable`.
    pub fn fail_polls(&self, n: usize) {
        self.state().poll_failures = n;
    }

    /// The next `n` accepts fail with `FailedPrecondition`; the job stays pending.
    pub fn fail_accepts(&self, n: usize) {
        self.state().accept_failures = n;
    }

    /// The next `n` announcements (node or template) fail with `Unavailable`.
    pub fn fail_announcements(&self, n: usize) {
        self.state().announce_failures = n;
    }

    pub fn polls(&self) -> Vec<PendingJobsQuery> {
        self.state().polls.clone()
    }

    pub fn accepted(&self) -> Vec<String> {
        self.state().accepted.clone()
    }

    pub fn completed(&self) -> Vec<(String, String)> {
        self.state().completed.clone()
    }

    pub fn cancelled(&self) -> Vec<(String, String)> {
        self.state().cancelled.clone()
    }

    pub fn logs(&self) -> Vec<(String, String)> {
        self.state().logs.clone()
    }

    pub fn node_announcements(&self) -> usize {
        self.state().node_announcements
    }

    pub fn template_announcements(&self) -> Vec<TemplateAnnouncement> {
        self.state().template_announcements.clone()
    }

    pub fn closed_disks(&self) -> Vec<String> {
        self.state().closed_disks.clone()
    }

    /// Sizes of every frame received by `disk_write_file`, in arrival order.
    pub fn written_frames(&self) -> Vec<usize> {
        self.state().written_frames.clone()
    }

    pub fn file(&self, disk_id: &str, path: &str) -> Option<Vec<u8>> {
        let state = self.state();
        state.files.get(disk_id)?.get(path).cloned()
    }

    pub fn put_file(&self, disk_id: &str, path: &str, data: Vec<u8>) {
        let mut state = self.state();
        state
            .files
            .entry(disk_id.to_string())
            .or_default()
            .insert(path.to_string(), data);
    }

    /// Opens (creating if needed) the disk behind `url` and returns its id.
    fn disk_for_url(state: &mut State, url: &str) -> String {
        if let Some(id) = state.disks_by_url.get(url) {
            return id.clone();
        }
        state.next_disk += 1;
        let id = format!("disk-{}", state.next_disk);
        state.disks_by_url.insert(url.to_string(), id.clone());
        state.files.entry(id.clone()).or_default();
        id
    }

    fn frames(&self, data: Vec<u8>) -> Vec<Vec<u8>> {
        data.chunks(self.read_frame_size).map(<[u8]>::to_vec).collect()
    }
}

fn unavailable(what: &str) -> RpcError {
    RpcError::from(Status::unavailable(format!("{what} failed")))
}

/// A client stream without messages reaches the coordinator without its key or path.
fn empty_request_stream(what: &str) -> RpcError {
    RpcError::from(Status::invalid_argument(format!("{what}: request stream carried no frames")))
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[async_trait]
impl Pool for MemoryPool {
    async fn announce_node(&self, _node: &NodeMeta) -> Result<u64, RpcError> {
        let mut state = self.state();
        if state.announce_failures > 0 {
            state.announce_failures -= 1;
            return Err(unavailable("announce node"));
        }
        state.node_announcements += 1;
        Ok(state.refresh_interval_ms)
    }

    async fn announce_template(&self, template: &TemplateAnnouncement) -> Result<u64, RpcError> {
        let mut state = self.state();
        if state.announce_failures > 0 {
            state.announce_failures -= 1;
            return Err(unavailable("announce template"));
        }
        state.template_announcements.push(template.clone());
        Ok(state.refresh_interval_ms)
    }

    async fn pending_jobs(&self, query: &PendingJobsQuery) -> Result<Vec<Job>, RpcError> {
        let jobs = {
            let mut state = self.state();
            state.polls.push(query.clone());
            if state.poll_failures > 0 {
                state.poll_failures -= 1;
                return Err(unavailable("poll"));
            }
            let excluded: HashSet<&str> = query.exclude_ids.iter().map(String::as_str).collect();
            state
                .pending
                .iter()
                .filter(|job| !excluded.contains(job.id.as_str()))
                .cloned()
                .collect::<Vec<_>>()
        };
        if jobs.is_empty() {
            let wait = Duration::from_millis(u64::from(query.wait_ms)).min(MAX_EMPTY_POLL_WAIT);
            tokio::time::sleep(wait).await;
        }
        Ok(jobs)
    }

    async fn accept_job(&self, job_id: &str) -> Result<(), RpcError> {
        let mut state = self.state();
        if state.accept_failures > 0 {
            state.accept_failures -= 1;
            return Err(RpcError::from(Status::failed_precondition(format!(
                "job {job_id} already taken"
            ))));
        }
        state.pending.retain(|job| job.id != job_id);
        state.accepted.push(job_id.to_string());
        Ok(())
    }

    async fn cancel_job(&self, job_id: &str, reason: &str) -> Result<(), RpcError> {
        let mut state = self.state();
        state.cancelled.push((job_id.to_string(), reason.to_string()));
        Ok(())
    }

    async fn complete_job(&self, job_id: &str, output: &str) -> Result<(), RpcError> {
        let mut state = self.state();
        state.completed.push((job_id.to_string(), output.to_string()));
        Ok(())
    }

    async fn log_for_job(&self, job_id: &str, text: &str) -> Result<(), RpcError> {
        let mut state = self.state();
        state.logs.push((job_id.to_string(), text.to_string()));
        Ok(())
    }

    async fn open_disk(&self, url: &str) -> Result<String, RpcError> {
        let mut state = self.state();
        Ok(Self::disk_for_url(&mut state, url))
    }

    async fn create_disk(&self, request: &CreateDisk) -> Result<String, RpcError> {
        let mut state = self.state();
        let url = format!(
            "mem://{}/{}",
            state.next_disk + 1,
            request.name.as_deref().unwrap_or("anonymous")
        );
        Self::disk_for_url(&mut state, &url);
        Ok(url)
    }

    async fn close_disk(&self, disk_id: &str) -> Result<(), RpcError> {
        let mut state = self.state();
        state.closed_disks.push(disk_id.to_string());
        Ok(())
    }

    async fn disk_list_files(&self, disk_id: &str, prefix: &str) -> Result<Vec<String>, RpcError> {
        let state = self.state();
        let mut files: Vec<String> = state
            .files
            .get(disk_id)
            .map(|files| {
                files
                    .keys()
                    .filter(|path| path.starts_with(prefix))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        files.sort();
        Ok(files)
    }

    async fn disk_delete_file(&self, disk_id: &str, path: &str) -> Result<bool, RpcError> {
        let mut state = self.state();
        Ok(state
            .files
            .get_mut(disk_id)
            .is_some_and(|files| files.remove(path).is_some()))
    }

    async fn disk_write_file(
        &self,
        disk_id: &str,
        path: &str,
        frames: FrameStream,
    ) -> Result<bool, RpcError> {
        let frames: Vec<Vec<u8>> = frames.collect().await;
        if frames.is_empty() {
            return Err(empty_request_stream("disk write"));
        }
        let mut state = self.state();
        let Some(files) = state.files.get_mut(disk_id) else {
            return Ok(false);
        };
        files.insert(path.to_string(), frames.concat());
        state
            .written_frames
            .extend(frames.iter().map(Vec::len));
        Ok(true)
    }

    async fn disk_read_file(&self, disk_id: &str, path: &str) -> Result<ChunkStream, RpcError> {
        let data = self.file(disk_id, path);
        let Some(data) = data else {
            return Err(RpcError::from(Status::not_found(format!("{disk_id}:{path}"))));
        };
        Ok(stream::iter(self.frames(data).into_iter().map(Ok)).boxed())
    }

    async fn cache_set(
        &self,
        header: &CacheEntryHeader,
        frames: FrameStream,
    ) -> Result<bool, RpcError> {
        let data: Vec<Vec<u8>> = frames.collect().await;
        if data.is_empty() {
            return Err(empty_request_stream("cache set"));
        }
        let mut state = self.state();
        state.cache.insert(
            header.key.clone(),
            (data.concat(), header.version, header.expire_at),
        );
        Ok(true)
    }

    async fn cache_get(&self, key: &str, last_version: u64) -> Result<CacheChunkStream, RpcError> {
        let entry = self.state().cache.get(key).cloned();
        let chunks = match entry {
            Some((data, version, expire_at))
                if (last_version == 0 || version == last_version)
                    && (expire_at == 0 || expire_at >= now_ms()) =>
            {
                let mut frames = self.frames(data);
                if frames.is_empty() {
                    frames.push(Vec::new());
                }
                frames
                    .into_iter()
                    .map(|data| Ok(CacheChunk { exists: true, data }))
                    .collect()
            }
            _ => vec![Ok(CacheChunk {
                exists: false,
                data: Vec::new(),
            })],
        };
        Ok(stream::iter(chunks).boxed())
    }
}
