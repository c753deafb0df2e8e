use std::collections::HashMap;
use std::time::Duration;

/// Default window during which a taken job id stays excluded from polls.
pub const DEFAULT_LOCK_TTL: Duration = Duration::from_secs(60);

/// Best-effort local de-duplication of job ids.
///
/// An id stays locked until its entry is older than the ttl; the coordinator remains the
/// authority on who owns a job.
#[derive(Debug, Clone)]
pub struct LockSet {
    ttl_ms: u64,
    entries: HashMap<String, u64>,
}

impl Default for LockSet {
    fn default() -> Self {
        Self::new(DEFAULT_LOCK_TTL)
    }
}

impl LockSet {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl_ms: ttl.as_millis() as u64,
            entries: HashMap::new(),
        }
    }

    /// Locks `job_id` as of `now_ms`; re-locking refreshes the timestamp.
    pub fn insert(&mut self, job_id: &str, now_ms: u64) {
        self.entries.insert(job_id.to_string(), now_ms);
    }

    /// Drops entries older than the ttl.
    pub fn purge(&mut self, now_ms: u64) {
        let ttl = self.ttl_ms;
        self.entries
            .retain(|_, taken| now_ms.saturating_sub(*taken) <= ttl);
    }

    pub fn contains(&self, job_id: &str) -> bool {
        self.entries.contains_key(job_id)
    }

    /// Ids to exclude from the next poll, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.entries.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
