use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use poolnode_rpc::Pool;

use crate::{CacheError, LocalCache, RemoteCache};

/// Current wall-clock time in epoch millis.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Cache facade handed to runners.
///
/// Never fails: every error is logged and reported as a miss (`None`) or an unsuccessful
/// write (`false`). The local and remote tiers do not share keys.
#[derive(Clone)]
pub struct Cache {
    local: LocalCache,
    remote: RemoteCache,
}

impl Cache {
    pub fn new(dir: impl Into<PathBuf>, pool: Arc<dyn Pool>) -> Self {
        Self {
            local: LocalCache::new(dir),
            remote: RemoteCache::new(pool),
        }
    }

    pub fn from_tiers(local: LocalCache, remote: RemoteCache) -> Self {
        Self { local, remote }
    }

    /// Frame size used for remote writes.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.remote = self.remote.with_chunk_size(chunk_size);
        self
    }

    pub fn local(&self) -> &LocalCache {
        &self.local
    }

    pub fn remote(&self) -> &RemoteCache {
        &self.remote
    }

    pub async fn set(&self, key: &str, value: &[u8], version: u64, expire_at: u64, local: bool) -> bool {
        let result = if local {
            self.local
                .set(key, value, version, expire_at)
                .await
                .map(|()| true)
        } else {
            self.remote.set(key, value.to_vec(), version, expire_at).await
        };
        match result {
            Ok(stored) => {
                debug!(key, version, local, stored, "cache set");
                stored
            }
            Err(e) => {
                warn!(key, local, error = %e, "cache set failed");
                false
            }
        }
    }

    pub async fn get(&self, key: &str, last_version: u64, local: bool) -> Option<Vec<u8>> {
        let result = if local {
            self.local.get(key, last_version).await
        } else {
            self.remote.get(key, last_version).await
        };
        match result {
            Ok(value) => {
                debug!(key, last_version, local, hit = value.is_some(), "cache get");
                value
            }
            Err(e) => {
                warn!(key, local, error = %e, "cache get failed");
                None
            }
        }
    }

    /// Stores `value` as json.
    pub async fn set_json<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        version: u64,
        expire_at: u64,
        local: bool,
    ) -> bool {
        match serde_json::to_vec(value).map_err(CacheError::Encoding) {
            Ok(bytes) => self.set(key, &bytes, version, expire_at, local).await,
            Err(e) => {
                warn!(key, error = %e, "cache value not stored");
                false
            }
        }
    }

    /// Reads a json value; an entry that does not decode as `T` counts as a miss.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str, last_version: u64, local: bool) -> Option<T> {
        let bytes = self.get(key, last_version, local).await?;
        match serde_json::from_slice(&bytes).map_err(CacheError::Encoding) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key, error = %e, "cache value not decoded");
                None
            }
        }
    }
}
