use std::sync::Arc;

use futures::StreamExt;

use poolnode_disk::{DEFAULT_CHUNK_SIZE, frames_of};
use poolnode_rpc::{CacheEntryHeader, Pool};

use crate::CacheError;

/// Cache tier kept by the coordinator. Payloads travel in frames of at most `chunk_size` bytes.
#[derive(Clone)]
pub struct RemoteCache {
    pool: Arc<dyn Pool>,
    chunk_size: usize,
}

impl RemoteCache {
    pub fn new(pool: Arc<dyn Pool>) -> Self {
        Self {
            pool,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub async fn set(
        &self,
        key: &str,
        value: Vec<u8>,
        version: u64,
        expire_at: u64,
    ) -> Result<bool, CacheError> {
        let header = CacheEntryHeader {
            key: key.to_string(),
            version,
            expire_at,
        };
        Ok(self
            .pool
            .cache_set(&header, frames_of(value, self.chunk_size))
            .await?)
    }

    /// Concatenated payload, or `None` when the coordinator reports the entry absent.
    pub async fn get(&self, key: &str, last_version: u64) -> Result<Option<Vec<u8>>, CacheError> {
        let mut chunks = self.pool.cache_get(key, last_version).await?;
        let mut found = false;
        let mut data = Vec::new();
        while let Some(chunk) = chunks.next().await {
            let chunk = chunk?;
            if !chunk.exists {
                return Ok(None);
            }
            found = true;
            data.extend_from_slice(&chunk.data);
        }
        Ok(found.then_some(data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use poolnode_rpc::testing::MemoryPool;

    fn remote() -> RemoteCache {
        let pool: Arc<dyn Pool> = Arc::new(MemoryPool::new().with_read_frame_size(2));
        RemoteCache::new(pool).with_chunk_size(3)
    }

    #[tokio::test]
    async fn chunked_round_trip_and_version_gate() {
        let cache = remote();
        assert!(cache.set("k", b"payload".to_vec(), 5, 0).await.unwrap());

        assert_eq!(cache.get("k", 6).await.unwrap(), None);
        assert_eq!(cache.get("k", 5).await.unwrap(), Some(b"payload".to_vec()));
        assert_eq!(cache.get("k", 0).await.unwrap(), Some(b"payload".to_vec()));
    }

    #[tokio::test]
    async fn absent_and_empty_are_distinct() {
        let cache = remote();
        assert_eq!(cache.get("missing", 0).await.unwrap(), None);
        assert!(cache.set("empty", Vec::new(), 1, 0).await.unwrap());
        assert_eq!(cache.get("empty", 0).await.unwrap(), Some(Vec::new()));
    }

    #[tokio::test]
    async fn expired_entries_are_absent() {
        let cache = remote();
        assert!(cache.set("old", b"v".to_vec(), 1, 1).await.unwrap());
        assert_eq!(cache.get("old", 0).await.unwrap(), None);
    }
}
