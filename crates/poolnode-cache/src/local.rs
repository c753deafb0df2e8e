use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError};

use tokio::fs;
use tokio::sync::Mutex;
use tracing::trace;

use crate::{CacheError, CacheMeta};

const DATA_DIR: &str = "data";
const META_DIR: &str = "meta";

/// File-backed cache tier.
///
/// Each key owns `<dir>/data/<key>` and `<dir>/meta/<key>.json`. Both are written to
/// temporary files first and renamed into place, the metadata last, so a crash mid-write
/// leaves either the previous entry or no entry. Writes to one key are serialized
/// across every clone of the cache.
#[derive(Debug, Clone)]
pub struct LocalCache {
    dir: PathBuf,
    writers: KeyLocks,
}

/// One async lock per key with a write in flight.
#[derive(Debug, Clone, Default)]
struct KeyLocks(Arc<std::sync::Mutex<HashMap<String, Arc<Mutex<()>>>>>);

impl KeyLocks {
    fn acquire(&self, key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(key.to_string()).or_default())
    }

    /// Forgets `key` once no writer holds or waits on its lock.
    fn release(&self, key: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        drop(lock);
        if locks.get(key).is_some_and(|l| Arc::strong_count(l) == 1) {
            locks.remove(key);
        }
    }
}

impl LocalCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            writers: KeyLocks::default(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn paths(&self, key: &str) -> Result<(PathBuf, PathBuf), CacheError> {
        let invalid = key.is_empty()
            || key == "."
            || key == ".."
            || key.contains(['/', '\\', '\0'])
            || key.starts_with(".tmp-");
        if invalid {
            return Err(CacheError::InvalidKey(key.to_string()));
        }
        Ok((
            self.dir.join(DATA_DIR).join(key),
            self.dir.join(META_DIR).join(format!("{key}.json")),
        ))
    }

    pub async fn set(
        &self,
        key: &str,
        value: &[u8],
        version: u64,
        expire_at: u64,
    ) -> Result<(), CacheError> {
        let (data_path, meta_path) = self.paths(key)?;
        let meta = serde_json::to_vec(&CacheMeta { version, expire_at }).map_err(CacheError::Meta)?;

        let lock = self.writers.acquire(key);
        let result = {
            let _writing = lock.lock().await;
            self.write_entry(&data_path, &meta_path, value, &meta).await
        };
        self.writers.release(key, lock);
        result?;
        trace!(key, version, expire_at, bytes = value.len(), "local cache entry written");
        Ok(())
    }

    async fn write_entry(
        &self,
        data_path: &Path,
        meta_path: &Path,
        value: &[u8],
        meta: &[u8],
    ) -> Result<(), CacheError> {
        fs::create_dir_all(self.dir.join(DATA_DIR)).await?;
        fs::create_dir_all(self.dir.join(META_DIR)).await?;

        let tmp = uuid::Uuid::new_v4();
        let data_tmp = self.dir.join(DATA_DIR).join(format!(".tmp-{tmp}"));
        let meta_tmp = self.dir.join(META_DIR).join(format!(".tmp-{tmp}"));

        let result = async {
            fs::write(&data_tmp, value).await?;
            fs::write(&meta_tmp, meta).await?;
            remove_if_exists(meta_path).await?;
            fs::rename(&data_tmp, data_path).await?;
            fs::rename(&meta_tmp, meta_path).await
        }
        .await;

        if result.is_err() {
            let _ = remove_if_exists(&data_tmp).await;
            let _ = remove_if_exists(&meta_tmp).await;
        }
        Ok(result?)
    }

    /// The stored bytes, or `None` when the entry is missing, mismatched or expired at `now_ms`.
    pub async fn get_at(
        &self,
        key: &str,
        last_version: u64,
        now_ms: u64,
    ) -> Result<Option<Vec<u8>>, CacheError> {
        let (data_path, meta_path) = self.paths(key)?;
        let Some(meta) = read_if_exists(&meta_path).await? else {
            return Ok(None);
        };
        let meta: CacheMeta = serde_json::from_slice(&meta).map_err(CacheError::Meta)?;
        if !meta.admits(last_version, now_ms) {
            trace!(key, last_version, ?meta, "local cache entry rejected");
            return Ok(None);
        }
        read_if_exists(&data_path).await
    }

    pub async fn get(&self, key: &str, last_version: u64) -> Result<Option<Vec<u8>>, CacheError> {
        self.get_at(key, last_version, crate::now_ms()).await
    }
}

async fn read_if_exists(path: &Path) -> Result<Option<Vec<u8>>, CacheError> {
    match fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn remove_if_exists(path: &Path) -> std::io::Result<()> {
    match fs::remove_file(path).await {
        Err(e) if e.kind() != ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn version_gate() {
        let dir = tempfile::tempdir().unwrap();
        let cache = LocalCache::new(dir.path());
        cache.set("k", b"v", 5, 0).await.unwrap();

        assert_eq!(cache.get("k", 6).await.unwrap(), None);
        assert_eq!(cache.get("k", 5).await.unwrap(), Some(b"v".to_vec()));
        assert_eq!(cache.get("k", 0).await.unwrap(), Some(b"v".to_vec()));
    }

    #[tokio::test]
    async fn expiry_against_simulated_clock() {
        let dir = tempfile::tempdir().unwrap();
        let cache = LocalCache::new(dir.path());
        cache.set("k", b"v", 1, 10_000).await.unwrap();

        assert_eq!(cache.get_at("k", 0, 9_999).await.unwrap(), Some(b"v".to_vec()));
        assert_eq!(cache.get_at("k", 0, 10_000).await.unwrap(), Some(b"v".to_vec()));
        assert_eq!(cache.get_at("k", 0, 10_001).await.unwrap(), None);
    }

    #[tokio::test]
    async fn overwrite_replaces_payload_and_meta() {
        let dir = tempfile::tempdir().unwrap();
        let cache = LocalCache::new(dir.path());
        cache.set("k", b"first", 1, 0).await.unwrap();
        cache.set("k", b"", 2, 0).await.unwrap();

        assert_eq!(cache.get("k", 1).await.unwrap(), None);
        assert_eq!(cache.get("k", 2).await.unwrap(), Some(Vec::new()));

        let leftovers: Vec<_> = std::fs::read_dir(dir.path().join(DATA_DIR))
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().starts_with(".tmp-"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn missing_half_means_absent() {
        let dir = tempfile::tempdir().unwrap();
        let cache = LocalCache::new(dir.path());
        assert_eq!(cache.get("nothing", 0).await.unwrap(), None);

        cache.set("k", b"v", 1, 0).await.unwrap();
        std::fs::remove_file(dir.path().join(DATA_DIR).join("k")).unwrap();
        assert_eq!(cache.get("k", 0).await.unwrap(), None);

        cache.set("j", b"v", 1, 0).await.unwrap();
        std::fs::remove_file(dir.path().join(META_DIR).join("j.json")).unwrap();
        assert_eq!(cache.get("j", 0).await.unwrap(), None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_writes_keep_payload_and_meta_paired() {
        let dir = tempfile::tempdir().unwrap();
        let cache = LocalCache::new(dir.path());

        let writes = (1..=24u64).map(|v| {
            let cache = cache.clone();
            tokio::spawn(async move {
                let payload = vec![v as u8; v as usize * 512];
                cache.set("shared", &payload, v, 0).await.unwrap();
            })
        });
        for write in futures::future::join_all(writes).await {
            write.unwrap();
        }

        let meta = std::fs::read(dir.path().join(META_DIR).join("shared.json")).unwrap();
        let meta: CacheMeta = serde_json::from_slice(&meta).unwrap();
        let data = cache.get("shared", meta.version).await.unwrap().unwrap();
        assert_eq!(data, vec![meta.version as u8; meta.version as usize * 512]);
        assert!(cache.writers.0.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn keys_cannot_escape_the_directory() {
        let dir = tempfile::tempdir().unwrap();
        let cache = LocalCache::new(dir.path());
        for key in ["", ".", "..", "a/b", "..\\x", ".tmp-1"] {
            assert!(matches!(
                cache.set(key, b"v", 0, 0).await,
                Err(CacheError::InvalidKey(_))
            ));
        }
    }
}
