use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Mutex;
use tracing::debug;

use poolnode_rpc::Pool;

use crate::{DiskError, DiskReader, DiskWriter, StreamOptions};

/// Handle to one remote disk opened for a job.
///
/// Every operation fails with [`DiskError::Closed`] once the handle is closed.
pub struct Disk {
    id: String,
    url: String,
    pool: Arc<dyn Pool>,
    options: StreamOptions,
    closed: AtomicBool,
    closing: Mutex<()>,
}

impl Disk {
    pub fn new(id: impl Into<String>, url: impl Into<String>, pool: Arc<dyn Pool>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            pool,
            options: StreamOptions::default(),
            closed: AtomicBool::new(false),
            closing: Mutex::new(()),
        }
    }

    pub fn with_options(mut self, options: StreamOptions) -> Self {
        self.options = options;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> Result<(), DiskError> {
        if self.is_closed() {
            return Err(DiskError::Closed(self.id.clone()));
        }
        Ok(())
    }

    /// Paths starting with `prefix`.
    pub async fn list(&self, prefix: &str) -> Result<Vec<String>, DiskError> {
        self.ensure_open()?;
        Ok(self.pool.disk_list_files(&self.id, prefix).await?)
    }

    pub async fn delete(&self, path: &str) -> Result<bool, DiskError> {
        self.ensure_open()?;
        Ok(self.pool.disk_delete_file(&self.id, path).await?)
    }

    pub fn open_write_stream(&self, path: &str) -> Result<DiskWriter, DiskError> {
        self.ensure_open()?;
        let pool = Arc::clone(&self.pool);
        let (id, path) = (self.id.clone(), path.to_string());
        debug!(disk_id = %id, path = %path, "opening write stream");
        Ok(DiskWriter::spawn(&self.options, move |frames| async move {
            pool.disk_write_file(&id, &path, frames).await
        }))
    }

    pub fn open_read_stream(&self, path: &str) -> Result<DiskReader, DiskError> {
        self.ensure_open()?;
        let pool = Arc::clone(&self.pool);
        let (id, path) = (self.id.clone(), path.to_string());
        debug!(disk_id = %id, path = %path, "opening read stream");
        Ok(DiskReader::spawn(&self.options, async move {
            pool.disk_read_file(&id, &path).await
        }))
    }

    /// Replaces `path` with `bytes`. Returns the coordinator's success flag.
    pub async fn write_bytes(&self, path: &str, bytes: impl Into<Vec<u8>>) -> Result<bool, DiskError> {
        let mut writer = self.open_write_stream(path)?;
        writer.write(bytes).await?;
        writer.close().await
    }

    pub async fn read_bytes(&self, path: &str) -> Result<Vec<u8>, DiskError> {
        let mut reader = self.open_read_stream(path)?;
        let bytes = reader.read_to_end().await;
        reader.close().await?;
        bytes
    }

    pub async fn write_utf8(&self, path: &str, text: &str) -> Result<bool, DiskError> {
        self.write_bytes(path, text.as_bytes()).await
    }

    pub async fn read_utf8(&self, path: &str) -> Result<String, DiskError> {
        Ok(String::from_utf8(self.read_bytes(path).await?)?)
    }

    /// Releases the disk on the coordinator. Idempotent; a failed close may be retried.
    pub async fn close(&self) -> Result<(), DiskError> {
        let _guard = self.closing.lock().await;
        if self.is_closed() {
            return Ok(());
        }
        self.pool.close_disk(&self.id).await?;
        self.closed.store(true, Ordering::Release);
        debug!(disk_id = %self.id, "disk closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{TypedRead, TypedWrite};
    use poolnode_rpc::testing::MemoryPool;

    async fn disk(pool: &Arc<MemoryPool>, chunk: usize) -> Disk {
        let id = pool.open_disk("mem://test").await.unwrap();
        let shared: Arc<dyn Pool> = pool.clone();
        Disk::new(id, "mem://test", shared).with_options(
            StreamOptions::default()
                .with_chunk_size(chunk)
                .with_queue_capacity(2),
        )
    }

    #[tokio::test]
    async fn frames_never_exceed_chunk_size() {
        const C: usize = 8;
        for size in [0, C, C + 1, 3 * C + 5] {
            let pool = Arc::new(MemoryPool::new());
            let disk = disk(&pool, C).await;
            let payload: Vec<u8> = (0..size).map(|i| i as u8).collect();

            let mut writer = disk.open_write_stream("blob").unwrap();
            // Two writes so frames come from more than one queued payload.
            let (head, tail) = payload.split_at(size / 2);
            writer.write(head.to_vec()).await.unwrap();
            writer.write(tail.to_vec()).await.unwrap();
            assert!(writer.close().await.unwrap());

            let frames = pool.written_frames();
            if size == 0 {
                assert_eq!(frames, vec![0]);
            } else {
                assert!(frames.iter().all(|&f| f > 0 && f <= C), "size {size}: {frames:?}");
            }
            assert_eq!(frames.iter().sum::<usize>(), size);
            assert_eq!(pool.file(disk.id(), "blob").unwrap(), payload);
        }
    }

    #[tokio::test]
    async fn reads_reassemble_across_frames() {
        let pool = Arc::new(MemoryPool::new().with_read_frame_size(3));
        let disk = disk(&pool, 16).await;
        pool.put_file(disk.id(), "data", (0u8..10).collect());

        let mut reader = disk.open_read_stream("data").unwrap();
        assert_eq!(reader.read(4).await.unwrap(), vec![0, 1, 2, 3]);
        assert_eq!(reader.read(5).await.unwrap(), vec![4, 5, 6, 7, 8]);
        assert_eq!(reader.read(5).await.unwrap(), vec![9]);
        assert!(reader.read(5).await.unwrap().is_empty());
        reader.close().await.unwrap();
        reader.close().await.unwrap();
    }

    #[tokio::test]
    async fn typed_values_through_a_disk() {
        let pool = Arc::new(MemoryPool::new().with_read_frame_size(5));
        let disk = disk(&pool, 3).await;

        let mut writer = disk.open_write_stream("typed").unwrap();
        writer.write_i64(-42).await.unwrap();
        writer.write_utf8("ünïcode").await.unwrap();
        writer.write_f64(0.25).await.unwrap();
        writer.write_bool(true).await.unwrap();
        assert!(writer.close().await.unwrap());
        assert!(writer.close().await.unwrap());
        assert!(matches!(
            writer.write(vec![1]).await,
            Err(DiskError::StreamClosed)
        ));

        let mut reader = disk.open_read_stream("typed").unwrap();
        assert_eq!(reader.read_i64().await.unwrap(), -42);
        assert_eq!(reader.read_utf8().await.unwrap(), "ünïcode");
        assert_eq!(reader.read_f64().await.unwrap(), 0.25);
        assert!(reader.read_bool().await.unwrap());
        assert!(matches!(
            reader.read_u8().await,
            Err(DiskError::UnexpectedEof { .. })
        ));
        reader.close().await.unwrap();
    }

    #[tokio::test]
    async fn missing_file_surfaces_on_read() {
        let pool = Arc::new(MemoryPool::new());
        let disk = disk(&pool, 16).await;
        let mut reader = disk.open_read_stream("nope").unwrap();
        assert!(matches!(reader.read(1).await, Err(DiskError::Rpc(_))));
        reader.close().await.unwrap();
    }

    #[tokio::test]
    async fn helpers_list_and_delete() {
        let pool = Arc::new(MemoryPool::new());
        let disk = disk(&pool, 4).await;
        assert!(disk.write_utf8("notes/a.txt", "hello disk").await.unwrap());
        assert!(disk.write_bytes("notes/b.bin", vec![1, 2, 3]).await.unwrap());
        assert!(disk.write_bytes("other", Vec::new()).await.unwrap());

        assert_eq!(disk.read_utf8("notes/a.txt").await.unwrap(), "hello disk");
        assert_eq!(disk.read_bytes("other").await.unwrap(), Vec::<u8>::new());
        assert_eq!(
            disk.list("notes/").await.unwrap(),
            vec!["notes/a.txt".to_string(), "notes/b.bin".to_string()]
        );
        assert!(disk.delete("notes/a.txt").await.unwrap());
        assert!(!disk.delete("notes/a.txt").await.unwrap());
    }

    #[tokio::test]
    async fn close_is_idempotent_and_final() {
        let pool = Arc::new(MemoryPool::new());
        let disk = disk(&pool, 4).await;
        disk.close().await.unwrap();
        disk.close().await.unwrap();
        assert_eq!(pool.closed_disks(), vec![disk.id().to_string()]);
        assert!(disk.is_closed());
        assert!(matches!(disk.list("").await, Err(DiskError::Closed(_))));
        assert!(matches!(
            disk.open_write_stream("x"),
            Err(DiskError::Closed(_))
        ));
        assert!(matches!(disk.open_read_stream("x"), Err(DiskError::Closed(_))));
    }
}
