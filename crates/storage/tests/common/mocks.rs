use archivo_storage::{FilesystemBackend, ObjectStore, StorageError, StorageResult};
use async_trait::async_trait;
use bytes::Bytes;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Filesystem backend with switchable failures, for exercising cleanup paths.
#[allow(dead_code)]
pub struct FlakyBackend {
    inner: FilesystemBackend,
    /// Fail any put whose key ends with this suffix.
    pub fail_put_suffix: std::sync::Mutex<Option<String>>,
    /// Fail puts once this many have succeeded.
    pub fail_puts_after: AtomicUsize,
    pub fail_deletes: AtomicBool,
    pub puts: AtomicUsize,
}

#[allow(dead_code)]
impl FlakyBackend {
    pub async fn new(root: &Path) -> Arc<Self> {
        Arc::new(Self {
            inner: FilesystemBackend::new(root).await.unwrap(),
            fail_put_suffix: std::sync::Mutex::new(None),
            fail_puts_after: AtomicUsize::new(usize::MAX),
            fail_deletes: AtomicBool::new(false),
            puts: AtomicUsize::new(0),
        })
    }

    pub fn fail_puts_ending_with(&self, suffix: &str) {
        *self.fail_put_suffix.lock().unwrap() = Some(suffix.to_string());
    }

    fn check_put(&self, key: &str) -> StorageResult<()> {
        if let Some(suffix) = self.fail_put_suffix.lock().unwrap().as_deref()
            && key.ends_with(suffix)
        {
            return Err(StorageError::Io(std::io::Error::other("injected put failure")));
        }
        let done = self.puts.fetch_add(1, Ordering::SeqCst);
        if done >= self.fail_puts_after.load(Ordering::SeqCst) {
            return Err(StorageError::Io(std::io::Error::other("injected put failure")));
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for FlakyBackend {
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        self.inner.exists(key).await
    }

    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()> {
        self.check_put(key)?;
        self.inner.put(key, data).await
    }

    async fn put_if_not_exists(&self, key: &str, data: Bytes) -> StorageResult<bool> {
        self.check_put(key)?;
        self.inner.put_if_not_exists(key, data).await
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(StorageError::Io(std::io::Error::other(
                "injected delete failure",
            )));
        }
        self.inner.delete(key).await
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        self.inner.list(prefix).await
    }

    fn backend_name(&self) -> &'static str {
        "flaky"
    }
}
