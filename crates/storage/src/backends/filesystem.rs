//! Local filesystem object store.
//!
//! Keys are `/`-separated segments mapped to nested directories under the
//! root. Every write lands in `<root>/.staging` first, is synced, and is then
//! moved into place, so a reader sees either the whole object or nothing.
//! Segments may not start with a dot, which keeps the staging area out of the
//! key space and rules out `.`/`..` traversal.

use crate::error::{StorageError, StorageResult};
use crate::traits::ObjectStore;
use async_trait::async_trait;
use bytes::Bytes;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::instrument;
use uuid::Uuid;

const STAGING_DIR: &str = ".staging";
const MAX_KEY_LEN: usize = 512;

/// Check a key (or a prefix ending in `/`) and return it without the slash.
fn validate_key(key: &str, allow_trailing_slash: bool) -> StorageResult<&str> {
    let trimmed = if allow_trailing_slash {
        key.strip_suffix('/').unwrap_or(key)
    } else {
        key
    };
    let invalid = |why: &str| Err(StorageError::InvalidKey(format!("{key:?}: {why}")));

    if trimmed.is_empty() {
        return invalid("empty");
    }
    if trimmed.len() > MAX_KEY_LEN {
        return invalid("too long");
    }
    for segment in trimmed.split('/') {
        if segment.is_empty() {
            return invalid("empty segment");
        }
        if segment.starts_with('.') {
            return invalid("segment starts with a dot");
        }
        if !segment
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-'))
        {
            return invalid("unsupported character");
        }
    }
    Ok(trimmed)
}

/// Local filesystem object store.
pub struct FilesystemBackend {
    root: PathBuf,
    staging: PathBuf,
}

impl FilesystemBackend {
    /// Open a store at `root`, creating it and its staging area if needed.
    pub async fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        let staging = root.join(STAGING_DIR);
        fs::create_dir_all(&staging).await?;
        Ok(Self { root, staging })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a validated key to its path, refusing to walk through symlinks.
    async fn resolve(&self, key: &str, allow_trailing_slash: bool) -> StorageResult<PathBuf> {
        let key = validate_key(key, allow_trailing_slash)?;
        let segments: Vec<&str> = key.split('/').collect();
        let mut path = self.root.clone();
        for (depth, segment) in segments.iter().enumerate() {
            path.push(segment);
            match fs::symlink_metadata(&path).await {
                Ok(meta) if meta.file_type().is_symlink() => {
                    return Err(StorageError::InvalidKey(format!(
                        "{key:?}: symlink inside storage root"
                    )));
                }
                Ok(_) => {}
                // Nothing deeper can exist either.
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    path.extend(&segments[depth + 1..]);
                    return Ok(path);
                }
                Err(e) => return Err(StorageError::Io(e)),
            }
        }
        Ok(path)
    }

    fn io_error(key: &str) -> impl FnOnce(std::io::Error) -> StorageError + '_ {
        move |e| {
            if e.kind() == ErrorKind::NotFound {
                StorageError::NotFound(key.to_string())
            } else {
                StorageError::Io(e)
            }
        }
    }

    /// Write `data` to a fresh staging file and sync it.
    async fn stage(&self, data: &[u8]) -> std::io::Result<PathBuf> {
        let staged = self.staging.join(Uuid::new_v4().to_string());
        let result = async {
            let mut file = fs::File::create(&staged).await?;
            file.write_all(data).await?;
            file.sync_all().await
        }
        .await;
        match result {
            Ok(()) => Ok(staged),
            Err(e) => {
                let _ = fs::remove_file(&staged).await;
                Err(e)
            }
        }
    }

    async fn create_parent(path: &Path) -> std::io::Result<()> {
        match path.parent() {
            Some(parent) => fs::create_dir_all(parent).await,
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ObjectStore for FilesystemBackend {
    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let path = self.resolve(key, false).await?;
        Ok(fs::try_exists(&path).await?)
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        let path = self.resolve(key, false).await?;
        let data = fs::read(&path).await.map_err(Self::io_error(key))?;
        Ok(Bytes::from(data))
    }

    #[instrument(skip(self, data), fields(backend = "filesystem", size = data.len()))]
    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()> {
        let path = self.resolve(key, false).await?;
        Self::create_parent(&path).await?;
        let staged = self.stage(&data).await?;
        if let Err(e) = fs::rename(&staged, &path).await {
            let _ = fs::remove_file(&staged).await;
            return Err(StorageError::Io(e));
        }
        Ok(())
    }

    #[instrument(skip(self, data), fields(backend = "filesystem", size = data.len()))]
    async fn put_if_not_exists(&self, key: &str, data: Bytes) -> StorageResult<bool> {
        let path = self.resolve(key, false).await?;
        if fs::try_exists(&path).await? {
            return Ok(false);
        }
        Self::create_parent(&path).await?;
        let staged = self.stage(&data).await?;

        // hard_link fails if the target exists, so only one writer wins.
        let linked = fs::hard_link(&staged, &path).await;
        let _ = fs::remove_file(&staged).await;
        match linked {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn delete(&self, key: &str) -> StorageResult<()> {
        let path = self.resolve(key, false).await?;
        fs::remove_file(&path).await.map_err(Self::io_error(key))
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let base = self.resolve(prefix, true).await?;
        let mut keys = Vec::new();
        if !fs::try_exists(&base).await? {
            return Ok(keys);
        }

        let mut pending = vec![base];
        while let Some(dir) = pending.pop() {
            let mut entries = fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                if entry.file_name().to_string_lossy().starts_with('.') {
                    continue;
                }
                let file_type = entry.file_type().await?;
                let path = entry.path();
                if file_type.is_dir() {
                    pending.push(path);
                } else if file_type.is_file()
                    && let Ok(rel) = path.strip_prefix(&self.root)
                {
                    let key: Vec<String> = rel
                        .components()
                        .map(|c| c.as_os_str().to_string_lossy().into_owned())
                        .collect();
                    keys.push(key.join("/"));
                }
            }
        }

        keys.sort();
        Ok(keys)
    }

    /// Remove the whole directory behind the prefix.
    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn delete_prefix(&self, prefix: &str) -> StorageResult<u64> {
        let removed = self.list(prefix).await?.len() as u64;
        let base = self.resolve(prefix, true).await?;
        match fs::remove_dir_all(&base).await {
            Ok(()) => Ok(removed),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(removed),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    fn backend_name(&self) -> &'static str {
        "filesystem"
    }

    /// The root must be a directory we can write to.
    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn health_check(&self) -> StorageResult<()> {
        let meta = fs::metadata(&self.root).await.map_err(|e| {
            StorageError::Io(std::io::Error::new(
                e.kind(),
                format!("storage root {} not accessible: {e}", self.root.display()),
            ))
        })?;
        if !meta.is_dir() {
            return Err(StorageError::Config(format!(
                "storage root {} is not a directory",
                self.root.display()
            )));
        }

        fs::create_dir_all(&self.staging).await?;
        let probe = self.stage(b"probe").await?;
        fs::remove_file(&probe).await?;
        Ok(())
    }
}
