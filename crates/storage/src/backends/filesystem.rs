//! Local filesystem storage backend.

use crate::error::{StorageError, StorageResult};
use crate::traits::{ByteStream, ObjectStore};
use async_trait::async_trait;
use bytes::Bytes;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::instrument;
use uuid::Uuid;

/// Chunk size for streaming reads (64 KiB).
const STREAM_CHUNK_SIZE: usize = 64 * 1024;

/// Local filesystem object store.
pub struct FilesystemBackend {
    root: PathBuf,
}

fn not_found_or_io(key: &str, e: std::io::Error) -> StorageError {
    if e.kind() == ErrorKind::NotFound {
        StorageError::NotFound(key.to_string())
    } else {
        StorageError::Io(e)
    }
}

impl FilesystemBackend {
    /// Create a new filesystem backend, creating the root directory if needed.
    pub async fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    /// Root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a key to a path under the root.
    ///
    /// Runs on the blocking pool because it canonicalizes paths.
    async fn key_path(&self, key: &str) -> StorageResult<PathBuf> {
        let root = self.root.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || Self::key_path_sync(&root, &key))
            .await
            .map_err(|e| {
                StorageError::Io(std::io::Error::other(format!("spawn_blocking failed: {e}")))
            })?
    }

    /// Reject keys that would resolve outside the root, including through symlinks.
    fn key_path_sync(root: &Path, key: &str) -> StorageResult<PathBuf> {
        if key.is_empty() {
            return Err(StorageError::InvalidKey("empty key".to_string()));
        }
        if key.starts_with('/') || key.starts_with('\\') || key.contains('\\') {
            return Err(StorageError::InvalidKey(format!(
                "path traversal not allowed: {key}"
            )));
        }
        if Path::new(key)
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(StorageError::InvalidKey(format!(
                "contains unsafe path component: {key}"
            )));
        }

        let path = root.join(key);
        let root_canonical = root.canonicalize().map_err(|e| {
            StorageError::Io(std::io::Error::new(
                e.kind(),
                format!("failed to canonicalize root: {e}"),
            ))
        })?;

        // The path itself if it exists, otherwise its nearest existing ancestor.
        let mut ancestor = Some(path.as_path());
        while let Some(candidate) = ancestor {
            match std::fs::symlink_metadata(candidate) {
                Ok(meta) => {
                    let canonical = candidate.canonicalize().map_err(|e| {
                        if meta.file_type().is_symlink() {
                            StorageError::InvalidKey(format!(
                                "symlink target missing or invalid: {key}"
                            ))
                        } else {
                            StorageError::Io(e)
                        }
                    })?;
                    if !canonical.starts_with(&root_canonical) {
                        return Err(StorageError::InvalidKey(format!(
                            "resolved path escapes storage root: {key}"
                        )));
                    }
                    return Ok(path);
                }
                Err(err) if err.kind() == ErrorKind::NotFound => {
                    ancestor = candidate.parent();
                }
                Err(err) => return Err(StorageError::Io(err)),
            }
        }

        Ok(path)
    }
}

#[async_trait]
impl ObjectStore for FilesystemBackend {
    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let path = self.key_path(key).await?;
        fs::try_exists(&path).await.map_err(StorageError::Io)
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        let path = self.key_path(key).await?;
        let data = fs::read(&path).await.map_err(|e| not_found_or_io(key, e))?;
        Ok(Bytes::from(data))
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn get_stream(&self, key: &str) -> StorageResult<ByteStream> {
        use tokio::io::AsyncReadExt;

        let path = self.key_path(key).await?;
        let file = fs::File::open(&path)
            .await
            .map_err(|e| not_found_or_io(key, e))?;

        let stream = async_stream::try_stream! {
            let mut file = file;
            let mut buf = vec![0u8; STREAM_CHUNK_SIZE];
            loop {
                let n = file.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                yield Bytes::copy_from_slice(&buf[..n]);
            }
        };

        Ok(Box::pin(stream))
    }

    #[instrument(skip(self, data), fields(backend = "filesystem", size = data.len()))]
    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()> {
        let path = self.key_path(key).await?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        // Unique temp name so concurrent writers to one key never share a file.
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let temp_path = path.with_file_name(format!("{file_name}.tmp.{}", Uuid::new_v4()));

        let written = async {
            let mut file = fs::File::create(&temp_path).await?;
            file.write_all(&data).await?;
            file.sync_all().await?;
            fs::rename(&temp_path, &path).await
        }
        .await;

        if let Err(e) = written {
            let _ = fs::remove_file(&temp_path).await;
            return Err(StorageError::Io(e));
        }
        Ok(())
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn delete(&self, key: &str) -> StorageResult<()> {
        let path = self.key_path(key).await?;
        fs::remove_file(&path)
            .await
            .map_err(|e| not_found_or_io(key, e))
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let base_path = self.key_path(prefix).await?;
        let mut results = Vec::new();

        if !fs::try_exists(&base_path).await? {
            return Ok(results);
        }

        let mut stack = vec![base_path];
        while let Some(dir) = stack.pop() {
            let mut entries = fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                // file_type() does not follow symlinks; those are skipped.
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    stack.push(path);
                } else if file_type.is_file()
                    && let Ok(rel) = path.strip_prefix(&self.root)
                {
                    results.push(rel.to_string_lossy().replace('\\', "/"));
                }
            }
        }

        results.sort();
        Ok(results)
    }

    fn backend_name(&self) -> &'static str {
        "filesystem"
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn health_check(&self) -> StorageResult<()> {
        let metadata = fs::metadata(&self.root).await.map_err(|e| {
            StorageError::Io(std::io::Error::new(
                e.kind(),
                format!("storage root not accessible: {e}"),
            ))
        })?;

        if !metadata.is_dir() {
            return Err(StorageError::Config(format!(
                "storage root is not a directory: {}",
                self.root.display()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path()).await.unwrap();

        let key = "packages/foo/1.0.0/foo.1.0.0.nupkg";
        let data = Bytes::from("hello world");

        backend.put(key, data.clone()).await.unwrap();
        assert!(backend.exists(key).await.unwrap());
        assert_eq!(backend.get(key).await.unwrap(), data);
    }

    #[tokio::test]
    async fn test_put_replaces_existing() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path()).await.unwrap();

        backend.put("a/b", Bytes::from("first")).await.unwrap();
        backend.put("a/b", Bytes::from("second")).await.unwrap();
        assert_eq!(backend.get("a/b").await.unwrap(), Bytes::from("second"));

        // No temp files left behind.
        assert_eq!(backend.list("a").await.unwrap(), vec!["a/b".to_string()]);
    }

    #[tokio::test]
    async fn test_get_stream_large_object() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path()).await.unwrap();

        let data = Bytes::from(vec![7u8; STREAM_CHUNK_SIZE * 2 + 10]);
        backend.put("big", data.clone()).await.unwrap();

        let chunks: Vec<Bytes> = backend
            .get_stream("big")
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert!(chunks.len() >= 3);
        assert_eq!(chunks.concat(), data.to_vec());
    }

    #[tokio::test]
    async fn test_missing_objects() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path()).await.unwrap();

        assert!(!backend.exists("nope").await.unwrap());
        assert!(backend.get("nope").await.unwrap_err().is_not_found());
        assert!(backend.get_stream("nope").await.err().unwrap().is_not_found());
        assert!(backend.delete("nope").await.unwrap_err().is_not_found());
        assert!(backend.list("nope").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_path_traversal_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path()).await.unwrap();

        assert!(backend.exists("../escape").await.is_err());
        assert!(backend.exists("/absolute/path").await.is_err());
        assert!(backend.exists("foo/../bar").await.is_err());
        assert!(backend.exists("foo\\bar").await.is_err());
        assert!(backend.exists("").await.is_err());

        assert!(backend.exists("valid/nested/key").await.is_ok());
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn test_symlink_traversal_rejected() {
        use std::os::unix::fs::symlink;

        let dir = tempfile::tempdir().unwrap();
        let outside_dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path()).await.unwrap();

        symlink(outside_dir.path(), dir.path().join("escape")).unwrap();

        let result = backend
            .put("escape/nested/file.txt", Bytes::from("data"))
            .await;
        match result {
            Err(StorageError::InvalidKey(msg)) => assert!(msg.contains("escapes storage root")),
            other => panic!("expected InvalidKey error, got: {other:?}"),
        }
        assert!(!outside_dir.path().join("nested").exists());
    }

    #[tokio::test]
    async fn test_health_check() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path().join("root")).await.unwrap();
        backend.health_check().await.unwrap();
        assert_eq!(backend.backend_name(), "filesystem");
    }
}
