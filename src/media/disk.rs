/// Disk-based media storage backend
use crate::{
    error::{ApiError, ApiResult},
    media::MediaBackend,
};
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use tokio::fs;

/// Stores media under a root directory, mirroring the relative paths
/// recorded in the database (`posts/{post_id}/{uuid}-{name}`).
#[derive(Clone)]
pub struct DiskMediaBackend {
    root: PathBuf,
}

impl DiskMediaBackend {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Resolve a stored relative path, refusing anything that escapes the root
    fn resolve(&self, relative: &str) -> ApiResult<PathBuf> {
        let relative = Path::new(relative);
        let safe = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if !safe {
            return Err(ApiError::Internal(format!(
                "Refusing media path outside root: {}",
                relative.display()
            )));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl MediaBackend for DiskMediaBackend {
    async fn put(&self, path: &str, data: &[u8]) -> ApiResult<()> {
        let full_path = self.resolve(path)?;
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        fs::write(&full_path, data).await?;
        Ok(())
    }

    async fn get(&self, path: &str) -> ApiResult<Option<Vec<u8>>> {
        let full_path = self.resolve(path)?;

        match fs::read(&full_path).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, path: &str) -> ApiResult<()> {
        let full_path = self.resolve(path)?;

        match fs::remove_file(&full_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_put_get_delete() {
        let dir = TempDir::new().unwrap();
        let backend = DiskMediaBackend::new(dir.path().to_path_buf());

        backend.put("posts/1/a.txt", b"hello").await.unwrap();
        assert!(dir.path().join("posts/1/a.txt").exists());
        assert_eq!(
            backend.get("posts/1/a.txt").await.unwrap().as_deref(),
            Some(&b"hello"[..])
        );

        backend.delete("posts/1/a.txt").await.unwrap();
        assert!(backend.get("posts/1/a.txt").await.unwrap().is_none());

        // Deleting twice is fine
        backend.delete("posts/1/a.txt").await.unwrap();
    }

    #[tokio::test]
    async fn test_rejects_path_traversal() {
        let dir = TempDir::new().unwrap();
        let backend = DiskMediaBackend::new(dir.path().to_path_buf());

        assert!(backend.put("../escape.txt", b"x").await.is_err());
        assert!(backend.put("/etc/passwd", b"x").await.is_err());
    }
}
