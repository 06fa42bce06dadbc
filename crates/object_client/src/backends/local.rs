//! Local filesystem backend: the degenerate client used when the block tier
//! runs without an object store.
//!
//! Keys map to paths under a root directory. Writes land in a sibling temp
//! file and are renamed into place, so readers never observe partial
//! objects.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;

use crate::{ByteStream, ObjectClient, ObjectError, ObjectResult};

#[derive(Debug)]
pub struct LocalClient {
    root: PathBuf,
}

impl LocalClient {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        LocalClient { root: root.into() }
    }

    fn object_path(&self, key: &str) -> ObjectResult<PathBuf> {
        let relative = Path::new(key);
        if relative.is_absolute()
            || relative
                .components()
                .any(|c| matches!(c, Component::ParentDir))
        {
            return Err(ObjectError::InvalidKey {
                key: key.to_string(),
                reason: "keys must be relative and must not traverse upward".to_string(),
            });
        }
        Ok(self.root.join(relative))
    }

    fn map_not_found(err: std::io::Error, key: &str) -> ObjectError {
        if err.kind() == std::io::ErrorKind::NotFound {
            ObjectError::NotFound {
                key: key.to_string(),
            }
        } else {
            ObjectError::Io { source: err }
        }
    }
}

#[async_trait]
impl ObjectClient for LocalClient {
    async fn exists(&self, key: &str) -> ObjectResult<bool> {
        let path = self.object_path(key)?;
        Ok(tokio::fs::try_exists(&path).await?)
    }

    async fn reader(&self, key: &str, offset: u64, size: u64) -> ObjectResult<ByteStream> {
        let path = self.object_path(key)?;
        let data = tokio::fs::read(&path)
            .await
            .map_err(|err| Self::map_not_found(err, key))?;

        let len = data.len() as u64;
        let lower = offset.min(len) as usize;
        let upper = if size == 0 {
            len as usize
        } else {
            (offset + size).min(len) as usize
        };
        let chunk = Bytes::from(data).slice(lower..upper.max(lower));

        Ok(futures::stream::iter([Ok(chunk)]).boxed())
    }

    async fn write(&self, key: &str, data: Bytes) -> ObjectResult<()> {
        let path = self.object_path(key)?;
        let parent = path.parent().unwrap_or(&self.root);
        tokio::fs::create_dir_all(parent).await?;

        // Temp-and-rename: a crash mid-write leaves a temp file behind, never
        // a truncated object at the final path.
        let tmp = parent.join(format!(".tmp-{}", uuid::Uuid::new_v4()));
        tokio::fs::write(&tmp, &data).await?;
        if let Err(err) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(err.into());
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> ObjectResult<()> {
        let path = self.object_path(key)?;
        tokio::fs::remove_file(&path)
            .await
            .map_err(|err| Self::map_not_found(err, key))
    }

    /// Local disk failures do not heal on retry.
    fn is_retryable(&self, _err: &ObjectError) -> bool {
        false
    }
}
