use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::{stream::BoxStream, StreamExt};

use crate::{ObjectError, ObjectResult};

/// Chunked object contents.
pub type ByteStream = BoxStream<'static, ObjectResult<Bytes>>;

/// Capability set over a blob store, polymorphic over vendor backends.
///
/// Error classification hangs off the trait rather than off concrete error
/// types so each vendor can refine what counts as transient.
#[async_trait]
pub trait ObjectClient: Send + Sync + std::fmt::Debug {
    /// Whether an object exists at `key`.
    async fn exists(&self, key: &str) -> ObjectResult<bool>;

    /// Stream the object at `key`, starting at `offset`. A `size` of 0 reads
    /// to the end of the object.
    async fn reader(&self, key: &str, offset: u64, size: u64) -> ObjectResult<ByteStream>;

    /// Write a complete object at `key`.
    async fn write(&self, key: &str, data: Bytes) -> ObjectResult<()>;

    /// Delete the object at `key`. Deleting a missing object is an error the
    /// caller can discount via [`is_not_exist`](Self::is_not_exist).
    async fn delete(&self, key: &str) -> ObjectResult<()>;

    /// Whether `err` is transient and worth retrying against this vendor.
    fn is_retryable(&self, err: &ObjectError) -> bool {
        matches!(err, ObjectError::Network { .. } | ObjectError::Io { .. })
    }

    /// Whether `err` means the object does not exist.
    fn is_not_exist(&self, err: &ObjectError) -> bool {
        matches!(err, ObjectError::NotFound { .. })
    }
}

/// Read a full object into memory through [`ObjectClient::reader`].
pub async fn read_all(client: &dyn ObjectClient, key: &str) -> ObjectResult<Bytes> {
    let mut stream = client.reader(key, 0, 0).await?;
    let mut buf = BytesMut::new();
    while let Some(chunk) = stream.next().await {
        buf.extend_from_slice(&chunk?);
    }
    Ok(buf.freeze())
}
