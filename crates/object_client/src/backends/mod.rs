//! Vendor backends for [`ObjectClient`](crate::ObjectClient).
//!
//! The three cloud vendors share their data path through the `object_store`
//! crate; [`remote`] holds that common plumbing so each vendor module is
//! construction plus classification.

pub mod azure;
pub mod gcs;
pub mod local;
pub mod s3;

pub(crate) mod remote {
    use std::sync::Arc;

    use bytes::Bytes;
    use futures::{StreamExt, TryStreamExt};
    use object_store::{path::Path, GetOptions, GetRange, ObjectStore};

    use crate::{ByteStream, ObjectError, ObjectResult};

    pub(crate) async fn exists(store: &dyn ObjectStore, key: &str) -> ObjectResult<bool> {
        match store.head(&Path::from(key)).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    pub(crate) async fn reader(
        store: Arc<dyn ObjectStore>,
        key: &str,
        offset: u64,
        size: u64,
    ) -> ObjectResult<ByteStream> {
        let range = match (offset, size) {
            (0, 0) => None,
            (_, 0) => Some(GetRange::Offset(offset)),
            _ => Some(GetRange::Bounded(offset..offset + size)),
        };
        let options = GetOptions {
            range,
            ..Default::default()
        };
        let result = store.get_opts(&Path::from(key), options).await?;
        Ok(result.into_stream().map_err(ObjectError::from).boxed())
    }

    pub(crate) async fn write(
        store: &dyn ObjectStore,
        key: &str,
        data: Bytes,
    ) -> ObjectResult<()> {
        store.put(&Path::from(key), data.into()).await?;
        Ok(())
    }

    pub(crate) async fn delete(store: &dyn ObjectStore, key: &str) -> ObjectResult<()> {
        store.delete(&Path::from(key)).await?;
        Ok(())
    }
}
