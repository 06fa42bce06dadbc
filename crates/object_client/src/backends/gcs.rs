//! Google Cloud Storage backend over the `object_store` crate.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use object_store::gcp::{GoogleCloudStorage, GoogleCloudStorageBuilder};
use tracing::debug;

use super::remote;
use crate::secrets::GoogleCredentials;
use crate::{ByteStream, ObjectClient, ObjectResult};

#[derive(Debug)]
pub struct GoogleClient {
    store: Arc<GoogleCloudStorage>,
}

impl GoogleClient {
    /// Builds against the configured bucket; the service account comes from
    /// the ambient environment (`GOOGLE_SERVICE_ACCOUNT` et al).
    pub fn new(creds: &GoogleCredentials) -> ObjectResult<Self> {
        let store = GoogleCloudStorageBuilder::from_env()
            .with_bucket_name(&creds.bucket)
            .build()?;

        debug!(bucket = %creds.bucket, "created GCS object client");

        Ok(GoogleClient {
            store: Arc::new(store),
        })
    }
}

#[async_trait]
impl ObjectClient for GoogleClient {
    async fn exists(&self, key: &str) -> ObjectResult<bool> {
        remote::exists(self.store.as_ref(), key).await
    }

    async fn reader(&self, key: &str, offset: u64, size: u64) -> ObjectResult<ByteStream> {
        remote::reader(self.store.clone(), key, offset, size).await
    }

    async fn write(&self, key: &str, data: Bytes) -> ObjectResult<()> {
        remote::write(self.store.as_ref(), key, data).await
    }

    async fn delete(&self, key: &str) -> ObjectResult<()> {
        remote::delete(self.store.as_ref(), key).await
    }
}
