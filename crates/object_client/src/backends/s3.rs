//! Amazon S3 backend over the `object_store` crate.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use object_store::aws::{AmazonS3, AmazonS3Builder};
use tracing::debug;

use super::remote;
use crate::secrets::AmazonCredentials;
use crate::{ByteStream, ObjectClient, ObjectResult};

#[derive(Debug)]
pub struct AmazonClient {
    store: Arc<AmazonS3>,
}

impl AmazonClient {
    pub fn new(creds: &AmazonCredentials) -> ObjectResult<Self> {
        let mut builder = AmazonS3Builder::new()
            .with_bucket_name(&creds.bucket)
            .with_access_key_id(&creds.id)
            .with_secret_access_key(&creds.secret)
            .with_region(&creds.region);
        if !creds.token.is_empty() {
            builder = builder.with_token(&creds.token);
        }
        let store = builder.build()?;

        debug!(bucket = %creds.bucket, region = %creds.region, "created S3 object client");

        Ok(AmazonClient {
            store: Arc::new(store),
        })
    }
}

#[async_trait]
impl ObjectClient for AmazonClient {
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
