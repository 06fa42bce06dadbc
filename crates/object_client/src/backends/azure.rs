//! Azure Blob Storage backend over the `object_store` crate.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use object_store::azure::{MicrosoftAzure, MicrosoftAzureBuilder};
use tracing::debug;

use super::remote;
use crate::secrets::MicrosoftCredentials;
use crate::{ByteStream, ObjectClient, ObjectResult};

#[derive(Debug)]
pub struct MicrosoftClient {
    store: Arc<MicrosoftAzure>,
}

impl MicrosoftClient {
    pub fn new(creds: &MicrosoftCredentials) -> ObjectResult<Self> {
        let store = MicrosoftAzureBuilder::new()
            .with_container_name(&creds.container)
            .with_account(&creds.id)
            .with_access_key(&creds.secret)
            .build()?;

        debug!(container = %creds.container, "created Azure object client");

        Ok(MicrosoftClient {
            store: Arc::new(store),
        })
    }
}

#[async_trait]
impl ObjectClient for MicrosoftClient {
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
