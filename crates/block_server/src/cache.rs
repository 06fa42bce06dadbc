//! Coordinated read-through block cache.
//!
//! Keyed by block hash, valued by complete block bytes, bounded by a byte
//! budget. Concurrent misses on one hash coalesce into a single object
//! store fill; all waiters share its result. Because blocks are content
//! addressed, a cached value can never go stale.

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use river_object_client::{retry_notify, ObjectClient, ObjectError, ObjectResult, RetryConfig};
use tracing::info;

use crate::local_store;

/// Default cache capacity: 10 GiB.
pub const DEFAULT_CACHE_BYTES: u64 = 10 * 1024 * 1024 * 1024;

pub struct BlockCache {
    cache: moka::future::Cache<String, Bytes>,
    client: Arc<dyn ObjectClient>,
}

impl BlockCache {
    pub fn new(client: Arc<dyn ObjectClient>, capacity_bytes: u64) -> Self {
        let cache = moka::future::Cache::builder()
            .max_capacity(capacity_bytes)
            .weigher(|_hash: &String, block: &Bytes| {
                block.len().try_into().unwrap_or(u32::MAX)
            })
            .build();
        BlockCache { cache, client }
    }

    /// Full bytes of the block `hash`, filling from the object store on a
    /// miss. A failed fill fails only this call; the slot is not poisoned.
    pub async fn get(&self, hash: &str) -> ObjectResult<Bytes> {
        let client = self.client.clone();
        let key = local_store::block_path(hash);
        self.cache
            .try_get_with(hash.to_string(), fill(client, key))
            .await
            .map_err(shared_error)
    }

    #[cfg(test)]
    async fn run_pending_tasks(&self) {
        self.cache.run_pending_tasks().await;
    }

    #[cfg(test)]
    fn weighted_size(&self) -> u64 {
        self.cache.weighted_size()
    }
}

async fn fill(client: Arc<dyn ObjectClient>, key: String) -> ObjectResult<Bytes> {
    let mut stream = retry_notify(
        &RetryConfig::exponential(),
        || client.reader(&key, 0, 0),
        |err| client.is_retryable(err),
        |err, delay| {
            info!(
                error = %err,
                time_till_next_retry = ?delay,
                "error creating block reader; retrying"
            );
        },
    )
    .await?;

    let mut buf = BytesMut::new();
    while let Some(chunk) = stream.next().await {
        buf.extend_from_slice(&chunk?);
    }
    Ok(buf.freeze())
}

/// `try_get_with` hands every waiter the same `Arc`-wrapped error; rebuild
/// an owned one, keeping the not-found classification intact.
fn shared_error(err: Arc<ObjectError>) -> ObjectError {
    match err.as_ref() {
        ObjectError::NotFound { key } => ObjectError::NotFound { key: key.clone() },
        other => ObjectError::Other(anyhow::anyhow!("block fill failed: {}", other)),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use river_object_client::ByteStream;

    use super::*;

    /// Serves a fixed payload for every key after a short delay, counting
    /// reader calls. Optionally fails the first `fail_first` reads.
    #[derive(Debug)]
    struct CountingBackend {
        payload: Bytes,
        reads: AtomicUsize,
        fail_first: usize,
    }

    impl CountingBackend {
        fn new(payload: &'static [u8]) -> Self {
            CountingBackend {
                payload: Bytes::from_static(payload),
                reads: AtomicUsize::new(0),
                fail_first: 0,
            }
        }
    }

    #[async_trait]
    impl ObjectClient for CountingBackend {
        async fn exists(&self, _key: &str) -> ObjectResult<bool> {
            Ok(true)
        }

        async fn reader(&self, key: &str, _offset: u64, _size: u64) -> ObjectResult<ByteStream> {
            let n = self.reads.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first {
                return Err(ObjectError::NotFound {
                    key: key.to_string(),
                });
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
            let payload = self.payload.clone();
            Ok(futures::stream::iter([Ok(payload)]).boxed())
        }

        async fn write(&self, _key: &str, _data: Bytes) -> ObjectResult<()> {
            Ok(())
        }

        async fn delete(&self, _key: &str) -> ObjectResult<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn hit_after_miss_reads_upstream_once() {
        let backend = Arc::new(CountingBackend::new(b"block bytes"));
        let cache = BlockCache::new(backend.clone(), DEFAULT_CACHE_BYTES);

        assert_eq!(cache.get("aaaa").await.unwrap(), "block bytes");
        assert_eq!(cache.get("aaaa").await.unwrap(), "block bytes");
        assert_eq!(backend.reads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_misses_share_one_fill() {
        let backend = Arc::new(CountingBackend::new(b"shared"));
        let cache = Arc::new(BlockCache::new(backend.clone(), DEFAULT_CACHE_BYTES));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move { cache.get("bbbb").await }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), "shared");
        }
        assert_eq!(backend.reads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_fill_does_not_poison_the_slot() {
        let backend = Arc::new(CountingBackend {
            payload: Bytes::from_static(b"eventually"),
            reads: AtomicUsize::new(0),
            fail_first: 1,
        });
        let cache = BlockCache::new(backend.clone(), DEFAULT_CACHE_BYTES);

        let err = cache.get("cccc").await.unwrap_err();
        assert!(backend.is_not_exist(&err));

        assert_eq!(cache.get("cccc").await.unwrap(), "eventually");
        assert_eq!(backend.reads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn oversized_fill_completes_and_is_evicted() {
        // Value larger than the whole cache: the fill must still return its
        // bytes, the entry just doesn't survive.
        let backend = Arc::new(CountingBackend::new(b"way too big for this cache"));
        let cache = BlockCache::new(backend.clone(), 4);

        assert_eq!(cache.get("dddd").await.unwrap(), "way too big for this cache");
        cache.run_pending_tasks().await;
        assert!(cache.weighted_size() <= 4);

        assert_eq!(cache.get("dddd").await.unwrap(), "way too big for this cache");
        assert_eq!(backend.reads.load(Ordering::SeqCst), 2);
    }
}
