use crate::error::CacheError;
use crate::shortcode::ShortKey;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

pub type Result<T> = std::result::Result<T, CacheError>;

/// A node-local cache of key to target URL lookups.
///
/// The cache is advisory. A miss, an eviction or a failing cache only
/// costs latency; the [`MappingStore`](crate::MappingStore) stays the
/// source of truth.
#[async_trait]
pub trait LookupCache: Send + Sync + 'static {
    /// Get the target URL from cache.
    ///
    /// Returns `Ok(None)` if the key is not in the cache.
    async fn get(&self, key: &ShortKey) -> Result<Option<String>>;

    /// Store the target URL for at most `ttl`.
    async fn put(&self, key: &ShortKey, target_url: &str, ttl: Duration) -> Result<()>;

    /// Remove the entry. It is not an error if the key does not exist.
    async fn invalidate(&self, key: &ShortKey) -> Result<()>;
}

#[async_trait]
impl<T: LookupCache + ?Sized> LookupCache for Arc<T> {
    async fn get(&self, key: &ShortKey) -> Result<Option<String>> {
        (**self).get(key).await
    }

    async fn put(&self, key: &ShortKey, target_url: &str, ttl: Duration) -> Result<()> {
        (**self).put(key, target_url, ttl).await
    }

    async fn invalidate(&self, key: &ShortKey) -> Result<()> {
        (**self).invalidate(key).await
    }
}

/// A cache that never holds anything. Every lookup falls through to the store.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCache;

#[async_trait]
impl LookupCache for NoCache {
    async fn get(&self, _key: &ShortKey) -> Result<Option<String>> {
        Ok(None)
    }

    async fn put(&self, _key: &ShortKey, _target_url: &str, _ttl: Duration) -> Result<()> {
        Ok(())
    }

    async fn invalidate(&self, _key: &ShortKey) -> Result<()> {
        Ok(())
    }
}
