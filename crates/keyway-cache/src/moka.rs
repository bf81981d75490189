use async_trait::async_trait;
use keyway_core::cache::Result;
use keyway_core::{LookupCache, ShortKey};
use moka::future::Cache;
use moka::policy::EvictionPolicy;
use moka::Expiry;
use std::time::{Duration, Instant};
use tracing::{debug, trace};
use typed_builder::TypedBuilder;

#[derive(Debug, Clone)]
struct CachedTarget {
    target_url: String,
    ttl: Duration,
}

/// Expires every entry after the ttl it was inserted with.
struct PerEntryTtl;

impl Expiry<String, CachedTarget> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &CachedTarget,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &CachedTarget,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// Settings for a [`MokaLookupCache`].
#[derive(Debug, Clone, TypedBuilder)]
pub struct CacheSettings {
    /// Maximum number of entries held at once.
    #[builder(default = 100_000)]
    pub max_capacity: u64,
    /// Upper bound on any entry's lifetime.
    #[builder(default = Duration::from_secs(3600))]
    pub max_ttl: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// A bounded, in-process LRU cache of key to target URL lookups.
///
/// Each entry lives for the ttl it was put with, capped by
/// [`CacheSettings::max_ttl`]. Only positive lookups are ever stored, so a
/// key created on another node is never shadowed by a stale miss here.
#[derive(Clone)]
pub struct MokaLookupCache {
    cache: Cache<String, CachedTarget>,
    max_ttl: Duration,
}

impl MokaLookupCache {
    pub fn new(settings: CacheSettings) -> Self {
        let cache = Cache::builder()
            .max_capacity(settings.max_capacity)
            .eviction_policy(EvictionPolicy::lru())
            .expire_after(PerEntryTtl)
            .build();
        Self {
            cache,
            max_ttl: settings.max_ttl,
        }
    }

    /// Creates a cache holding at most `max_capacity` entries.
    pub fn with_capacity(max_capacity: u64) -> Self {
        Self::new(CacheSettings::builder().max_capacity(max_capacity).build())
    }

    /// Approximate number of live entries.
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    /// Applies pending evictions and expirations right away.
    pub async fn run_pending_tasks(&self) {
        self.cache.run_pending_tasks().await;
    }
}

impl Default for MokaLookupCache {
    fn default() -> Self {
        Self::new(CacheSettings::default())
    }
}

impl std::fmt::Debug for MokaLookupCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MokaLookupCache")
            .field("entry_count", &self.cache.entry_count())
            .field("max_ttl", &self.max_ttl)
            .finish()
    }
}

#[async_trait]
impl LookupCache for MokaLookupCache {
    async fn get(&self, key: &ShortKey) -> Result<Option<String>> {
        match self.cache.get(key.as_str()).await {
            Some(entry) => {
                trace!(key = %key, "cache hit");
                Ok(Some(entry.target_url))
            }
            None => {
                trace!(key = %key, "cache miss");
                Ok(None)
            }
        }
    }

    async fn put(&self, key: &ShortKey, target_url: &str, ttl: Duration) -> Result<()> {
        let ttl = ttl.min(self.max_ttl);
        if ttl.is_zero() {
            trace!(key = %key, "zero ttl, not caching");
            return Ok(());
        }

        self.cache
            .insert(
                key.as_str().to_owned(),
                CachedTarget {
                    target_url: target_url.to_owned(),
                    ttl,
                },
            )
            .await;
        debug!(key = %key, ttl_ms = ttl.as_millis() as u64, "cached target url");
        Ok(())
    }

    async fn invalidate(&self, key: &ShortKey) -> Result<()> {
        self.cache.invalidate(key.as_str()).await;
        trace!(key = %key, "invalidated cache entry");
        Ok(())
    }
}
