use crate::generator::KeyGenerator;
use crate::settings::ServiceSettings;
use async_trait::async_trait;
use jiff::{SignedDuration, Timestamp};
use keyway_core::{
    AllocatorError, ExpirationPolicy, IdentifierAllocator, LookupCache, MappingStore, PutOutcome,
    ShortKey, ShortenParams, Shortener, ShortenerError, UrlMapping,
};
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};
use url::Url;

type Result<T> = std::result::Result<T, ShortenerError>;

const MAX_URL_LENGTH: usize = 2048;

/// A concrete implementation of the `Shortener` trait.
///
/// Creation runs allocate, encode, conditional write, then cache
/// write-through. Resolution validates the key, then goes cache, store and
/// cache populate. The store's conditional write is the only thing that
/// decides who owns a key; the cache is never consulted for that.
pub struct ShortenerService<S, C, A> {
    store: S,
    cache: C,
    generator: KeyGenerator<A>,
    settings: ServiceSettings,
}

impl<S, C, A> ShortenerService<S, C, A>
where
    S: MappingStore,
    C: LookupCache,
    A: IdentifierAllocator,
{
    pub fn new(store: S, cache: C, allocator: A, settings: ServiceSettings) -> Self {
        Self {
            store,
            cache,
            generator: KeyGenerator::new(allocator),
            settings,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn cache(&self) -> &C {
        &self.cache
    }

    pub fn settings(&self) -> &ServiceSettings {
        &self.settings
    }

    /// Validates that the URL has a valid format (has a scheme and host).
    fn validate_url(url: &str) -> Result<()> {
        if url.is_empty() {
            return Err(ShortenerError::InvalidUrl(
                "URL cannot be empty".to_string(),
            ));
        }

        if url.len() > MAX_URL_LENGTH {
            return Err(ShortenerError::InvalidUrl(format!(
                "URL is longer than {MAX_URL_LENGTH} bytes"
            )));
        }

        if url.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(ShortenerError::InvalidUrl(
                "URL must not contain whitespace or control characters".to_string(),
            ));
        }

        let Some((scheme, rest)) = url.split_once("://") else {
            return Err(ShortenerError::InvalidUrl(format!(
                "URL must have a valid scheme and host: {url}"
            )));
        };

        let scheme = scheme.to_ascii_lowercase();
        if scheme != "http" && scheme != "https" {
            return Err(ShortenerError::InvalidUrl(format!(
                "URL scheme must be http or https: {scheme}"
            )));
        }

        // `Url::parse` skips extra slashes, so `https:///path` would gain a host.
        if rest.starts_with('/') {
            return Err(ShortenerError::InvalidUrl(format!(
                "URL must have a host: {url}"
            )));
        }

        let parsed = Url::parse(url)
            .map_err(|e| ShortenerError::InvalidUrl(format!("{e}: {url}")))?;
        if !matches!(parsed.host_str(), Some(host) if !host.is_empty()) {
            return Err(ShortenerError::InvalidUrl(format!(
                "URL must have a host: {url}"
            )));
        }

        Ok(())
    }

    /// Converts the expiration policy into an absolute instant.
    fn expires_at(policy: &ExpirationPolicy, now: Timestamp) -> Result<Option<Timestamp>> {
        match policy {
            ExpirationPolicy::Never => Ok(None),
            ExpirationPolicy::AfterDuration(duration) => {
                if duration.is_zero() {
                    return Err(ShortenerError::InvalidExpiration(
                        "ttl must be positive".to_string(),
                    ));
                }
                let duration = SignedDuration::try_from(*duration)
                    .map_err(|e| ShortenerError::InvalidExpiration(e.to_string()))?;
                now.checked_add(duration)
                    .map(Some)
                    .map_err(|e| ShortenerError::InvalidExpiration(e.to_string()))
            }
            ExpirationPolicy::AtTimestamp(at) if *at <= now => Err(
                ShortenerError::InvalidExpiration(format!("{at} is not in the future")),
            ),
            ExpirationPolicy::AtTimestamp(at) => Ok(Some(*at)),
        }
    }

    /// One conditional write, bounded by the write timeout.
    ///
    /// When the write times out its outcome is unknown, so the key is read
    /// back once: finding our own mapping means the write landed, finding
    /// another mapping means we lost, finding nothing is reported as a
    /// retryable timeout.
    async fn attempt(&self, mapping: &UrlMapping) -> Result<PutOutcome> {
        let write = async {
            if mapping.owner_alias {
                self.store.put_alias(mapping.clone()).await
            } else {
                self.store.put_if_absent(mapping.clone()).await
            }
        };

        match tokio::time::timeout(self.settings.write_timeout, write).await {
            Ok(outcome) => Ok(outcome?),
            Err(_) => {
                warn!(key = %mapping.key, "conditional write timed out, verifying");
                match self.store.get(&mapping.key).await? {
                    Some(existing)
                        if existing.target_url == mapping.target_url
                            && existing.created_at == mapping.created_at =>
                    {
                        debug!(key = %mapping.key, "verification found our write");
                        Ok(PutOutcome::Created)
                    }
                    Some(existing) => Ok(PutOutcome::AlreadyExists(existing)),
                    None => Err(ShortenerError::Timeout(mapping.key.to_string())),
                }
            }
        }
    }

    async fn shorten_alias(&self, alias: String, request: PendingMapping) -> Result<ShortKey> {
        let mapping = request.with_key(ShortKey::alias(alias)?, true);

        match self.attempt(&mapping).await? {
            PutOutcome::Created => {
                info!(key = %mapping.key, "created alias");
                self.populate_cache(&mapping, true).await;
                Ok(mapping.key)
            }
            PutOutcome::AlreadyExists(_) => {
                debug!(key = %mapping.key, "alias already taken");
                Err(ShortenerError::AliasTaken(mapping.key.to_string()))
            }
        }
    }

    async fn shorten_generated(&self, request: PendingMapping) -> Result<ShortKey> {
        let attempts = self.settings.max_alias_skips.saturating_add(1);

        for _ in 0..attempts {
            let (id, key) = self.generator.next_key().await?;
            let mapping = request.with_key(key, false);

            match self.attempt(&mapping).await? {
                PutOutcome::Created => {
                    info!(key = %mapping.key, id, "created short url");
                    self.populate_cache(&mapping, true).await;
                    return Ok(mapping.key);
                }
                PutOutcome::AlreadyExists(existing) if existing.owner_alias => {
                    warn!(key = %mapping.key, id, "generated key is taken by an alias, skipping");
                }
                PutOutcome::AlreadyExists(_) => {
                    error!(key = %mapping.key, id, "allocator issued an identifier twice");
                    return Err(ShortenerError::AllocatorInvariantViolated {
                        key: mapping.key.to_string(),
                        id,
                    });
                }
            }
        }

        Err(AllocatorError::Exhausted(format!(
            "{attempts} consecutive generated keys were taken by aliases"
        ))
        .into())
    }

    /// Write-through / read-through population. Failures only cost latency.
    async fn populate_cache(&self, mapping: &UrlMapping, fresh: bool) {
        let mut ttl = if fresh {
            self.settings
                .fresh_cache_ttl
                .unwrap_or(self.settings.cache_ttl)
        } else {
            self.settings.cache_ttl
        };
        if let Some(remaining) = mapping.remaining_ttl(Timestamp::now()) {
            ttl = ttl.min(remaining);
        }
        if ttl == Duration::ZERO {
            return;
        }

        if let Err(e) = self
            .cache
            .put(&mapping.key, &mapping.target_url, ttl)
            .await
        {
            warn!(key = %mapping.key, error = %e, "failed to populate cache");
        }
    }
}

/// A validated request waiting for its key.
struct PendingMapping {
    target_url: String,
    created_at: Timestamp,
    expires_at: Option<Timestamp>,
}

impl PendingMapping {
    fn with_key(&self, key: ShortKey, owner_alias: bool) -> UrlMapping {
        UrlMapping::new(
            key,
            self.target_url.clone(),
            self.created_at,
            self.expires_at,
            owner_alias,
        )
    }
}

/// Current time truncated to what every store can represent.
fn now_millis() -> Timestamp {
    let now = Timestamp::now();
    Timestamp::from_millisecond(now.as_millisecond()).unwrap_or(now)
}

#[async_trait]
impl<S, C, A> Shortener for ShortenerService<S, C, A>
where
    S: MappingStore,
    C: LookupCache,
    A: IdentifierAllocator,
{
    async fn shorten(&self, params: ShortenParams) -> Result<ShortKey> {
        Self::validate_url(&params.url)?;

        let created_at = now_millis();
        let request = PendingMapping {
            expires_at: Self::expires_at(&params.expiration, created_at)?,
            target_url: params.url,
            created_at,
        };

        match params.custom_alias {
            Some(alias) => self.shorten_alias(alias, request).await,
            None => self.shorten_generated(request).await,
        }
    }

    async fn resolve(&self, key: &str) -> Result<Option<String>> {
        let key = ShortKey::parse(key)?;

        match self.cache.get(&key).await {
            Ok(Some(target_url)) => return Ok(Some(target_url)),
            Ok(None) => {}
            Err(e) => warn!(key = %key, error = %e, "cache lookup failed, using store"),
        }

        let Some(mapping) = self.store.get(&key).await? else {
            trace!(key = %key, "key not found");
            return Ok(None);
        };

        self.populate_cache(&mapping, false).await;
        Ok(Some(mapping.target_url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyway_cache::MokaLookupCache;
    use keyway_core::{NoCache, StorageError};
    use keyway_idalloc::{BlockAllocator, InMemoryBlockAuthority};
    use keyway_storage::{MemoryShard, ShardedStore};
    use std::sync::Arc;

    type Store = Arc<ShardedStore<MemoryShard>>;
    type Allocator = BlockAllocator<InMemoryBlockAuthority>;

    /// First identifier with a three symbol key ("100").
    const FIRST_THREE_SYMBOL_ID: u64 = 62 * 62;

    fn memory_store() -> Store {
        Arc::new(
            ShardedStore::with_uniform_routing(vec![MemoryShard::new(), MemoryShard::new()])
                .unwrap(),
        )
    }

    fn service_starting_at(
        first_id: u64,
        settings: ServiceSettings,
    ) -> ShortenerService<Store, Arc<MokaLookupCache>, Allocator> {
        ShortenerService::new(
            memory_store(),
            Arc::new(MokaLookupCache::default()),
            BlockAllocator::new(InMemoryBlockAuthority::starting_at(first_id), 0),
            settings,
        )
    }

    fn test_service() -> ShortenerService<Store, Arc<MokaLookupCache>, Allocator> {
        service_starting_at(1, ServiceSettings::default())
    }

    /// Applies the write, then stalls past any sensible timeout.
    struct SlowAckStore {
        inner: Store,
        delay: Duration,
    }

    #[async_trait]
    impl MappingStore for SlowAckStore {
        async fn put_if_absent(
            &self,
            mapping: UrlMapping,
        ) -> keyway_core::store::Result<PutOutcome> {
            let outcome = self.inner.put_if_absent(mapping).await?;
            tokio::time::sleep(self.delay).await;
            Ok(outcome)
        }

        async fn get(&self, key: &ShortKey) -> keyway_core::store::Result<Option<UrlMapping>> {
            self.inner.get(key).await
        }

        async fn find_by_url(
            &self,
            target_url: &str,
        ) -> keyway_core::store::Result<Vec<ShortKey>> {
            self.inner.find_by_url(target_url).await
        }

        async fn purge_expired(&self, now: Timestamp) -> keyway_core::store::Result<usize> {
            self.inner.purge_expired(now).await
        }
    }

    /// Never completes a write and never finds anything.
    struct BlackHoleStore;

    #[async_trait]
    impl MappingStore for BlackHoleStore {
        async fn put_if_absent(
            &self,
            _mapping: UrlMapping,
        ) -> keyway_core::store::Result<PutOutcome> {
            std::future::pending().await
        }

        async fn get(&self, _key: &ShortKey) -> keyway_core::store::Result<Option<UrlMapping>> {
            Ok(None)
        }

        async fn find_by_url(&self, _url: &str) -> keyway_core::store::Result<Vec<ShortKey>> {
            Ok(Vec::new())
        }

        async fn purge_expired(&self, _now: Timestamp) -> keyway_core::store::Result<usize> {
            Ok(0)
        }
    }

    struct DownStore;

    #[async_trait]
    impl MappingStore for DownStore {
        async fn put_if_absent(
            &self,
            _mapping: UrlMapping,
        ) -> keyway_core::store::Result<PutOutcome> {
            Err(StorageError::Unavailable("connection refused".into()))
        }

        async fn get(&self, _key: &ShortKey) -> keyway_core::store::Result<Option<UrlMapping>> {
            Err(StorageError::Unavailable("connection refused".into()))
        }

        async fn find_by_url(&self, _url: &str) -> keyway_core::store::Result<Vec<ShortKey>> {
            Err(StorageError::Unavailable("connection refused".into()))
        }

        async fn purge_expired(&self, _now: Timestamp) -> keyway_core::store::Result<usize> {
            Ok(0)
        }
    }

    fn preexisting(key: &str, owner_alias: bool) -> UrlMapping {
        UrlMapping::new(
            ShortKey::new_unchecked(key),
            "https://squatter.example",
            Timestamp::now(),
            None,
            owner_alias,
        )
    }

    #[tokio::test]
    async fn shorten_with_generated_key() {
        let service = test_service();

        let key = service
            .shorten(ShortenParams::new("https://example.com"))
            .await
            .unwrap();
        assert_eq!(key.as_str(), "1");
        assert_eq!(key.identifier(), Some(1));

        let key = service
            .shorten(ShortenParams::new("https://example.com"))
            .await
            .unwrap();
        assert_eq!(key.as_str(), "2");
    }

    #[tokio::test]
    async fn shorten_with_custom_alias() {
        let service = test_service();

        let key = service
            .shorten(ShortenParams::new("https://example.com").with_alias("my-alias"))
            .await
            .unwrap();
        assert_eq!(key.as_str(), "my-alias");

        let stored = service.store().get(&key).await.unwrap().unwrap();
        assert!(stored.owner_alias);
    }

    #[tokio::test]
    async fn shorten_with_duplicate_alias_fails() {
        let service = test_service();

        service
            .shorten(ShortenParams::new("https://example1.com").with_alias("promo"))
            .await
            .unwrap();
        let err = service
            .shorten(ShortenParams::new("https://example2.com").with_alias("promo"))
            .await
            .unwrap_err();
        assert!(matches!(err, ShortenerError::AliasTaken(ref key) if key == "promo"));

        let url = service.resolve("promo").await.unwrap();
        assert_eq!(url.as_deref(), Some("https://example1.com"));
    }

    #[tokio::test]
    async fn shorten_with_invalid_alias_fails() {
        let service = test_service();

        let too_long = "x".repeat(33);
        for alias in ["ab", "has space", "semi;colon", too_long.as_str()] {
            let err = service
                .shorten(ShortenParams::new("https://example.com").with_alias(alias))
                .await
                .unwrap_err();
            assert!(matches!(err, ShortenerError::InvalidAlias(_)), "{alias}");
        }
    }

    #[tokio::test]
    async fn shorten_with_invalid_url_fails() {
        let service = test_service();

        for url in [
            "",
            "not-a-valid-url",
            "ftp://example.com",
            "https://",
            "https:///path",
            "https://exa mple.com",
            "http://@",
            "https://:",
            "http://[::1",
            "https://exa%zzmple.com",
            "http://a:notaport/",
        ] {
            let err = service.shorten(ShortenParams::new(url)).await.unwrap_err();
            assert!(matches!(err, ShortenerError::InvalidUrl(_)), "{url:?}");
        }
    }

    #[tokio::test]
    async fn shorten_with_invalid_expiration_fails() {
        let service = test_service();

        let past = Timestamp::now() - SignedDuration::from_secs(1);
        for expiration in [
            ExpirationPolicy::AfterDuration(Duration::ZERO),
            ExpirationPolicy::AtTimestamp(past),
        ] {
            let err = service
                .shorten(ShortenParams::new("https://example.com").with_expiration(expiration))
                .await
                .unwrap_err();
            assert!(matches!(err, ShortenerError::InvalidExpiration(_)));
        }
    }

    #[tokio::test]
    async fn generated_key_skips_existing_alias() {
        let service = service_starting_at(FIRST_THREE_SYMBOL_ID, ServiceSettings::default());
        service
            .store()
            .put_alias(preexisting("100", true))
            .await
            .unwrap();

        let key = service
            .shorten(ShortenParams::new("https://example.com"))
            .await
            .unwrap();
        assert_eq!(key.as_str(), "101");

        let squatter = service.resolve("100").await.unwrap();
        assert_eq!(squatter.as_deref(), Some("https://squatter.example"));
    }

    #[tokio::test]
    async fn alias_skips_are_bounded() {
        let settings = ServiceSettings::builder().max_alias_skips(1).build();
        let service = service_starting_at(FIRST_THREE_SYMBOL_ID, settings);
        for key in ["100", "101"] {
            service
                .store()
                .put_alias(preexisting(key, true))
                .await
                .unwrap();
        }

        let err = service
            .shorten(ShortenParams::new("https://example.com"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ShortenerError::Allocator(AllocatorError::Exhausted(_))
        ));
    }

    #[tokio::test]
    async fn duplicate_generated_key_is_an_invariant_violation() {
        let service = service_starting_at(FIRST_THREE_SYMBOL_ID, ServiceSettings::default());
        service
            .store()
            .put_if_absent(preexisting("100", false))
            .await
            .unwrap();

        let err = service
            .shorten(ShortenParams::new("https://example.com"))
            .await
            .unwrap_err();
        match err {
            ShortenerError::AllocatorInvariantViolated { key, id } => {
                assert_eq!(key, "100");
                assert_eq!(id, FIRST_THREE_SYMBOL_ID);
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let squatter = service.resolve("100").await.unwrap();
        assert_eq!(squatter.as_deref(), Some("https://squatter.example"));
    }

    #[tokio::test]
    async fn created_mapping_is_written_through_to_cache() {
        let service = test_service();

        let key = service
            .shorten(ShortenParams::new("https://example.com"))
            .await
            .unwrap();
        assert_eq!(
            service.cache().get(&key).await.unwrap().as_deref(),
            Some("https://example.com")
        );
    }

    #[tokio::test]
    async fn resolve_populates_cache_from_store() {
        let service = test_service();
        service
            .store()
            .put_if_absent(preexisting("abc", false))
            .await
            .unwrap();
        let key = ShortKey::new_unchecked("abc");
        assert!(service.cache().get(&key).await.unwrap().is_none());

        let url = service.resolve("abc").await.unwrap();
        assert_eq!(url.as_deref(), Some("https://squatter.example"));
        assert!(service.cache().get(&key).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn resolve_nonexistent_key() {
        let service = test_service();
        assert!(service.resolve("nonexistent").await.unwrap().is_none());
        assert!(service.resolve("zzz").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn resolve_malformed_key_fails() {
        let service = test_service();
        for key in ["", "!!", "a/b", "0abc%"] {
            let err = service.resolve(key).await.unwrap_err();
            assert!(matches!(err, ShortenerError::MalformedKey(_)), "{key:?}");
        }
    }

    #[tokio::test]
    async fn cache_entry_never_outlives_mapping() {
        let service = test_service();

        let key = service
            .shorten(
                ShortenParams::new("https://example.com")
                    .with_expiration(ExpirationPolicy::AfterDuration(Duration::from_millis(100))),
            )
            .await
            .unwrap();
        assert!(service.cache().get(&key).await.unwrap().is_some());

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(service.cache().get(&key).await.unwrap().is_none());
        assert!(service.resolve(key.as_str()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn timed_out_write_that_landed_counts_as_created() {
        let store = SlowAckStore {
            inner: memory_store(),
            delay: Duration::from_secs(5),
        };
        let service = ShortenerService::new(
            store,
            NoCache,
            BlockAllocator::new(InMemoryBlockAuthority::new(), 0),
            ServiceSettings::builder()
                .write_timeout(Duration::from_millis(50))
                .build(),
        );

        let key = service
            .shorten(ShortenParams::new("https://example.com"))
            .await
            .unwrap();
        let url = service.resolve(key.as_str()).await.unwrap();
        assert_eq!(url.as_deref(), Some("https://example.com"));
    }

    #[tokio::test]
    async fn timed_out_alias_write_that_lost_is_taken() {
        let inner = memory_store();
        inner.put_alias(preexisting("promo", true)).await.unwrap();
        let service = ShortenerService::new(
            SlowAckStore {
                inner,
                delay: Duration::from_secs(5),
            },
            NoCache,
            BlockAllocator::new(InMemoryBlockAuthority::new(), 0),
            ServiceSettings::builder()
                .write_timeout(Duration::from_millis(50))
                .build(),
        );

        let err = service
            .shorten(ShortenParams::new("https://example.com").with_alias("promo"))
            .await
            .unwrap_err();
        assert!(matches!(err, ShortenerError::AliasTaken(_)));
    }

    #[tokio::test]
    async fn timed_out_write_with_nothing_stored_is_retryable() {
        let service = ShortenerService::new(
            BlackHoleStore,
            NoCache,
            BlockAllocator::new(InMemoryBlockAuthority::new(), 0),
            ServiceSettings::builder()
                .write_timeout(Duration::from_millis(20))
                .build(),
        );

        let err = service
            .shorten(ShortenParams::new("https://example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, ShortenerError::Timeout(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn storage_outage_is_retryable() {
        let service = ShortenerService::new(
            DownStore,
            NoCache,
            BlockAllocator::new(InMemoryBlockAuthority::new(), 0),
            ServiceSettings::default(),
        );

        let err = service
            .shorten(ShortenParams::new("https://example.com"))
            .await
            .unwrap_err();
        assert!(err.is_retryable());

        let err = service.resolve("abc").await.unwrap_err();
        assert!(matches!(err, ShortenerError::Storage(_)));
    }
}
