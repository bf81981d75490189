use crate::error::StorageError;
use crate::mapping::{PutOutcome, UrlMapping};
use crate::shortcode::ShortKey;
use async_trait::async_trait;
use jiff::Timestamp;
use std::sync::Arc;

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Durable key to URL storage with conditional writes.
///
/// The conditional write is the only serialization point between racing
/// writers: for a given key exactly one `put_if_absent` observes
/// [`PutOutcome::Created`], every other one observes the winner.
#[async_trait]
pub trait MappingStore: Send + Sync + 'static {
    /// Stores the mapping unless a live mapping already owns its key.
    async fn put_if_absent(&self, mapping: UrlMapping) -> Result<PutOutcome>;

    /// Stores a caller-chosen alias. Same atomicity as [`put_if_absent`].
    ///
    /// [`put_if_absent`]: MappingStore::put_if_absent
    async fn put_alias(&self, mapping: UrlMapping) -> Result<PutOutcome> {
        self.put_if_absent(mapping).await
    }

    /// Point lookup on the shard owning `key`.
    /// Returns `None` if the key does not exist or has expired.
    async fn get(&self, key: &ShortKey) -> Result<Option<UrlMapping>>;

    /// Live keys currently pointing at `target_url`, in key order.
    ///
    /// Mappings are partitioned by key, so this visits every shard.
    async fn find_by_url(&self, target_url: &str) -> Result<Vec<ShortKey>>;

    /// Deletes every mapping that expired as of `now`, returning how many.
    async fn purge_expired(&self, now: Timestamp) -> Result<usize>;
}

#[async_trait]
impl<T: MappingStore + ?Sized> MappingStore for Arc<T> {
    async fn put_if_absent(&self, mapping: UrlMapping) -> Result<PutOutcome> {
        (**self).put_if_absent(mapping).await
    }

    async fn put_alias(&self, mapping: UrlMapping) -> Result<PutOutcome> {
        (**self).put_alias(mapping).await
    }

    async fn get(&self, key: &ShortKey) -> Result<Option<UrlMapping>> {
        (**self).get(key).await
    }

    async fn find_by_url(&self, target_url: &str) -> Result<Vec<ShortKey>> {
        (**self).find_by_url(target_url).await
    }

    async fn purge_expired(&self, now: Timestamp) -> Result<usize> {
        (**self).purge_expired(now).await
    }
}
