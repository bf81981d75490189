use async_trait::async_trait;
use jiff::Timestamp;
use keyway_core::store::Result;
use keyway_core::{PutOutcome, UrlMapping};

/// One partition of the keyspace, as exposed by the storage engine.
///
/// A shard must make `insert_if_absent` atomic per key and give
/// read-your-writes on `get`. Replication behind it is the engine's job.
/// Expired mappings are treated as absent by every operation.
#[async_trait]
pub trait Shard: Send + Sync + 'static {
    /// Conditional write: stores `mapping` unless a live mapping owns its key.
    async fn insert_if_absent(&self, mapping: UrlMapping, now: Timestamp) -> Result<PutOutcome>;

    /// Point lookup of a live mapping.
    async fn get(&self, key: &str, now: Timestamp) -> Result<Option<UrlMapping>>;

    /// Live mappings whose target is `target_url`, in key order.
    async fn find_by_url(&self, target_url: &str, now: Timestamp) -> Result<Vec<UrlMapping>>;

    /// Deletes mappings expired as of `now`, returning how many.
    async fn purge_expired(&self, now: Timestamp) -> Result<usize>;

    /// Every stored mapping, in key order. Used by migrations.
    async fn scan(&self) -> Result<Vec<UrlMapping>>;

    /// Removes a mapping regardless of state. Used by migrations.
    async fn remove(&self, key: &str) -> Result<bool>;
}
