use crate::routing::{RoutingTable, ShardId, VIRTUAL_BUCKETS};
use crate::shard::Shard;
use async_trait::async_trait;
use jiff::Timestamp;
use keyway_core::store::{MappingStore, Result};
use keyway_core::{PutOutcome, ShortKey, StorageError, UrlMapping};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, trace, warn};

/// A [`MappingStore`] spread over a fixed set of shards.
///
/// Every operation takes the routing table's read lock for its duration, so
/// a migration holding the write lock sees no operation in flight and no
/// operation ever observes a half-moved bucket.
pub struct ShardedStore<S> {
    shards: Vec<S>,
    table: RwLock<Arc<RoutingTable>>,
}

impl<S: Shard> ShardedStore<S> {
    /// Creates a store routing through `table`.
    ///
    /// Fails if the table addresses a shard that does not exist.
    pub fn new(shards: Vec<S>, table: RoutingTable) -> Result<Self> {
        check_table(&table, shards.len())?;
        Ok(Self {
            shards,
            table: RwLock::new(Arc::new(table)),
        })
    }

    /// Creates a store whose buckets are spread evenly over every shard.
    pub fn with_uniform_routing(shards: Vec<S>) -> Result<Self> {
        let shard_count = u16::try_from(shards.len()).map_err(|_| {
            StorageError::Routing(format!("too many shards: {}", shards.len()))
        })?;
        let table = RoutingTable::uniform(1, shard_count)?;
        Self::new(shards, table)
    }

    /// The routing table currently in effect.
    pub async fn routing_table(&self) -> Arc<RoutingTable> {
        Arc::clone(&*self.table.read().await)
    }

    pub fn shards(&self) -> &[S] {
        &self.shards
    }

    fn shard(&self, id: ShardId) -> Result<&S> {
        self.shards
            .get(usize::from(id))
            .ok_or_else(|| StorageError::Routing(format!("no shard with id {id}")))
    }

    /// Switches to `next`, moving every mapping whose bucket changes owner.
    ///
    /// All operations are held off until the copy and the cutover are done.
    /// Mappings are copied before the switch and removed from their old
    /// shard after it, so a failed migration leaves the old table in effect
    /// with every mapping still reachable. Returns the number of mappings
    /// moved.
    pub async fn migrate(&self, next: RoutingTable) -> Result<usize> {
        let mut current = self.table.write().await;

        if next.version() <= current.version() {
            return Err(StorageError::Routing(format!(
                "routing table version {} is not newer than {}",
                next.version(),
                current.version()
            )));
        }
        check_table(&next, self.shards.len())?;

        let mut moved = vec![false; VIRTUAL_BUCKETS];
        for bucket in current.moved_buckets(&next) {
            moved[bucket] = true;
        }

        info!(
            from_version = current.version(),
            to_version = next.version(),
            buckets = moved.iter().filter(|m| **m).count(),
            "starting routing table migration"
        );

        let now = Timestamp::now();
        let mut to_remove: Vec<(ShardId, String)> = Vec::new();

        for (index, shard) in self.shards.iter().enumerate() {
            for mapping in shard.scan().await? {
                let key = mapping.key.as_str().to_owned();
                if !moved[RoutingTable::bucket_of(&key)] {
                    continue;
                }
                let source = index as ShardId;
                if mapping.is_expired_at(now) {
                    to_remove.push((source, key));
                    continue;
                }

                let target = next.shard_for(&key);
                match self.shard(target)?.insert_if_absent(mapping.clone(), now).await? {
                    PutOutcome::Created => {}
                    // Left over from an earlier attempt that failed before cutover.
                    PutOutcome::AlreadyExists(existing) if existing == mapping => {}
                    PutOutcome::AlreadyExists(_) => {
                        return Err(StorageError::Routing(format!(
                            "key {key} already owned by another mapping on shard {target}"
                        )));
                    }
                }
                trace!(key = %key, from = source, to = target, "copied mapping");
                to_remove.push((source, key));
            }
        }

        let version = next.version();
        *current = Arc::new(next);

        let count = to_remove.len();
        for (source, key) in to_remove {
            if let Err(e) = self.shard(source)?.remove(&key).await {
                // The old copy is unreachable under the new table.
                warn!(key = %key, shard = source, error = %e, "failed to remove migrated mapping");
            }
        }

        info!(version, moved = count, "routing table migration finished");
        Ok(count)
    }
}

fn check_table(table: &RoutingTable, shards: usize) -> Result<()> {
    if shards == 0 {
        return Err(StorageError::Routing(
            "a sharded store needs at least one shard".to_string(),
        ));
    }
    if table.shard_count() > shards {
        return Err(StorageError::Routing(format!(
            "routing table addresses {} shards but only {} exist",
            table.shard_count(),
            shards
        )));
    }
    Ok(())
}

#[async_trait]
impl<S: Shard> MappingStore for ShardedStore<S> {
    async fn put_if_absent(&self, mapping: UrlMapping) -> Result<PutOutcome> {
        let table = self.table.read().await;
        let shard_id = table.shard_for(mapping.key.as_str());
        trace!(key = %mapping.key, shard = shard_id, "conditional write");

        let outcome = self
            .shard(shard_id)?
            .insert_if_absent(mapping, Timestamp::now())
            .await?;
        if let PutOutcome::AlreadyExists(existing) = &outcome {
            debug!(key = %existing.key, shard = shard_id, "key already taken");
        }
        Ok(outcome)
    }

    async fn get(&self, key: &ShortKey) -> Result<Option<UrlMapping>> {
        let table = self.table.read().await;
        let shard_id = table.shard_for(key.as_str());
        trace!(key = %key, shard = shard_id, "point lookup");

        self.shard(shard_id)?
            .get(key.as_str(), Timestamp::now())
            .await
    }

    async fn find_by_url(&self, target_url: &str) -> Result<Vec<ShortKey>> {
        let _table = self.table.read().await;
        let now = Timestamp::now();
        let mut keys = Vec::new();
        for shard in &self.shards {
            keys.extend(
                shard
                    .find_by_url(target_url, now)
                    .await?
                    .into_iter()
                    .map(|mapping| mapping.key),
            );
        }
        keys.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        Ok(keys)
    }

    async fn purge_expired(&self, now: Timestamp) -> Result<usize> {
        let _table = self.table.read().await;
        let mut purged = 0;
        for shard in &self.shards {
            purged += shard.purge_expired(now).await?;
        }
        Ok(purged)
    }
}
