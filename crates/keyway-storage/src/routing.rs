use keyway_core::store::Result;
use keyway_core::StorageError;
use xxhash_rust::xxh3::xxh3_64;

/// Number of virtual buckets the keyspace is hashed into.
///
/// Fixed for the lifetime of the deployment: a key's bucket never changes,
/// only the bucket-to-shard assignment does, and only through a new table
/// version.
pub const VIRTUAL_BUCKETS: usize = 1024;

pub type ShardId = u16;

/// A static, versioned assignment of virtual buckets to shards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingTable {
    version: u64,
    assignments: Vec<ShardId>,
}

impl RoutingTable {
    /// Spreads buckets round-robin over `shard_count` shards.
    pub fn uniform(version: u64, shard_count: u16) -> Result<Self> {
        if shard_count == 0 {
            return Err(StorageError::Routing(
                "a routing table needs at least one shard".to_string(),
            ));
        }
        let assignments = (0..VIRTUAL_BUCKETS)
            .map(|bucket| (bucket % usize::from(shard_count)) as ShardId)
            .collect();
        Ok(Self {
            version,
            assignments,
        })
    }

    /// Builds a table from an explicit bucket to shard list.
    pub fn from_assignments(version: u64, assignments: Vec<ShardId>) -> Result<Self> {
        if assignments.len() != VIRTUAL_BUCKETS {
            return Err(StorageError::Routing(format!(
                "expected {} bucket assignments, got {}",
                VIRTUAL_BUCKETS,
                assignments.len()
            )));
        }
        Ok(Self {
            version,
            assignments,
        })
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Number of shards the table addresses (highest shard id + 1).
    pub fn shard_count(&self) -> usize {
        self.assignments
            .iter()
            .copied()
            .max()
            .map_or(0, |max| usize::from(max) + 1)
    }

    /// The virtual bucket of a key. Independent of any table version.
    pub fn bucket_of(key: &str) -> usize {
        (xxh3_64(key.as_bytes()) % VIRTUAL_BUCKETS as u64) as usize
    }

    /// The shard owning `key` under this table.
    pub fn shard_for(&self, key: &str) -> ShardId {
        self.assignments[Self::bucket_of(key)]
    }

    /// Buckets whose owner differs between `self` and `next`.
    pub fn moved_buckets(&self, next: &RoutingTable) -> Vec<usize> {
        self.assignments
            .iter()
            .zip(&next.assignments)
            .enumerate()
            .filter(|(_, (from, to))| from != to)
            .map(|(bucket, _)| bucket)
            .collect()
    }
}
