//! Sharded mapping storage.
//!
//! A [`ShardedStore`] routes every key through a versioned [`RoutingTable`]
//! to one [`Shard`], which provides the per-key conditional write the rest
//! of the system relies on. Shards can live in memory ([`MemoryShard`]) or
//! in MySQL ([`MySqlShard`]).

pub mod memory;
pub mod mysql;
pub mod reaper;
pub mod routing;
pub mod shard;
pub mod sharded;

pub use keyway_core::store::{MappingStore, Result};
pub use keyway_core::StorageError;
pub use memory::MemoryShard;
pub use mysql::{MySqlBlockAuthority, MySqlShard};
pub use reaper::Reaper;
pub use routing::{RoutingTable, ShardId, VIRTUAL_BUCKETS};
pub use shard::Shard;
pub use sharded::ShardedStore;
