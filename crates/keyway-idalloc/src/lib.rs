//! Identifier allocation strategies.
//!
//! - [`BlockAllocator`] serves identifiers from contiguous blocks reserved
//!   through a [`BlockAuthority`](keyway_core::BlockAuthority). Keys stay
//!   short and dense; a crashed node only wastes the rest of its block.
//! - [`Flake`] packs a coarse timestamp, the node id and a per-second
//!   sequence into 64 bits and needs no coordination at all.

mod authority;
mod block;
mod clock;
mod flake;
mod flake_id;

pub use authority::InMemoryBlockAuthority;
pub use block::{BlockAllocator, DEFAULT_BLOCK_SIZE};
pub use clock::{Clock, SystemClock};
pub use flake::{Flake, FlakeSettings, MAX_NODE_ID};
pub use flake_id::FlakeId;
