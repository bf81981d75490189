use async_trait::async_trait;
use keyway_core::{AllocatorError, BlockAuthority, IdBlock};
use parking_lot::Mutex;
use tracing::debug;

/// A single-writer block authority living in the current process.
///
/// Suitable for single-node deployments and tests. Blocks are handed out
/// in ascending order and never overlap.
#[derive(Debug)]
pub struct InMemoryBlockAuthority {
    next_start: Mutex<u64>,
}

impl InMemoryBlockAuthority {
    /// Creates an authority whose first block starts at 1.
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    /// Creates an authority whose first block starts at `first`.
    pub fn starting_at(first: u64) -> Self {
        Self {
            next_start: Mutex::new(first),
        }
    }
}

impl Default for InMemoryBlockAuthority {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BlockAuthority for InMemoryBlockAuthority {
    async fn reserve_block(&self, node_id: u16, size: u64) -> Result<IdBlock, AllocatorError> {
        if size == 0 {
            return Err(AllocatorError::Exhausted(
                "requested an empty block".to_string(),
            ));
        }

        let mut next_start = self.next_start.lock();
        let start = *next_start;
        if start == u64::MAX {
            return Err(AllocatorError::Exhausted(
                "no identifiers left to reserve".to_string(),
            ));
        }

        // The last block may be short when the space runs out.
        let end = start.saturating_add(size);
        *next_start = end;

        debug!(node_id, start, end, "reserved identifier block");
        Ok(IdBlock::new(start, end))
    }
}
