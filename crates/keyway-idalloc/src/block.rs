use async_trait::async_trait;
use keyway_core::{AllocatorError, BlockAuthority, IdentifierAllocator};
use tokio::sync::Mutex;
use tracing::{debug, trace};

/// Default number of identifiers reserved per round trip to the authority.
pub const DEFAULT_BLOCK_SIZE: u64 = 1_000;

#[derive(Debug, Default)]
struct Cursor {
    next: u64,
    end: u64,
}

impl Cursor {
    fn remaining(&self) -> u64 {
        self.end.saturating_sub(self.next)
    }
}

/// Serves identifiers from blocks reserved through a [`BlockAuthority`].
///
/// Each node owns its current block exclusively. `next_id` is local until
/// the block runs dry; the refill happens inside the same critical section,
/// so concurrent callers never race for a second block. Identifiers left in
/// a block when the node stops are simply never used.
pub struct BlockAllocator<A> {
    authority: A,
    node_id: u16,
    block_size: u64,
    cursor: Mutex<Cursor>,
}

impl<A: BlockAuthority> BlockAllocator<A> {
    pub fn new(authority: A, node_id: u16) -> Self {
        Self::with_block_size(authority, node_id, DEFAULT_BLOCK_SIZE)
    }

    pub fn with_block_size(authority: A, node_id: u16, block_size: u64) -> Self {
        Self {
            authority,
            node_id,
            block_size: block_size.max(1),
            cursor: Mutex::new(Cursor::default()),
        }
    }

    /// Identifiers left in the current block.
    pub async fn remaining(&self) -> u64 {
        self.cursor.lock().await.remaining()
    }

    pub fn node_id(&self) -> u16 {
        self.node_id
    }
}

#[async_trait]
impl<A: BlockAuthority> IdentifierAllocator for BlockAllocator<A> {
    async fn next_id(&self) -> Result<u64, AllocatorError> {
        let mut cursor = self.cursor.lock().await;

        if cursor.remaining() == 0 {
            trace!(node_id = self.node_id, "identifier block exhausted, reserving");
            let block = self
                .authority
                .reserve_block(self.node_id, self.block_size)
                .await?;
            if block.is_empty() {
                return Err(AllocatorError::Exhausted(format!(
                    "authority returned an empty block for node {}",
                    self.node_id
                )));
            }
            debug!(
                node_id = self.node_id,
                start = block.start,
                end = block.end,
                "switched to new identifier block"
            );
            *cursor = Cursor {
                next: block.start,
                end: block.end,
            };
        }

        let id = cursor.next;
        cursor.next += 1;
        Ok(id)
    }
}
