use crate::error::AllocatorError;
use async_trait::async_trait;
use std::sync::Arc;

pub type Result<T> = std::result::Result<T, AllocatorError>;

/// Produces identifiers that are unique across every caller on every node.
///
/// Identifiers handed out by one allocator are monotonically
/// non-decreasing. Gaps are allowed; reuse is not.
#[async_trait]
pub trait IdentifierAllocator: Send + Sync + 'static {
    /// Returns the next identifier.
    async fn next_id(&self) -> Result<u64>;
}

#[async_trait]
impl<T: IdentifierAllocator + ?Sized> IdentifierAllocator for Arc<T> {
    async fn next_id(&self) -> Result<u64> {
        (**self).next_id().await
    }
}

/// A contiguous, half-open range `[start, end)` of identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdBlock {
    pub start: u64,
    pub end: u64,
}

impl IdBlock {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Issues identifier blocks to nodes.
///
/// Every block is issued exactly once; blocks never overlap.
#[async_trait]
pub trait BlockAuthority: Send + Sync + 'static {
    /// Reserves the next block of at most `size` identifiers for `node_id`.
    async fn reserve_block(&self, node_id: u16, size: u64) -> Result<IdBlock>;
}

#[async_trait]
impl<T: BlockAuthority + ?Sized> BlockAuthority for Arc<T> {
    async fn reserve_block(&self, node_id: u16, size: u64) -> Result<IdBlock> {
        (**self).reserve_block(node_id, size).await
    }
}
