use keyway_core::allocator::Result;
use keyway_core::{IdentifierAllocator, KeyEncoder, ShortKey};
use tracing::trace;

/// Turns allocated identifiers into generated keys.
///
/// Uniqueness of the keys follows from uniqueness of the identifiers and
/// the encoder being a bijection; nothing here touches storage.
#[derive(Debug)]
pub struct KeyGenerator<A> {
    allocator: A,
}

impl<A: IdentifierAllocator> KeyGenerator<A> {
    pub fn new(allocator: A) -> Self {
        Self { allocator }
    }

    /// Allocates the next identifier and returns it with its key.
    ///
    /// Identifiers whose key spells a reserved name are dropped.
    pub async fn next_key(&self) -> Result<(u64, ShortKey)> {
        loop {
            let id = self.allocator.next_id().await?;
            let key = ShortKey::generated(KeyEncoder::encode(id));
            if !key.is_reserved() {
                return Ok((id, key));
            }
            trace!(id, key = %key, "skipping reserved key");
        }
    }

    pub fn allocator(&self) -> &A {
        &self.allocator
    }
}
