use modular_bitfield::prelude::*;
use std::fmt;

/// A composite identifier packed into 64 bits.
///
/// Fields are laid out from the least significant bit upwards, so the
/// timestamp occupies the high bits and identifiers from one node grow
/// with time.
#[bitfield]
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FlakeId {
    /// 14 bits for sequence number (resets every second).
    pub sequence: B14,
    /// 10 bits for node ID (allows up to 1024 nodes).
    pub node_id: B10,
    /// 40 bits for timestamp (seconds since a custom epoch).
    pub timestamp: B40,
}

impl FlakeId {
    /// The packed identifier as an unsigned integer.
    pub fn as_u64(self) -> u64 {
        u64::from_le_bytes(self.into_bytes())
    }

    /// Unpacks an identifier produced by [`FlakeId::as_u64`].
    pub fn from_u64(value: u64) -> Self {
        Self::from_bytes(value.to_le_bytes())
    }
}

impl fmt::Debug for FlakeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlakeId")
            .field("timestamp", &self.timestamp())
            .field("node_id", &self.node_id())
            .field("sequence", &self.sequence())
            .finish()
    }
}
