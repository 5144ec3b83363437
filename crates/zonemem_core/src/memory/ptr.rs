//! # Memory Handles

use std::fmt;

use serde::{Deserialize, Serialize};

/// Handle to an allocation: zone id plus payload offset inside that zone.
///
/// Handles are plain data. They stay meaningful across snapshots and clones
/// of the allocator that issued them, which is what lets a simulation store
/// them inside its own component data.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MemPtr {
    /// Index of the zone in the allocator's directory.
    pub zone_id: u32,
    /// Byte offset of the payload, directly after the block header.
    pub offset: u32,
}

impl MemPtr {
    /// The "no allocation" handle.
    pub const INVALID: Self = Self {
        zone_id: u32::MAX,
        offset: 0,
    };

    /// Creates a handle from its parts.
    #[inline]
    #[must_use]
    pub const fn new(zone_id: u32, offset: u32) -> Self {
        Self { zone_id, offset }
    }

    /// Returns true unless this is [`MemPtr::INVALID`].
    #[inline]
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.zone_id != u32::MAX
    }
}

impl Default for MemPtr {
    fn default() -> Self {
        Self::INVALID
    }
}

impl fmt::Display for MemPtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "{}:{}", self.zone_id, self.offset)
        } else {
            f.write_str("invalid")
        }
    }
}
