//! # Diagnostics
//!
//! Read-only views over the allocator for reporting and debugging.

use std::fmt;

use serde::Serialize;

use super::allocator::MemoryAllocator;
use super::block::BLOCK_HEADER_SIZE;
use super::ptr::MemPtr;

/// Allocator-wide counters, in bytes unless noted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct AllocatorStats {
    /// Sum of all zone sizes.
    pub reserved: u64,
    /// Reserved bytes not held by free blocks.
    pub used: u64,
    /// Payload bytes held by free blocks.
    pub free: u64,
    /// Zones in the directory.
    pub zones_count: u32,
    /// Directory capacity.
    pub zones_capacity: u32,
    /// Number of free blocks.
    pub free_blocks: usize,
    /// Payload size of the largest free block.
    pub largest_free_block: u32,
}

/// One block of a zone, as seen by [`MemoryAllocator::blocks`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct BlockInfo {
    /// Handle addressing the block's payload.
    pub ptr: MemPtr,
    /// Payload size.
    pub size: u32,
    /// Whether the block sits in a free list.
    pub is_free: bool,
}

impl MemoryAllocator {
    /// Snapshot of the allocator counters.
    #[must_use]
    pub fn stats(&self) -> AllocatorStats {
        let free = self.free_size();
        AllocatorStats {
            reserved: self.reserved_size(),
            used: self.reserved_size() - free,
            free,
            zones_count: self.zones_count(),
            zones_capacity: self.zones_capacity,
            free_blocks: self.free_blocks.len(),
            largest_free_block: self.free_blocks.largest(&self.zones),
        }
    }

    /// Blocks of one zone in address order. Empty for unknown or absent zones.
    pub fn blocks(&self, zone_id: u32) -> impl Iterator<Item = BlockInfo> + '_ {
        self.zones
            .get(zone_id as usize)
            .into_iter()
            .flat_map(move |zone| {
                zone.blocks().map(move |(offset, header)| BlockInfo {
                    ptr: MemPtr::new(zone_id, offset + BLOCK_HEADER_SIZE),
                    size: header.size,
                    is_free: header.is_free(),
                })
            })
    }
}

/// Block map of one zone: `offset:size` for used blocks, `offset:size*` for free.
struct ZoneMap<'a> {
    allocator: &'a MemoryAllocator,
    zone_id: u32,
}

impl fmt::Debug for ZoneMap<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut list = f.debug_list();
        for block in self.allocator.blocks(self.zone_id) {
            let marker = if block.is_free { "*" } else { "" };
            list.entry(&format_args!("{}:{}{marker}", block.ptr.offset, block.size));
        }
        list.finish()
    }
}

impl fmt::Debug for MemoryAllocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let zones: Vec<_> = (0..self.zones_count())
            .map(|zone_id| ZoneMap {
                allocator: self,
                zone_id,
            })
            .collect();

        f.debug_struct("MemoryAllocator")
            .field("stats", &self.stats())
            .field("initial_size", &self.initial_size)
            .field("zones", &zones)
            .finish()
    }
}
