//! # Segregated Free Lists
//!
//! Free blocks are bucketed by the power of two that covers their payload:
//!
//! ```text
//! bucket:   0      1      2       3         ...    14              15
//! sizes:  0..=2  3..=4  5..=8  9..=16       ...  16K+1..=32K    > 32K (overflow)
//! ```
//!
//! A bucket is an unordered `Vec<MemPtr>`; every free block records its slot
//! in its header's `free_index`, so removal is an O(1) swap-remove.
//!
//! Lookup is approximate-fit: regular buckets only look at their last entry,
//! the overflow bucket is scanned linearly.

use super::block::{BLOCK_HEADER_SIZE, USED};
use super::ptr::MemPtr;
use super::zone::Zone;

/// Number of power-of-two size classes.
pub const POTS: usize = 16;

/// Bucket holding free blocks of `size` payload bytes.
#[inline]
#[must_use]
pub fn bucket_index(size: u32) -> usize {
    match size.max(1).checked_next_power_of_two() {
        Some(pot) => (pot.trailing_zeros() as usize).saturating_sub(1).min(POTS - 1),
        None => POTS - 1,
    }
}

/// Free block handles grouped by size class.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct FreeBlocks {
    buckets: [Vec<MemPtr>; POTS],
}

impl FreeBlocks {
    /// Rebuilds the lists from snapshot data. Headers must already agree.
    pub fn from_buckets(buckets: [Vec<MemPtr>; POTS]) -> Self {
        Self { buckets }
    }

    #[inline]
    pub fn buckets(&self) -> &[Vec<MemPtr>; POTS] {
        &self.buckets
    }

    /// Total number of free blocks.
    pub fn len(&self) -> usize {
        self.buckets.iter().map(Vec::len).sum()
    }

    /// All free block handles, bucket by bucket.
    pub fn iter(&self) -> impl Iterator<Item = MemPtr> + '_ {
        self.buckets.iter().flat_map(|bucket| bucket.iter().copied())
    }

    /// Registers a free block under its current size.
    pub fn add(&mut self, zones: &mut [Zone], ptr: MemPtr) {
        let zone = &mut zones[ptr.zone_id as usize];
        let header_offset = ptr.offset - BLOCK_HEADER_SIZE;
        let size = zone.header(header_offset).size;

        let bucket = &mut self.buckets[bucket_index(size)];
        zone.set_free_index(header_offset, bucket.len() as u32);
        bucket.push(ptr);
    }

    /// Unregisters a free block and marks it used.
    ///
    /// The block's size must not have changed since it was added.
    pub fn remove(&mut self, zones: &mut [Zone], ptr: MemPtr) {
        let header_offset = ptr.offset - BLOCK_HEADER_SIZE;
        let header = zones[ptr.zone_id as usize].header(header_offset);
        debug_assert!(header.is_free(), "removing a used block from the free lists");

        let index = header.free_index as usize;
        let bucket = &mut self.buckets[bucket_index(header.size)];
        debug_assert_eq!(bucket.get(index), Some(&ptr), "free_index out of sync");

        bucket.swap_remove(index);
        // The former tail now lives in the vacated slot
        if let Some(&moved) = bucket.get(index) {
            zones[moved.zone_id as usize].set_free_index(moved.offset - BLOCK_HEADER_SIZE, index as u32);
        }

        zones[ptr.zone_id as usize].set_free_index(header_offset, USED);
    }

    /// Takes a free block with at least `size` payload bytes, if one is found.
    pub fn pop(&mut self, zones: &mut [Zone], size: u32) -> Option<MemPtr> {
        let ptr = self.find(zones, size)?;
        self.remove(zones, ptr);
        Some(ptr)
    }

    /// Locates the block `pop` would take without taking it.
    pub fn find(&self, zones: &[Zone], size: u32) -> Option<MemPtr> {
        let fits = |ptr: &MemPtr| block_size(zones, *ptr) >= size;

        (bucket_index(size)..POTS).find_map(|index| {
            let bucket = &self.buckets[index];
            if index == POTS - 1 {
                bucket.iter().copied().find(fits)
            } else {
                bucket.last().copied().filter(fits)
            }
        })
    }

    /// Sum of the payload sizes of all free blocks.
    pub fn total_size(&self, zones: &[Zone]) -> u64 {
        self.iter().map(|ptr| u64::from(block_size(zones, ptr))).sum()
    }

    /// Payload size of the largest free block.
    pub fn largest(&self, zones: &[Zone]) -> u32 {
        self.iter().map(|ptr| block_size(zones, ptr)).max().unwrap_or(0)
    }
}

#[inline]
fn block_size(zones: &[Zone], ptr: MemPtr) -> u32 {
    zones[ptr.zone_id as usize].header(ptr.offset - BLOCK_HEADER_SIZE).size
}
