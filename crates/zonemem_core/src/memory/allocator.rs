//! # Zone Allocator
//!
//! General-purpose allocator for simulation state that must survive
//! snapshot/restore byte for byte.
//!
//! ## Architecture
//!
//! ```text
//!                 ┌──────────────────────────────────────┐
//!                 │           MemoryAllocator            │
//!                 │                                      │
//!   alloc(n) ───► │  FreeBlocks ──pop──► split ──► used  │
//!                 │      ▲                               │
//!   free(p)  ───► │  coalesce(next, prev) ──add──┘       │
//!                 │                                      │
//!                 │  zones: [Zone 0][Zone 1] ... [Zone N]│
//!                 └──────────────────────────────────────┘
//! ```
//!
//! A request that no free block satisfies grows the allocator by a new zone
//! of at least `initial_size` bytes. Zones are never shrunk or merged.

use tracing::{debug, info, trace, warn};

use super::block::{
    align_up, BlockHeader, ALIGNMENT, BLOCK_HEADER_SIZE, END, MAX_BLOCK_SIZE, MIN_BLOCK_PAYLOAD,
    USED, ZONE_GRANULARITY,
};
use super::free_blocks::{bucket_index, FreeBlocks};
use super::ptr::MemPtr;
use super::zone::Zone;
use crate::config::AllocatorConfig;
use crate::error::{AllocError, AllocResult};

/// Segmented zone allocator.
///
/// Hands out [`MemPtr`] handles instead of addresses. All payload access is
/// bounds checked against the owning zone.
///
/// # Thread Safety
///
/// Mutation requires `&mut self`. Use
/// [`SharedAllocator`](crate::SharedAllocator) to share one allocator
/// between threads.
///
/// # Example
///
/// ```rust,ignore
/// let mut allocator = MemoryAllocator::new(&AllocatorConfig::default());
///
/// let ptr = allocator.alloc(64);
/// allocator.bytes_mut(ptr)?.fill(0xFF);
///
/// assert!(allocator.free(ptr));
/// ```
pub struct MemoryAllocator {
    /// Zone directory, indexed by `MemPtr::zone_id`.
    pub(crate) zones: Vec<Zone>,
    /// Logical directory capacity; doubles when exhausted.
    pub(crate) zones_capacity: u32,
    /// Size of the first zone and lower bound for grown zones.
    pub(crate) initial_size: u32,
    /// Free block buckets.
    pub(crate) free_blocks: FreeBlocks,
}

impl MemoryAllocator {
    /// Creates an allocator with one zone of `config.initial_size` bytes.
    ///
    /// The configuration is [normalized](AllocatorConfig::normalized) first.
    #[must_use]
    pub fn new(config: &AllocatorConfig) -> Self {
        let config = config.normalized();

        let mut allocator = Self {
            zones: Vec::with_capacity(config.zones_capacity as usize),
            zones_capacity: config.zones_capacity,
            initial_size: config.initial_size,
            free_blocks: FreeBlocks::default(),
        };
        allocator.add_zone(config.initial_size);
        allocator
    }

    /// Shorthand for [`MemoryAllocator::new`] with size clamps applied.
    #[must_use]
    pub fn with_capacity(zones_capacity: u32, initial_size: u32) -> Self {
        Self::new(&AllocatorConfig::new(zones_capacity, initial_size))
    }

    /// Number of zones in the directory.
    #[inline]
    #[must_use]
    pub fn zones_count(&self) -> u32 {
        self.zones.len() as u32
    }

    /// Current directory capacity.
    #[inline]
    #[must_use]
    pub const fn zones_capacity(&self) -> u32 {
        self.zones_capacity
    }

    /// Size of the first zone and the minimum size of grown zones.
    #[inline]
    #[must_use]
    pub const fn initial_size(&self) -> u32 {
        self.initial_size
    }

    /// Allocates a block with at least `size` payload bytes.
    ///
    /// Never fails: when no free block fits, a new zone of
    /// `max(size, initial_size)` bytes is created. The payload is not zeroed
    /// when a block is reused.
    ///
    /// # Panics
    ///
    /// Panics if `size` exceeds [`MAX_BLOCK_SIZE`], the hard limit for a
    /// single block (just under 4 GiB).
    pub fn alloc(&mut self, size: u32) -> MemPtr {
        assert!(
            size <= MAX_BLOCK_SIZE,
            "allocation of {size} bytes exceeds the maximum block size"
        );
        let size = align_up(size.max(1), ALIGNMENT);

        let ptr = match self.free_blocks.pop(&mut self.zones, size) {
            Some(ptr) => ptr,
            None => {
                // The fresh zone's only block is large enough; take it directly
                let ptr = self.add_zone(size.max(self.initial_size));
                self.free_blocks.remove(&mut self.zones, ptr);
                ptr
            }
        };

        self.split(ptr, size);
        trace!(%ptr, size, "alloc");
        self.debug_check();
        ptr
    }

    /// Returns a block to the free lists, merging it with free neighbours.
    ///
    /// Returns `false` without touching any state if `ptr` does not address a
    /// used block (invalid handle or double free). Headers of merged-away
    /// blocks are wiped, so freeing such a handle again is rejected too.
    pub fn free(&mut self, ptr: MemPtr) -> bool {
        let Some((mut offset, mut header)) = self.locate(ptr) else {
            warn!(%ptr, "free of an invalid handle");
            return false;
        };
        if header.is_free() {
            warn!(%ptr, "double free");
            return false;
        }

        let zone_id = ptr.zone_id;
        let z = zone_id as usize;

        // Absorb the following block
        if header.next != END {
            let next = self.zones[z].header(header.next);
            if next.is_free() {
                self.free_blocks
                    .remove(&mut self.zones, MemPtr::new(zone_id, header.next + BLOCK_HEADER_SIZE));
                self.zones[z].clear_header(header.next);
                header.size += BLOCK_HEADER_SIZE + next.size;
                header.next = next.next;
                if next.next != END {
                    self.zones[z].set_prev(next.next, offset);
                }
            }
        }

        // Fold into the preceding block
        if header.prev != END {
            let prev_offset = header.prev;
            let mut prev = self.zones[z].header(prev_offset);
            if prev.is_free() {
                self.free_blocks
                    .remove(&mut self.zones, MemPtr::new(zone_id, prev_offset + BLOCK_HEADER_SIZE));
                prev.size += BLOCK_HEADER_SIZE + header.size;
                prev.next = header.next;
                if header.next != END {
                    self.zones[z].set_prev(header.next, prev_offset);
                }
                self.zones[z].clear_header(offset);
                offset = prev_offset;
                header = prev;
            }
        }

        header.free_index = USED;
        self.zones[z].set_header(offset, &header);
        self.free_blocks
            .add(&mut self.zones, MemPtr::new(zone_id, offset + BLOCK_HEADER_SIZE));

        trace!(%ptr, size = header.size, "free");
        self.debug_check();
        true
    }

    /// Moves an allocation into a block of `size` bytes.
    ///
    /// Copies `min(old_size, size)` bytes; a grown tail is not zeroed. The
    /// old handle is freed. An invalid `ptr` behaves like [`alloc`](Self::alloc).
    ///
    /// # Panics
    ///
    /// Panics if `size` exceeds [`MAX_BLOCK_SIZE`].
    pub fn realloc(&mut self, ptr: MemPtr, size: u32) -> MemPtr {
        let old_size = match self.locate(ptr) {
            Some((_, header)) if !header.is_free() => header.size,
            _ => {
                if ptr.is_valid() {
                    warn!(%ptr, "realloc of an invalid handle");
                }
                return self.alloc(size);
            }
        };

        let new_ptr = self.alloc(size);
        self.copy_payload(ptr, 0, new_ptr, 0, old_size.min(size));
        self.free(ptr);

        trace!(from = %ptr, to = %new_ptr, size, "realloc");
        new_ptr
    }

    /// Makes sure a following `alloc(size)` is served without growing.
    ///
    /// # Panics
    ///
    /// Panics if `size` exceeds [`MAX_BLOCK_SIZE`].
    pub fn reserve(&mut self, size: u32) {
        assert!(
            size <= MAX_BLOCK_SIZE,
            "reservation of {size} bytes exceeds the maximum block size"
        );
        let size = align_up(size.max(1), ALIGNMENT);

        if self.free_blocks.find(&self.zones, size).is_none() {
            self.add_zone(size.max(self.initial_size));
        }
    }

    /// Payload size of the block behind `ptr`.
    ///
    /// This can exceed the requested size when a block was handed out whole.
    ///
    /// # Errors
    ///
    /// Returns [`AllocError::InvalidPointer`] if `ptr` does not address a block.
    pub fn block_size(&self, ptr: MemPtr) -> AllocResult<u32> {
        self.locate(ptr)
            .map(|(_, header)| header.size)
            .ok_or(AllocError::InvalidPointer(ptr))
    }

    /// The payload of a block.
    ///
    /// # Errors
    ///
    /// Returns [`AllocError::InvalidPointer`] if `ptr` does not address a block.
    pub fn bytes(&self, ptr: MemPtr) -> AllocResult<&[u8]> {
        let size = self.block_size(ptr)?;
        let start = ptr.offset as usize;
        Ok(&self.zones[ptr.zone_id as usize].bytes()[start..start + size as usize])
    }

    /// The payload of a block, mutably.
    ///
    /// # Errors
    ///
    /// Returns [`AllocError::InvalidPointer`] if `ptr` does not address a block.
    pub fn bytes_mut(&mut self, ptr: MemPtr) -> AllocResult<&mut [u8]> {
        let size = self.block_size(ptr)?;
        let start = ptr.offset as usize;
        Ok(&mut self.zones[ptr.zone_id as usize].bytes_mut()[start..start + size as usize])
    }

    /// A byte range inside a block's payload.
    ///
    /// # Errors
    ///
    /// Returns [`AllocError::InvalidPointer`] for a bad handle and
    /// [`AllocError::OutOfBounds`] if the range leaves the payload.
    pub fn range(&self, ptr: MemPtr, offset: u32, len: u32) -> AllocResult<&[u8]> {
        let start = self.checked_range(ptr, offset, len)?;
        Ok(&self.zones[ptr.zone_id as usize].bytes()[start..start + len as usize])
    }

    /// A byte range inside a block's payload, mutably.
    ///
    /// # Errors
    ///
    /// Returns [`AllocError::InvalidPointer`] for a bad handle and
    /// [`AllocError::OutOfBounds`] if the range leaves the payload.
    pub fn range_mut(&mut self, ptr: MemPtr, offset: u32, len: u32) -> AllocResult<&mut [u8]> {
        let start = self.checked_range(ptr, offset, len)?;
        Ok(&mut self.zones[ptr.zone_id as usize].bytes_mut()[start..start + len as usize])
    }

    /// Copies `len` bytes from one payload to another. The ranges may overlap.
    ///
    /// # Errors
    ///
    /// Returns [`AllocError::InvalidPointer`] or [`AllocError::OutOfBounds`]
    /// if either range is not inside its block.
    pub fn mem_copy(
        &mut self,
        dst: MemPtr,
        dst_offset: u32,
        src: MemPtr,
        src_offset: u32,
        len: u32,
    ) -> AllocResult<()> {
        self.checked_range(dst, dst_offset, len)?;
        self.checked_range(src, src_offset, len)?;
        self.copy_payload(src, src_offset, dst, dst_offset, len);
        Ok(())
    }

    /// Moves `len` bytes inside one payload. The ranges may overlap.
    ///
    /// # Errors
    ///
    /// Returns [`AllocError::InvalidPointer`] or [`AllocError::OutOfBounds`]
    /// if either range is not inside the block.
    pub fn mem_move(&mut self, ptr: MemPtr, dst_offset: u32, src_offset: u32, len: u32) -> AllocResult<()> {
        self.mem_copy(ptr, dst_offset, ptr, src_offset, len)
    }

    /// Zeroes `len` bytes of a payload starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`AllocError::InvalidPointer`] or [`AllocError::OutOfBounds`]
    /// if the range is not inside the block.
    pub fn mem_clear(&mut self, ptr: MemPtr, offset: u32, len: u32) -> AllocResult<()> {
        self.range_mut(ptr, offset, len)?.fill(0);
        Ok(())
    }

    /// Sum of all zone sizes.
    #[must_use]
    pub fn reserved_size(&self) -> u64 {
        self.zones.iter().map(|zone| u64::from(zone.size())).sum()
    }

    /// Sum of the payload sizes of all free blocks.
    #[must_use]
    pub fn free_size(&self) -> u64 {
        self.free_blocks.total_size(&self.zones)
    }

    /// Reserved bytes not held by free blocks (payloads plus their headers).
    #[must_use]
    pub fn used_size(&self) -> u64 {
        self.reserved_size() - self.free_size()
    }

    /// Walks every zone and validates links, partitioning and free-list slots.
    ///
    /// # Errors
    ///
    /// Returns [`AllocError::Corrupted`] describing the first violation found.
    pub fn check_consistency(&self) -> AllocResult<()> {
        let mut free_count = 0usize;

        for (zone_id, zone) in self.zones.iter().enumerate() {
            if zone.is_absent() {
                continue;
            }
            let zone_id = zone_id as u32;
            let zone_len = u64::from(zone.len());

            let mut offset = 0u32;
            let mut prev = END;
            let mut prev_free = false;

            loop {
                if u64::from(offset) + u64::from(BLOCK_HEADER_SIZE) > zone_len {
                    return Err(corrupted(zone_id, offset, "header outside of zone"));
                }
                if offset % ALIGNMENT != 0 {
                    return Err(corrupted(zone_id, offset, "misaligned block header"));
                }

                let header = zone.header(offset);
                if header.prev != prev {
                    return Err(corrupted(zone_id, offset, "prev link mismatch"));
                }

                let end = u64::from(offset) + u64::from(BLOCK_HEADER_SIZE) + u64::from(header.size);
                if end > zone_len {
                    return Err(corrupted(zone_id, offset, "block overruns zone"));
                }

                if header.is_free() {
                    if prev_free {
                        return Err(corrupted(zone_id, offset, "adjacent free blocks"));
                    }
                    let ptr = MemPtr::new(zone_id, offset + BLOCK_HEADER_SIZE);
                    let bucket = &self.free_blocks.buckets()[bucket_index(header.size)];
                    if bucket.get(header.free_index as usize) != Some(&ptr) {
                        return Err(corrupted(zone_id, offset, "free block missing from its bucket slot"));
                    }
                    free_count += 1;
                }
                prev_free = header.is_free();

                if header.next == END {
                    if end != zone_len {
                        return Err(corrupted(zone_id, offset, "gap after last block"));
                    }
                    break;
                }
                if u64::from(header.next) != end {
                    return Err(corrupted(zone_id, offset, "next link does not follow block"));
                }

                prev = offset;
                offset = header.next;
            }
        }

        if free_count != self.free_blocks.len() {
            return Err(AllocError::Corrupted {
                zone_id: u32::MAX,
                offset: 0,
                reason: format!(
                    "free lists hold {} entries for {free_count} free blocks",
                    self.free_blocks.len()
                ),
            });
        }

        Ok(())
    }

    /// Releases every zone.
    ///
    /// Equivalent to dropping the allocator; handles issued by it become
    /// meaningless.
    pub fn dispose(self) {
        info!(
            zones = self.zones.len(),
            reserved = self.reserved_size(),
            used = self.used_size(),
            "disposing allocator"
        );
    }

    /// Appends a zone of at least `size` payload bytes and registers its block.
    ///
    /// Returns the handle of the zone's single free block.
    pub(crate) fn add_zone(&mut self, size: u32) -> MemPtr {
        let size = align_up(size, ZONE_GRANULARITY);
        let zone_id = self.zones_count();

        if zone_id >= self.zones_capacity {
            let capacity = self.zones_capacity.saturating_mul(2).max(zone_id + 1);
            self.zones.reserve_exact((capacity - zone_id) as usize);
            debug!(from = self.zones_capacity, to = capacity, "growing zone directory");
            self.zones_capacity = capacity;
        }

        self.zones.push(Zone::new(size));
        debug!(zone_id, size, "created zone");

        let ptr = MemPtr::new(zone_id, BLOCK_HEADER_SIZE);
        self.free_blocks.add(&mut self.zones, ptr);
        ptr
    }

    /// Resolves a handle to its header, validating every offset it implies.
    pub(crate) fn locate(&self, ptr: MemPtr) -> Option<(u32, BlockHeader)> {
        if !ptr.is_valid() {
            return None;
        }
        let zone = self.zones.get(ptr.zone_id as usize)?;
        if zone.is_absent() {
            return None;
        }

        let offset = zone.header_offset(ptr.offset)?;
        let header = zone.header(offset);

        let zone_len = u64::from(zone.len());
        let end = u64::from(ptr.offset) + u64::from(header.size);
        let linked_prev = header.prev == END || header.prev < offset;
        let linked_next = header.next == END
            || (u64::from(header.next) == end && end + u64::from(BLOCK_HEADER_SIZE) <= zone_len);
        if end > zone_len || !linked_prev || !linked_next {
            return None;
        }

        Some((offset, header))
    }

    /// Validates `offset..offset + len` against the payload of `ptr`.
    ///
    /// Returns the absolute start of the range in the zone buffer.
    fn checked_range(&self, ptr: MemPtr, offset: u32, len: u32) -> AllocResult<usize> {
        let size = self.block_size(ptr)?;
        if u64::from(offset) + u64::from(len) > u64::from(size) {
            return Err(AllocError::OutOfBounds {
                ptr,
                offset,
                len,
                size,
            });
        }
        Ok(ptr.offset as usize + offset as usize)
    }

    /// Raw copy between payloads. Ranges must already be validated.
    fn copy_payload(&mut self, src: MemPtr, src_offset: u32, dst: MemPtr, dst_offset: u32, len: u32) {
        let src_start = (src.offset + src_offset) as usize;
        let dst_start = (dst.offset + dst_offset) as usize;
        let len = len as usize;

        if src.zone_id == dst.zone_id {
            self.zones[src.zone_id as usize]
                .bytes_mut()
                .copy_within(src_start..src_start + len, dst_start);
            return;
        }

        let (src_zone, dst_zone) = zone_pair(&mut self.zones, src.zone_id as usize, dst.zone_id as usize);
        dst_zone.bytes_mut()[dst_start..dst_start + len]
            .copy_from_slice(&src_zone.bytes()[src_start..src_start + len]);
    }

    /// Carves the tail of a used block into a new free block when worth it.
    fn split(&mut self, ptr: MemPtr, size: u32) {
        let zone = &mut self.zones[ptr.zone_id as usize];
        let offset = ptr.offset - BLOCK_HEADER_SIZE;
        let mut header = zone.header(offset);

        let remainder = header.size - size;
        if remainder < BLOCK_HEADER_SIZE + MIN_BLOCK_PAYLOAD {
            return;
        }

        let tail_offset = offset + BLOCK_HEADER_SIZE + size;
        let tail = BlockHeader {
            free_index: USED,
            prev: offset,
            next: header.next,
            size: remainder - BLOCK_HEADER_SIZE,
        };
        zone.set_header(tail_offset, &tail);
        if header.next != END {
            zone.set_prev(header.next, tail_offset);
        }

        header.size = size;
        header.next = tail_offset;
        zone.set_header(offset, &header);

        self.free_blocks
            .add(&mut self.zones, MemPtr::new(ptr.zone_id, tail_offset + BLOCK_HEADER_SIZE));
    }

    #[inline]
    pub(crate) fn debug_check(&self) {
        #[cfg(feature = "debug-checks")]
        debug_assert_eq!(self.check_consistency(), Ok(()));
    }
}

fn corrupted(zone_id: u32, offset: u32, reason: &str) -> AllocError {
    AllocError::Corrupted {
        zone_id,
        offset,
        reason: reason.to_string(),
    }
}

/// Borrows two distinct zones, the first shared and the second mutable.
fn zone_pair(zones: &mut [Zone], src: usize, dst: usize) -> (&Zone, &mut Zone) {
    debug_assert_ne!(src, dst);
    if src < dst {
        let (low, high) = zones.split_at_mut(dst);
        (&low[src], &mut high[0])
    } else {
        let (low, high) = zones.split_at_mut(src);
        (&high[0], &mut low[dst])
    }
}
