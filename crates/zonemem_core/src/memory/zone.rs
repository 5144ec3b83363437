//! # Zones
//!
//! A zone is one contiguous buffer from the global allocator, split into a
//! chain of blocks linked by header offsets.
//!
//! ```text
//! +--------+---------+--------+---------+--------+----------------+
//! | Header | Payload | Header | Payload | Header |    Payload     |
//! +--------+---------+--------+---------+--------+----------------+
//! 0 -----next------> ^ <-----prev------ ^
//! ```
//!
//! The buffer is kept as `u64` words so its base is 8-byte aligned; all
//! block access goes through the byte view.

use super::block::{BlockHeader, ALIGNMENT, BLOCK_HEADER_SIZE, END, ZONE_GRANULARITY};

/// A contiguous region of blocks.
#[derive(Clone)]
pub(crate) struct Zone {
    /// Backing storage, `BLOCK_HEADER_SIZE + size` bytes.
    words: Box<[u64]>,
    /// Payload capacity of the zone (buffer minus the first header).
    size: u32,
}

impl Zone {
    /// Creates a zeroed zone holding a single block of `size` payload bytes.
    ///
    /// The block is marked used; the caller registers it as free.
    pub fn new(size: u32) -> Self {
        debug_assert_eq!(size % ZONE_GRANULARITY, 0, "zone size must be granular");

        let len = (BLOCK_HEADER_SIZE + size) as usize;
        let words = vec![0u64; len / ZONE_GRANULARITY as usize].into_boxed_slice();

        let mut zone = Self { words, size };
        zone.set_header(0, &BlockHeader::new(size));
        zone
    }

    /// A directory slot without storage.
    pub fn absent() -> Self {
        Self {
            words: Box::default(),
            size: 0,
        }
    }

    /// Rebuilds a zone from its raw buffer, as written by a snapshot.
    ///
    /// Returns `None` if the length cannot be a zone buffer.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.is_empty() {
            return Some(Self::absent());
        }

        let len = u32::try_from(bytes.len()).ok()?;
        if len % ZONE_GRANULARITY != 0 || len <= BLOCK_HEADER_SIZE {
            return None;
        }

        let mut words = vec![0u64; bytes.len() / ZONE_GRANULARITY as usize].into_boxed_slice();
        bytemuck::cast_slice_mut::<u64, u8>(&mut words).copy_from_slice(bytes);

        Some(Self {
            words,
            size: len - BLOCK_HEADER_SIZE,
        })
    }

    /// Payload capacity in bytes.
    #[inline]
    pub const fn size(&self) -> u32 {
        self.size
    }

    /// Length of the backing buffer in bytes.
    #[inline]
    pub fn len(&self) -> u32 {
        (self.words.len() * ZONE_GRANULARITY as usize) as u32
    }

    #[inline]
    pub fn is_absent(&self) -> bool {
        self.words.is_empty()
    }

    #[inline]
    pub fn bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.words)
    }

    #[inline]
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        bytemuck::cast_slice_mut(&mut self.words)
    }

    /// Reads the header at `offset`. The offset must come from the block chain.
    #[inline]
    pub fn header(&self, offset: u32) -> BlockHeader {
        let start = offset as usize;
        BlockHeader::read(&self.bytes()[start..start + BLOCK_HEADER_SIZE as usize])
    }

    #[inline]
    pub fn set_header(&mut self, offset: u32, header: &BlockHeader) {
        let start = offset as usize;
        header.write(&mut self.bytes_mut()[start..start + BLOCK_HEADER_SIZE as usize]);
    }

    /// Updates only the `free_index` field of the header at `offset`.
    #[inline]
    pub fn set_free_index(&mut self, offset: u32, free_index: u32) {
        let start = offset as usize;
        self.bytes_mut()[start..start + 4].copy_from_slice(&free_index.to_le_bytes());
    }

    /// Updates only the `prev` field of the header at `offset`.
    #[inline]
    pub fn set_prev(&mut self, offset: u32, prev: u32) {
        let start = offset as usize + 4;
        self.bytes_mut()[start..start + 4].copy_from_slice(&prev.to_le_bytes());
    }

    /// Wipes the header at `offset` after its block was merged away, so the
    /// old handle no longer resolves to a block.
    #[inline]
    pub fn clear_header(&mut self, offset: u32) {
        let start = offset as usize;
        self.bytes_mut()[start..start + BLOCK_HEADER_SIZE as usize].fill(0);
    }

    /// Maps a payload offset to its header offset if a header could live there.
    pub fn header_offset(&self, payload_offset: u32) -> Option<u32> {
        let header = payload_offset.checked_sub(BLOCK_HEADER_SIZE)?;
        if header % ALIGNMENT != 0 || payload_offset > self.len() {
            return None;
        }
        Some(header)
    }

    /// Overwrites this zone with `other`, reusing the buffer when lengths match.
    pub fn copy_from(&mut self, other: &Self) {
        if self.words.len() == other.words.len() {
            self.words.copy_from_slice(&other.words);
            self.size = other.size;
        } else {
            *self = other.clone();
        }
    }

    /// Iterates the block chain as `(header_offset, header)` pairs.
    pub fn blocks(&self) -> Blocks<'_> {
        Blocks {
            zone: self,
            next: if self.is_absent() { END } else { 0 },
        }
    }
}

/// Iterator over the blocks of a zone in address order.
pub(crate) struct Blocks<'a> {
    zone: &'a Zone,
    next: u32,
}

impl Iterator for Blocks<'_> {
    type Item = (u32, BlockHeader);

    fn next(&mut self) -> Option<Self::Item> {
        if self.next == END
            || u64::from(self.next) + u64::from(BLOCK_HEADER_SIZE) > u64::from(self.zone.len())
        {
            return None;
        }

        let offset = self.next;
        let header = self.zone.header(offset);
        // A chain must move forward; anything else ends the walk.
        self.next = if header.next > offset { header.next } else { END };
        Some((offset, header))
    }
}
