//! # Block Headers
//!
//! Every block in a zone, free or used, starts with a 16-byte header.
//!
//! ```text
//! +--------------+------+------+------+-------------------------+
//! | free_index   | prev | next | size |  payload (size bytes)   |
//! +--------------+------+------+------+-------------------------+
//! ^ header offset                     ^ MemPtr::offset
//! ```
//!
//! Fields are stored little-endian so zone buffers can be written to a
//! snapshot verbatim.

/// Size of a block header in bytes.
pub const BLOCK_HEADER_SIZE: u32 = 16;

/// Payload sizes are rounded up to this many bytes.
pub const ALIGNMENT: u32 = 4;

/// Zone sizes are rounded up to this many bytes (the zone word size).
pub const ZONE_GRANULARITY: u32 = 8;

/// A split only happens if the carved-off block gets at least this much payload.
pub const MIN_BLOCK_PAYLOAD: u32 = 16;

/// Largest payload a single block may hold (just under 4 GiB).
///
/// A zone of this size plus its first header still fits `u32` offsets.
pub const MAX_BLOCK_SIZE: u32 = (u32::MAX - BLOCK_HEADER_SIZE) & !(ZONE_GRANULARITY - 1);

/// `free_index` of a block that is handed out.
pub(crate) const USED: u32 = u32::MAX;

/// `prev`/`next` of the first/last block in a zone.
pub(crate) const END: u32 = u32::MAX;

/// Rounds `value` up to a multiple of `align` (a power of two).
#[inline]
#[must_use]
pub const fn align_up(value: u32, align: u32) -> u32 {
    (value + align - 1) & !(align - 1)
}

/// Decoded block header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct BlockHeader {
    /// Slot in the owning free bucket, or [`USED`].
    pub free_index: u32,
    /// Header offset of the previous block, or [`END`].
    pub prev: u32,
    /// Header offset of the next block, or [`END`].
    pub next: u32,
    /// Payload size in bytes.
    pub size: u32,
}

impl BlockHeader {
    /// A used, unlinked block of `size` payload bytes.
    #[inline]
    pub const fn new(size: u32) -> Self {
        Self {
            free_index: USED,
            prev: END,
            next: END,
            size,
        }
    }

    #[inline]
    pub const fn is_free(&self) -> bool {
        self.free_index != USED
    }

    /// Decodes a header from the first 16 bytes of `bytes`.
    #[inline]
    pub fn read(bytes: &[u8]) -> Self {
        Self {
            free_index: field(bytes, 0),
            prev: field(bytes, 1),
            next: field(bytes, 2),
            size: field(bytes, 3),
        }
    }

    /// Encodes the header into the first 16 bytes of `bytes`.
    #[inline]
    pub fn write(&self, bytes: &mut [u8]) {
        bytes[0..4].copy_from_slice(&self.free_index.to_le_bytes());
        bytes[4..8].copy_from_slice(&self.prev.to_le_bytes());
        bytes[8..12].copy_from_slice(&self.next.to_le_bytes());
        bytes[12..16].copy_from_slice(&self.size.to_le_bytes());
    }
}

#[inline]
fn field(bytes: &[u8], index: usize) -> u32 {
    let start = index * 4;
    u32::from_le_bytes([
        bytes[start],
        bytes[start + 1],
        bytes[start + 2],
        bytes[start + 3],
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_up() {
        let alignments = [(1..=4, 4), (5..=8, 8), (9..=12, 12), (13..=16, 16)];

        for (sizes, expected) in alignments {
            for size in sizes {
                assert_eq!(expected, align_up(size, ALIGNMENT));
            }
        }
        assert_eq!(align_up(100, ALIGNMENT), 100);
        assert_eq!(align_up(1000, ZONE_GRANULARITY), 1000);
        assert_eq!(align_up(1001, ZONE_GRANULARITY), 1008);
    }

    #[test]
    fn test_max_block_size_fits_offsets() {
        assert!(MAX_BLOCK_SIZE > 1 << 31);
        assert_eq!(align_up(MAX_BLOCK_SIZE, ALIGNMENT), MAX_BLOCK_SIZE);
        assert_eq!(align_up(MAX_BLOCK_SIZE, ZONE_GRANULARITY), MAX_BLOCK_SIZE);
        assert!(MAX_BLOCK_SIZE.checked_add(BLOCK_HEADER_SIZE).is_some());
    }

    #[test]
    fn test_header_encoding() {
        let header = BlockHeader {
            free_index: 3,
            prev: 0,
            next: END,
            size: 0x0102_0304,
        };

        let mut bytes = [0u8; BLOCK_HEADER_SIZE as usize];
        header.write(&mut bytes);

        assert_eq!(&bytes[0..4], &[3, 0, 0, 0]);
        assert_eq!(&bytes[8..12], &[0xFF; 4]);
        assert_eq!(&bytes[12..16], &[4, 3, 2, 1]);
        assert_eq!(BlockHeader::read(&bytes), header);
    }

    #[test]
    fn test_new_header_is_used() {
        let header = BlockHeader::new(64);
        assert!(!header.is_free());
        assert_eq!(header.prev, END);
        assert_eq!(header.next, END);
        assert_eq!(header.size, 64);
    }
}
