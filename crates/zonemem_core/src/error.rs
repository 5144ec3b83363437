//! # Allocator Error Types
//!
//! Errors surfaced by the checked access layer, persistence and configuration.
//! The allocation hot path itself never fails: `alloc` grows by new zones and
//! `free` reports misuse as `false`.

use thiserror::Error;

use crate::memory::MemPtr;

/// Errors that can occur when accessing or persisting allocator memory.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AllocError {
    /// The handle does not address a block inside a live zone.
    #[error("invalid memory handle: {0}")]
    InvalidPointer(MemPtr),

    /// A payload access reached past the end of the block.
    #[error("out of bounds access on {ptr}: offset {offset} + len {len} exceeds block size {size}")]
    OutOfBounds {
        /// The accessed block.
        ptr: MemPtr,
        /// Start of the access inside the payload.
        offset: u32,
        /// Length of the access in bytes.
        len: u32,
        /// Payload size of the block.
        size: u32,
    },

    /// The payload is not aligned for the requested type.
    #[error("payload of {ptr} is not aligned to {align} bytes")]
    Misaligned {
        /// The accessed block.
        ptr: MemPtr,
        /// Required alignment of the type.
        align: usize,
    },

    /// The block chain or free-list bookkeeping is inconsistent.
    #[error("allocator corrupted in zone {zone_id} at offset {offset}: {reason}")]
    Corrupted {
        /// Zone where the violation was found.
        zone_id: u32,
        /// Header offset of the offending block.
        offset: u32,
        /// What was violated.
        reason: String,
    },

    /// A serialized allocator stream is malformed.
    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),

    /// Invalid configuration file.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Reader or writer failure during persistence.
    #[error("i/o error: {0}")]
    Io(String),
}

/// Result type for allocator operations.
pub type AllocResult<T> = Result<T, AllocError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = AllocError::OutOfBounds {
            ptr: MemPtr::new(1, 16),
            offset: 8,
            len: 16,
            size: 20,
        };
        assert_eq!(
            err.to_string(),
            "out of bounds access on 1:16: offset 8 + len 16 exceeds block size 20"
        );

        let err = AllocError::InvalidPointer(MemPtr::INVALID);
        assert_eq!(err.to_string(), "invalid memory handle: invalid");
    }
}
