//! # Memory Management
//!
//! Zone-based allocator with handle addressing.
//!
//! ## Design Philosophy
//!
//! Simulation state lives in a few large zones instead of thousands of
//! small heap allocations:
//! - Handles (`MemPtr`) instead of raw pointers, valid across snapshots
//! - Segregated free lists with O(1) add/remove
//! - Whole allocator serializable byte for byte

mod allocator;
mod block;
mod debug;
mod free_blocks;
mod persist;
mod ptr;
mod shared;
mod typed;
mod zone;

pub use allocator::MemoryAllocator;
pub use block::{
    align_up, ALIGNMENT, BLOCK_HEADER_SIZE, MAX_BLOCK_SIZE, MIN_BLOCK_PAYLOAD, ZONE_GRANULARITY,
};
pub use debug::{AllocatorStats, BlockInfo};
pub use free_blocks::{bucket_index, POTS};
pub use ptr::MemPtr;
pub use shared::SharedAllocator;
