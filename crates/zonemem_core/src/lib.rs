//! # ZONEMEM Core
//!
//! Segmented zone allocator for simulation state that has to be saved,
//! restored and rolled back deterministically:
//! - Handle-addressed allocations (`MemPtr`) that survive snapshots
//! - O(1) free-list bookkeeping with immediate coalescing
//! - Byte-exact snapshot and restore
//!
//! ## Architecture Rules
//!
//! 1. **Handles, not pointers** - Every payload is reached through a checked `MemPtr`
//! 2. **Allocation never fails** - The allocator grows by whole zones instead
//! 3. **One lock** - Cross-thread access goes through `SharedAllocator`
//!
//! ## Example
//!
//! ```rust,ignore
//! use zonemem_core::{AllocatorConfig, MemoryAllocator};
//!
//! let mut allocator = MemoryAllocator::new(&AllocatorConfig::default());
//! let ptr = allocator.alloc_with(42u32);
//!
//! let snapshot = allocator.to_bytes();
//! let restored = MemoryAllocator::from_bytes(&snapshot)?;
//! assert_eq!(restored.read::<u32>(ptr)?, 42);
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod error;
pub mod memory;

pub use config::{AllocatorConfig, MIN_ZONES_CAPACITY, MIN_ZONE_SIZE};
pub use error::{AllocError, AllocResult};
pub use memory::{
    AllocatorStats, BlockInfo, MemPtr, MemoryAllocator, SharedAllocator, BLOCK_HEADER_SIZE,
    MAX_BLOCK_SIZE,
};
