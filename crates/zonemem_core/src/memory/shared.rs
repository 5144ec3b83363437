//! # Shared Allocator
//!
//! One [`MemoryAllocator`] behind a single `parking_lot::Mutex`. Every call
//! holds the lock for its whole duration, so a zone split or coalesce is
//! never observed half done. There is no per-bucket or per-zone locking.

use std::io::Write;

use bytemuck::Pod;
use parking_lot::Mutex;

use super::allocator::MemoryAllocator;
use super::debug::AllocatorStats;
use super::ptr::MemPtr;
use crate::config::AllocatorConfig;
use crate::error::AllocResult;

/// Thread-safe handle to an allocator. Share it with `Arc`.
///
/// Handles stay plain [`MemPtr`] values; payload access copies in or out
/// under the lock. Use [`with`](Self::with) to batch several operations
/// under one acquisition.
pub struct SharedAllocator {
    inner: Mutex<MemoryAllocator>,
}

impl SharedAllocator {
    /// Creates a shared allocator from a configuration.
    #[must_use]
    pub fn new(config: &AllocatorConfig) -> Self {
        Self::from_allocator(MemoryAllocator::new(config))
    }

    /// Wraps an existing allocator.
    #[must_use]
    pub fn from_allocator(allocator: MemoryAllocator) -> Self {
        Self {
            inner: Mutex::new(allocator),
        }
    }

    /// See [`MemoryAllocator::alloc`].
    pub fn alloc(&self, size: u32) -> MemPtr {
        self.inner.lock().alloc(size)
    }

    /// See [`MemoryAllocator::free`].
    pub fn free(&self, ptr: MemPtr) -> bool {
        self.inner.lock().free(ptr)
    }

    /// See [`MemoryAllocator::realloc`].
    pub fn realloc(&self, ptr: MemPtr, size: u32) -> MemPtr {
        self.inner.lock().realloc(ptr, size)
    }

    /// See [`MemoryAllocator::reserve`].
    pub fn reserve(&self, size: u32) {
        self.inner.lock().reserve(size);
    }

    /// See [`MemoryAllocator::alloc_value`].
    pub fn alloc_value<T: Pod>(&self) -> MemPtr {
        self.inner.lock().alloc_value::<T>()
    }

    /// See [`MemoryAllocator::alloc_with`].
    pub fn alloc_with<T: Pod>(&self, value: T) -> MemPtr {
        self.inner.lock().alloc_with(value)
    }

    /// See [`MemoryAllocator::alloc_array`].
    pub fn alloc_array<T: Pod>(&self, len: u32) -> MemPtr {
        self.inner.lock().alloc_array::<T>(len)
    }

    /// Copies the `T` at the start of a payload out.
    ///
    /// # Errors
    ///
    /// See [`MemoryAllocator::read`].
    pub fn read<T: Pod>(&self, ptr: MemPtr) -> AllocResult<T> {
        self.inner.lock().read(ptr)
    }

    /// Stores `value` at the start of a payload.
    ///
    /// # Errors
    ///
    /// See [`MemoryAllocator::write`].
    pub fn write<T: Pod>(&self, ptr: MemPtr, value: &T) -> AllocResult<()> {
        self.inner.lock().write(ptr, value)
    }

    /// Copies a whole payload out.
    ///
    /// # Errors
    ///
    /// See [`MemoryAllocator::bytes`].
    pub fn read_bytes(&self, ptr: MemPtr) -> AllocResult<Vec<u8>> {
        self.inner.lock().bytes(ptr).map(<[u8]>::to_vec)
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> AllocatorStats {
        self.inner.lock().stats()
    }

    /// Serializes the allocator under the lock.
    #[must_use]
    pub fn snapshot(&self) -> Vec<u8> {
        self.inner.lock().to_bytes()
    }

    /// Streams a snapshot to `writer` under the lock.
    ///
    /// # Errors
    ///
    /// Returns [`AllocError::Io`](crate::AllocError::Io) if the writer fails.
    pub fn snapshot_to<W: Write>(&self, writer: &mut W) -> AllocResult<()> {
        self.inner.lock().serialize(writer)
    }

    /// Runs `f` with exclusive access to the allocator.
    pub fn with<R>(&self, f: impl FnOnce(&mut MemoryAllocator) -> R) -> R {
        f(&mut self.inner.lock())
    }

    /// Unwraps the allocator.
    #[must_use]
    pub fn into_inner(self) -> MemoryAllocator {
        self.inner.into_inner()
    }
}

impl From<MemoryAllocator> for SharedAllocator {
    fn from(allocator: MemoryAllocator) -> Self {
        Self::from_allocator(allocator)
    }
}

impl Default for SharedAllocator {
    fn default() -> Self {
        Self::new(&AllocatorConfig::default())
    }
}
