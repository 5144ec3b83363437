//! # Typed Access
//!
//! `bytemuck::Pod` views over block payloads. Any bit pattern is a valid
//! `Pod` value, so a payload can be reinterpreted without unsafe code.
//!
//! Payloads start on 4-byte boundaries. Types with a larger alignment only
//! get references when the payload offset happens to satisfy it; `read` and
//! `write` copy unaligned and work for every offset.

use std::mem::{align_of, size_of};

use bytemuck::Pod;

use super::allocator::MemoryAllocator;
use super::ptr::MemPtr;
use crate::error::{AllocError, AllocResult};

/// Byte size of `len` values of `T`, saturated so oversized requests trip the
/// allocator's size assertion instead of wrapping.
#[inline]
fn array_bytes<T>(len: u32) -> u32 {
    let bytes = u64::from(len) * size_of::<T>() as u64;
    u32::try_from(bytes).unwrap_or(u32::MAX)
}

#[inline]
fn misaligned<T>(ptr: MemPtr) -> impl FnOnce(bytemuck::PodCastError) -> AllocError {
    move |_| AllocError::Misaligned {
        ptr,
        align: align_of::<T>(),
    }
}

impl MemoryAllocator {
    /// Allocates a zeroed `T`.
    ///
    /// Returns [`MemPtr::INVALID`] for zero-sized types.
    pub fn alloc_value<T: Pod>(&mut self) -> MemPtr {
        self.alloc_array::<T>(1)
    }

    /// Allocates a `T` initialised to `value`.
    ///
    /// Returns [`MemPtr::INVALID`] for zero-sized types.
    pub fn alloc_with<T: Pod>(&mut self, value: T) -> MemPtr {
        let ptr = self.alloc_value::<T>();
        if ptr.is_valid() {
            let size = size_of::<T>();
            let offset = ptr.offset as usize;
            self.zones[ptr.zone_id as usize].bytes_mut()[offset..offset + size]
                .copy_from_slice(bytemuck::bytes_of(&value));
        }
        ptr
    }

    /// Allocates `len` zeroed values of `T` back to back.
    ///
    /// Returns [`MemPtr::INVALID`] if the byte size is zero.
    ///
    /// # Panics
    ///
    /// Panics if the byte size exceeds the maximum block size.
    pub fn alloc_array<T: Pod>(&mut self, len: u32) -> MemPtr {
        let bytes = array_bytes::<T>(len);
        if bytes == 0 {
            return MemPtr::INVALID;
        }

        let ptr = self.alloc(bytes);
        let offset = ptr.offset as usize;
        self.zones[ptr.zone_id as usize].bytes_mut()[offset..offset + bytes as usize].fill(0);
        ptr
    }

    /// Resizes an array allocation to `new_len` values, keeping the common
    /// prefix. A zero byte size frees `ptr` and returns [`MemPtr::INVALID`].
    ///
    /// # Panics
    ///
    /// Panics if the byte size exceeds the maximum block size.
    pub fn realloc_array<T: Pod>(&mut self, ptr: MemPtr, new_len: u32) -> MemPtr {
        let bytes = array_bytes::<T>(new_len);
        if bytes == 0 {
            if ptr.is_valid() {
                self.free(ptr);
            }
            return MemPtr::INVALID;
        }
        self.realloc(ptr, bytes)
    }

    /// Reference to the `T` at the start of a payload.
    ///
    /// # Errors
    ///
    /// - [`AllocError::InvalidPointer`] for a bad handle
    /// - [`AllocError::OutOfBounds`] if the payload is smaller than `T`
    /// - [`AllocError::Misaligned`] if the payload does not satisfy `align_of::<T>()`
    pub fn get_ref<T: Pod>(&self, ptr: MemPtr) -> AllocResult<&T> {
        let bytes = self.range(ptr, 0, size_of::<T>() as u32)?;
        bytemuck::try_from_bytes(bytes).map_err(misaligned::<T>(ptr))
    }

    /// Mutable reference to the `T` at the start of a payload.
    ///
    /// # Errors
    ///
    /// Same as [`get_ref`](Self::get_ref).
    pub fn get_mut<T: Pod>(&mut self, ptr: MemPtr) -> AllocResult<&mut T> {
        let bytes = self.range_mut(ptr, 0, size_of::<T>() as u32)?;
        bytemuck::try_from_bytes_mut(bytes).map_err(misaligned::<T>(ptr))
    }

    /// Mutable reference to element `index` of an array payload.
    ///
    /// # Errors
    ///
    /// Same as [`get_ref`](Self::get_ref); `OutOfBounds` when `index` is past
    /// the end of the block.
    pub fn get_array_mut<T: Pod>(&mut self, ptr: MemPtr, index: u32) -> AllocResult<&mut T> {
        let size = size_of::<T>() as u32;
        let offset = array_bytes::<T>(index);
        let bytes = self.range_mut(ptr, offset, size)?;
        bytemuck::try_from_bytes_mut(bytes).map_err(misaligned::<T>(ptr))
    }

    /// The first `len` values of an array payload.
    ///
    /// # Errors
    ///
    /// Same as [`get_ref`](Self::get_ref).
    pub fn array<T: Pod>(&self, ptr: MemPtr, len: u32) -> AllocResult<&[T]> {
        let bytes = self.range(ptr, 0, array_bytes::<T>(len))?;
        bytemuck::try_cast_slice(bytes).map_err(misaligned::<T>(ptr))
    }

    /// The first `len` values of an array payload, mutably.
    ///
    /// # Errors
    ///
    /// Same as [`get_ref`](Self::get_ref).
    pub fn array_mut<T: Pod>(&mut self, ptr: MemPtr, len: u32) -> AllocResult<&mut [T]> {
        let bytes = self.range_mut(ptr, 0, array_bytes::<T>(len))?;
        bytemuck::try_cast_slice_mut(bytes).map_err(misaligned::<T>(ptr))
    }

    /// Copies the `T` at the start of a payload out, regardless of alignment.
    ///
    /// # Errors
    ///
    /// [`AllocError::InvalidPointer`] or [`AllocError::OutOfBounds`].
    pub fn read<T: Pod>(&self, ptr: MemPtr) -> AllocResult<T> {
        let bytes = self.range(ptr, 0, size_of::<T>() as u32)?;
        Ok(bytemuck::pod_read_unaligned(bytes))
    }

    /// Stores `value` at the start of a payload, regardless of alignment.
    ///
    /// # Errors
    ///
    /// [`AllocError::InvalidPointer`] or [`AllocError::OutOfBounds`].
    pub fn write<T: Pod>(&mut self, ptr: MemPtr, value: &T) -> AllocResult<()> {
        self.range_mut(ptr, 0, size_of::<T>() as u32)?
            .copy_from_slice(bytemuck::bytes_of(value));
        Ok(())
    }
}
