//! # Snapshots
//!
//! The allocator state is written as a flat little-endian stream:
//!
//! ```text
//! zones_capacity | zones_count | initial_size
//! bucket_count (16)
//!   per bucket:  len | len × (zone_id, offset)
//! per zone:      buffer_len | buffer bytes      (buffer_len 0: absent zone)
//! ```
//!
//! Zone buffers are written verbatim, headers included, so a restored
//! allocator hands out exactly the handles the original would have.

use std::io::{ErrorKind, Read, Write};

use tracing::info;

use super::allocator::MemoryAllocator;
use super::block::{BLOCK_HEADER_SIZE, MAX_BLOCK_SIZE, ZONE_GRANULARITY};
use super::free_blocks::{FreeBlocks, POTS};
use super::ptr::MemPtr;
use super::zone::Zone;
use crate::error::{AllocError, AllocResult};

/// Largest zone buffer a snapshot may declare.
const MAX_ZONE_BUFFER: u32 = MAX_BLOCK_SIZE + BLOCK_HEADER_SIZE;

impl MemoryAllocator {
    /// Writes a snapshot of the allocator to `writer`.
    ///
    /// # Errors
    ///
    /// Returns [`AllocError::Io`] if the writer fails.
    pub fn serialize<W: Write>(&self, writer: &mut W) -> AllocResult<()> {
        writer.write_all(&self.encode_directory()).map_err(io_error)?;

        for zone in &self.zones {
            writer.write_all(&zone.len().to_le_bytes()).map_err(io_error)?;
            writer.write_all(zone.bytes()).map_err(io_error)?;
        }

        Ok(())
    }

    /// Restores an allocator from a snapshot written by [`serialize`](Self::serialize).
    ///
    /// The restored state is checked with
    /// [`check_consistency`](Self::check_consistency) before it is returned.
    ///
    /// # Errors
    ///
    /// - [`AllocError::InvalidSnapshot`] if the stream is truncated or malformed
    /// - [`AllocError::Corrupted`] if the decoded blocks are inconsistent
    /// - [`AllocError::Io`] if the reader fails
    pub fn deserialize<R: Read>(reader: &mut R) -> AllocResult<Self> {
        let zones_capacity = read_u32(reader)?;
        let zones_count = read_u32(reader)?;
        let initial_size = read_u32(reader)?;

        if initial_size == 0 || initial_size > MAX_BLOCK_SIZE || initial_size % ZONE_GRANULARITY != 0 {
            return Err(AllocError::InvalidSnapshot(format!(
                "initial zone size {initial_size} out of range"
            )));
        }
        if zones_count > zones_capacity {
            return Err(AllocError::InvalidSnapshot(format!(
                "{zones_count} zones exceed directory capacity {zones_capacity}"
            )));
        }

        let bucket_count = read_u32(reader)?;
        if bucket_count as usize != POTS {
            return Err(AllocError::InvalidSnapshot(format!(
                "expected {POTS} free buckets, found {bucket_count}"
            )));
        }

        let mut buckets: [Vec<MemPtr>; POTS] = Default::default();
        for bucket in &mut buckets {
            let len = read_u32(reader)?;
            for _ in 0..len {
                let zone_id = read_u32(reader)?;
                let offset = read_u32(reader)?;
                bucket.push(MemPtr::new(zone_id, offset));
            }
        }

        let mut zones = Vec::new();
        for zone_id in 0..zones_count {
            let len = read_u32(reader)?;
            if len > MAX_ZONE_BUFFER {
                return Err(AllocError::InvalidSnapshot(format!(
                    "zone {zone_id} declares {len} bytes"
                )));
            }

            let mut bytes = vec![0u8; len as usize];
            reader.read_exact(&mut bytes).map_err(read_error)?;

            let zone = Zone::from_bytes(&bytes).ok_or_else(|| {
                AllocError::InvalidSnapshot(format!("zone {zone_id} has invalid length {len}"))
            })?;
            zones.push(zone);
        }

        let allocator = Self {
            zones,
            zones_capacity,
            initial_size,
            free_blocks: FreeBlocks::from_buckets(buckets),
        };
        allocator.check_consistency()?;

        info!(
            zones = zones_count,
            reserved = allocator.reserved_size(),
            used = allocator.used_size(),
            "restored allocator from snapshot"
        );
        Ok(allocator)
    }

    /// Snapshot as a byte vector.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = self.encode_directory();
        out.reserve(self.zones.iter().map(|zone| 4 + zone.len() as usize).sum());

        for zone in &self.zones {
            out.extend_from_slice(&zone.len().to_le_bytes());
            out.extend_from_slice(zone.bytes());
        }
        out
    }

    /// Restores an allocator from a byte slice holding exactly one snapshot.
    ///
    /// # Errors
    ///
    /// Same as [`deserialize`](Self::deserialize), plus
    /// [`AllocError::InvalidSnapshot`] for trailing bytes.
    pub fn from_bytes(bytes: &[u8]) -> AllocResult<Self> {
        let mut reader = bytes;
        let allocator = Self::deserialize(&mut reader)?;
        if !reader.is_empty() {
            return Err(AllocError::InvalidSnapshot(format!(
                "{} trailing bytes after snapshot",
                reader.len()
            )));
        }
        Ok(allocator)
    }

    /// Overwrites this allocator with the state of `other`.
    ///
    /// Zone buffers whose length already matches are reused, so restoring a
    /// rollback copy each tick does not hit the global allocator.
    pub fn copy_from(&mut self, other: &Self) {
        self.zones.truncate(other.zones.len());
        for (zone, source) in self.zones.iter_mut().zip(&other.zones) {
            zone.copy_from(source);
        }
        for source in &other.zones[self.zones.len()..] {
            self.zones.push(source.clone());
        }

        self.zones_capacity = other.zones_capacity;
        self.initial_size = other.initial_size;
        self.free_blocks.clone_from(&other.free_blocks);
        self.debug_check();
    }

    /// Fixed part of the stream: directory fields and free lists.
    fn encode_directory(&self) -> Vec<u8> {
        let entries = self.free_blocks.len();
        let mut out = Vec::with_capacity(16 + POTS * 4 + entries * 8);

        out.extend_from_slice(&self.zones_capacity.to_le_bytes());
        out.extend_from_slice(&self.zones_count().to_le_bytes());
        out.extend_from_slice(&self.initial_size.to_le_bytes());
        out.extend_from_slice(&(POTS as u32).to_le_bytes());

        for bucket in self.free_blocks.buckets() {
            out.extend_from_slice(&(bucket.len() as u32).to_le_bytes());
            for ptr in bucket {
                out.extend_from_slice(&ptr.zone_id.to_le_bytes());
                out.extend_from_slice(&ptr.offset.to_le_bytes());
            }
        }
        out
    }
}

impl Clone for MemoryAllocator {
    fn clone(&self) -> Self {
        Self {
            zones: self.zones.clone(),
            zones_capacity: self.zones_capacity,
            initial_size: self.initial_size,
            free_blocks: self.free_blocks.clone(),
        }
    }

    fn clone_from(&mut self, source: &Self) {
        self.copy_from(source);
    }
}

fn read_u32<R: Read>(reader: &mut R) -> AllocResult<u32> {
    let mut bytes = [0u8; 4];
    reader.read_exact(&mut bytes).map_err(read_error)?;
    Ok(u32::from_le_bytes(bytes))
}

fn read_error(e: std::io::Error) -> AllocError {
    if e.kind() == ErrorKind::UnexpectedEof {
        AllocError::InvalidSnapshot("unexpected end of snapshot".to_string())
    } else {
        io_error(e)
    }
}

fn io_error(e: std::io::Error) -> AllocError {
    AllocError::Io(e.to_string())
}
