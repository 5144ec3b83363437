//! Integration tests for the allocator's observable behaviour.

use zonemem_core::{AllocatorConfig, MemPtr, MemoryAllocator, BLOCK_HEADER_SIZE};

const HEADER: u64 = BLOCK_HEADER_SIZE as u64;

fn allocator(initial_size: u32) -> MemoryAllocator {
    MemoryAllocator::new(&AllocatorConfig::new(1, initial_size).unrestricted())
}

fn assert_conserved(allocator: &MemoryAllocator) {
    assert_eq!(
        allocator.reserved_size(),
        allocator.used_size() + allocator.free_size()
    );
}

#[test]
fn test_pattern_roundtrip() {
    let mut allocator = allocator(4096);
    let ptrs: Vec<MemPtr> = [1, 7, 64, 333, 1000].iter().map(|&size| allocator.alloc(size)).collect();

    for (i, &ptr) in ptrs.iter().enumerate() {
        for (j, byte) in allocator.bytes_mut(ptr).unwrap().iter_mut().enumerate() {
            *byte = (i * 31 + j) as u8;
        }
    }

    for (i, &ptr) in ptrs.iter().enumerate() {
        let bytes = allocator.bytes(ptr).unwrap();
        assert!(bytes.iter().enumerate().all(|(j, &byte)| byte == (i * 31 + j) as u8));
    }
}

#[test]
fn test_live_allocations_never_overlap() {
    let mut allocator = allocator(2048);
    let ptrs: Vec<MemPtr> = (0..24).map(|i| allocator.alloc(8 + i * 12)).collect();

    // Punch holes and refill them with different sizes
    let mut live = Vec::new();
    for (i, ptr) in ptrs.into_iter().enumerate() {
        if i % 3 == 0 {
            assert!(allocator.free(ptr));
        } else {
            live.push(ptr);
        }
    }
    for size in [4, 20, 100, 7, 300] {
        live.push(allocator.alloc(size));
    }

    let mut ranges: Vec<(u32, u32, u32)> = live
        .iter()
        .map(|&ptr| (ptr.zone_id, ptr.offset, ptr.offset + allocator.block_size(ptr).unwrap()))
        .collect();
    ranges.sort_unstable();

    for pair in ranges.windows(2) {
        let (zone_a, _, end_a) = pair[0];
        let (zone_b, start_b, _) = pair[1];
        if zone_a == zone_b {
            assert!(end_a + BLOCK_HEADER_SIZE <= start_b, "{pair:?} overlap");
        }
    }
}

#[test]
fn test_conservation() {
    let mut allocator = allocator(512);
    assert_conserved(&allocator);

    let a = allocator.alloc(100);
    let b = allocator.alloc(900);
    assert_conserved(&allocator);

    allocator.free(a);
    assert_conserved(&allocator);

    let _ = allocator.realloc(b, 2000);
    assert_conserved(&allocator);
}

#[test]
fn test_balanced_workload_recovers() {
    let mut allocator = allocator(4096);

    let ptrs: Vec<_> = (0..32).map(|_| allocator.alloc(48)).collect();
    let used = allocator.used_size();
    for ptr in ptrs {
        assert!(allocator.free(ptr));
    }
    assert_eq!(allocator.used_size(), 0);

    let ptrs: Vec<_> = (0..32).map(|_| allocator.alloc(48)).collect();
    assert_eq!(allocator.used_size(), used);
    assert_eq!(allocator.zones_count(), 1);
    assert_eq!(ptrs.len(), 32);
}

#[test]
fn test_coalescing_three_neighbours() {
    const S: u32 = 64;
    let mut allocator = allocator(1024);

    let a = allocator.alloc(S);
    let b = allocator.alloc(S);
    let c = allocator.alloc(S);
    let _guard = allocator.alloc(S);

    assert!(allocator.free(b));
    assert!(allocator.free(a));
    assert!(allocator.free(c));

    let combined = 3 * S + 2 * BLOCK_HEADER_SIZE;
    assert_eq!(allocator.block_size(a).unwrap(), combined);

    let merged = allocator.alloc(combined);
    assert_eq!(merged, a);
    assert_eq!(allocator.zones_count(), 1);
    allocator.check_consistency().unwrap();
}

#[test]
fn test_serialization_fidelity() {
    let mut allocator = allocator(1024);
    let ptrs: Vec<_> = [40, 80, 120, 160].iter().map(|&size| allocator.alloc(size)).collect();
    allocator.bytes_mut(ptrs[2]).unwrap().fill(0x5A);
    allocator.free(ptrs[1]);
    let _ = allocator.alloc(3000);

    let mut bytes = Vec::new();
    allocator.serialize(&mut bytes).unwrap();
    let mut restored = MemoryAllocator::deserialize(&mut bytes.as_slice()).unwrap();

    assert_eq!(restored.reserved_size(), allocator.reserved_size());
    assert_eq!(restored.used_size(), allocator.used_size());
    assert_eq!(restored.free_size(), allocator.free_size());
    assert!(restored.bytes(ptrs[2]).unwrap().iter().all(|&byte| byte == 0x5A));

    // The freed 80-byte hole is handed out again in both
    let original = allocator.alloc(80);
    let replayed = restored.alloc(80);
    assert_eq!(original, ptrs[1]);
    assert_eq!(replayed, original);
    restored.check_consistency().unwrap();
}

#[test]
fn test_first_allocation_layout() {
    let mut allocator = allocator(1024);

    let ptr = allocator.alloc(100);
    assert_eq!(ptr, MemPtr::new(0, BLOCK_HEADER_SIZE));
    assert_eq!(allocator.used_size(), 100 + HEADER);

    assert!(allocator.free(ptr));
    assert_eq!(allocator.used_size(), 0);
    assert_eq!(allocator.free_size(), 1024);
}

#[test]
fn test_zone_growth() {
    let mut allocator = allocator(64);

    let ptr = allocator.alloc(1000);
    assert_eq!(allocator.zones_count(), 2);
    assert_eq!(ptr.zone_id, 1);
    assert!(allocator.block_size(ptr).unwrap() >= 1000);
    assert!(allocator.reserved_size() >= 64 + 1000);
}

#[test]
fn test_split_and_reuse() {
    let mut allocator = allocator(1024);

    let ptr = allocator.alloc(100);
    assert!(allocator.free(ptr));

    let reused = allocator.alloc(50);
    assert_eq!(reused.zone_id, 0);
    assert_eq!(reused, ptr);
    assert_eq!(allocator.zones_count(), 1);
}

#[test]
fn test_default_config_clamps() {
    let allocator = MemoryAllocator::new(&AllocatorConfig::new(1, 1024));
    assert_eq!(allocator.reserved_size(), u64::from(zonemem_core::MIN_ZONE_SIZE));
}
