//! # Allocator Hot Path Benchmark
//!
//! Measures alloc/free throughput for the workloads a simulation tick
//! produces: many small short-lived blocks plus occasional large arrays.
//!
//! Run with: `cargo bench --package zonemem_core`

#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use zonemem_core::{AllocatorConfig, MemoryAllocator, SharedAllocator};

/// Zone size used by every benchmark (4 MiB).
const ZONE_SIZE: u32 = 4 * 1024 * 1024;

fn allocator() -> MemoryAllocator {
    MemoryAllocator::new(&AllocatorConfig::new(4, ZONE_SIZE))
}

/// Benchmark: alloc then immediately free one block.
fn bench_alloc_free_pair(c: &mut Criterion) {
    let mut group = c.benchmark_group("alloc_free_pair");

    for size in [16u32, 256, 4096] {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let mut allocator = allocator();
            b.iter(|| {
                let ptr = allocator.alloc(black_box(size));
                allocator.free(ptr)
            });
        });
    }

    group.finish();
}

/// Benchmark: fill with 10k blocks, then free them all (coalescing path).
fn bench_batch(c: &mut Criterion) {
    let mut ptrs = Vec::with_capacity(10_000);

    c.bench_function("alloc_10k_free_10k", |b| {
        let mut allocator = allocator();
        b.iter(|| {
            for i in 0..10_000u32 {
                ptrs.push(allocator.alloc(16 + (i % 8) * 8));
            }
            for ptr in ptrs.drain(..) {
                allocator.free(ptr);
            }
        });
    });
}

/// Benchmark: random mixed workload on a fragmented allocator.
fn bench_fragmented(c: &mut Criterion) {
    c.bench_function("fragmented_mixed_workload", |b| {
        let mut rng = ChaCha8Rng::seed_from_u64(0x5EED);
        let mut allocator = allocator();
        let mut live: Vec<_> = (0..5_000).map(|_| allocator.alloc(rng.gen_range(8..1024))).collect();

        b.iter(|| {
            let index = rng.gen_range(0..live.len());
            allocator.free(live.swap_remove(index));
            live.push(allocator.alloc(rng.gen_range(8..1024)));
        });
    });
}

/// Benchmark: typed write/read through handles.
fn bench_typed_access(c: &mut Criterion) {
    let mut allocator = allocator();
    let ptr = allocator.alloc_array::<u32>(1024);

    c.bench_function("typed_array_sum_1024", |b| {
        b.iter(|| {
            let values = allocator.array_mut::<u32>(ptr, 1024).unwrap();
            for (i, value) in values.iter_mut().enumerate() {
                *value = i as u32;
            }
            black_box(allocator.array::<u32>(ptr, 1024).unwrap().iter().sum::<u32>())
        });
    });
}

/// Benchmark: alloc/free through the shared mutex, uncontended.
fn bench_shared(c: &mut Criterion) {
    let shared = SharedAllocator::from_allocator(allocator());

    c.bench_function("shared_alloc_free_pair", |b| {
        b.iter(|| {
            let ptr = shared.alloc(black_box(64));
            shared.free(ptr)
        });
    });
}

criterion_group!(
    benches,
    bench_alloc_free_pair,
    bench_batch,
    bench_fragmented,
    bench_typed_access,
    bench_shared,
);
criterion_main!(benches);
