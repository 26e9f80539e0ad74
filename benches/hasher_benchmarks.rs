//! Benchmarks for full and incremental hashing passes

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;
use virtual_hasher::{
    EmptySource, HashRecord, LeafExtent, MemoryHashStore, VirtualHasher, VirtualLeaf,
};

fn leaf(path: u64) -> HashRecord {
    HashRecord::new(path, virtual_hasher::Hash::digest(&path.to_le_bytes()))
}

fn all_leaves(extent: &LeafExtent) -> Vec<HashRecord> {
    (extent.first()..=extent.last()).map(leaf).collect()
}

fn bench_full_pass(c: &mut Criterion) {
    let mut group = c.benchmark_group("full_pass");

    for size in [1_000u64, 10_000, 100_000].iter() {
        let extent = LeafExtent::for_leaf_count(*size).unwrap();
        let leaves = all_leaves(&extent);
        for threads in [1usize, 4].iter() {
            let hasher = VirtualHasher::with_threads(*threads).unwrap();
            group.bench_with_input(
                BenchmarkId::new(format!("{threads}_threads"), size),
                &leaves,
                |b, leaves| {
                    b.iter(|| {
                        let root = hasher
                            .hash(
                                &EmptySource,
                                Some(leaves.iter().copied()),
                                extent.first(),
                                extent.last(),
                                None,
                            )
                            .unwrap();
                        black_box(root)
                    });
                },
            );
        }
    }

    group.finish();
}

fn bench_sparse_update(c: &mut Criterion) {
    let hasher = VirtualHasher::with_threads(4).unwrap();
    let extent = LeafExtent::for_leaf_count(100_000).unwrap();

    // Pre-populate the store with a full pass
    let store = Arc::new(MemoryHashStore::new());
    for record in all_leaves(&extent) {
        store.put(record.path, record.leaf_hash());
    }
    hasher
        .hash(
            store.as_ref(),
            Some(all_leaves(&extent)),
            extent.first(),
            extent.last(),
            Some(store.as_ref()),
        )
        .unwrap();

    let mut group = c.benchmark_group("sparse_update");

    for dirty in [1u64, 100, 1_000].iter() {
        let step = extent.leaf_count() / dirty;
        let leaves: Vec<HashRecord> = (0..*dirty)
            .map(|i| {
                let path = extent.first() + i * step;
                HashRecord::new(path, virtual_hasher::Hash::digest(&(path ^ 0xa5).to_le_bytes()))
            })
            .collect();
        group.bench_with_input(BenchmarkId::from_parameter(dirty), &leaves, |b, leaves| {
            b.iter(|| {
                // Read-only source: the store is not updated between iterations
                let root = hasher
                    .hash(
                        store.as_ref(),
                        Some(leaves.iter().copied()),
                        extent.first(),
                        extent.last(),
                        None,
                    )
                    .unwrap();
                black_box(root)
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_full_pass, bench_sparse_update);
criterion_main!(benches);
