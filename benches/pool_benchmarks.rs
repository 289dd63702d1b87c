use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use memplan::{BlockPool, MemoryManager};

/// Random allocate/free churn against the raw pool, the pattern a long
/// emission pass produces.
fn bench_pool_churn(c: &mut Criterion) {
    c.bench_function("pool_churn_512_ops", |b| {
        b.iter(|| {
            let mut pool = BlockPool::new();
            let mut rng = StdRng::seed_from_u64(7);
            let mut live: Vec<usize> = Vec::new();

            for _ in 0..512 {
                if !live.is_empty() && rng.gen_bool(0.45) {
                    let idx = rng.gen_range(0..live.len());
                    let offset = live.swap_remove(idx);
                    pool.free(offset).unwrap();
                } else {
                    let size = rng.gen_range(1..4096);
                    live.push(pool.allocate(size).unwrap());
                }
            }
            for offset in live.drain(..) {
                pool.free(offset).unwrap();
            }
            black_box(pool.high_water_mark())
        })
    });
}

/// Best-fit search cost with a heavily fragmented free set.
fn bench_best_fit_fragmented(c: &mut Criterion) {
    c.bench_function("best_fit_256_free_blocks", |b| {
        b.iter(|| {
            let mut pool = BlockPool::new();
            let mut offsets = Vec::new();
            for i in 0..512 {
                offsets.push(pool.allocate(64 + (i % 32)).unwrap());
            }
            // Free every other block so nothing coalesces.
            for offset in offsets.iter().step_by(2) {
                pool.free(*offset).unwrap();
            }
            for i in 0..256 {
                black_box(pool.allocate(32 + (i % 32)).unwrap());
            }
            black_box(pool.high_water_mark())
        })
    });
}

/// Full plan of a nested emission pass through the manager and allocators.
fn bench_nested_planning(c: &mut Criterion) {
    c.bench_function("plan_64_nested_kernels", |b| {
        b.iter(|| {
            let manager = MemoryManager::new();
            let constants = vec![0u8; 64];

            for _ in 0..64 {
                let mut outer = manager.build_allocator();
                outer.reserve_argspace(&constants).unwrap();
                outer.reserve_workspace(2048, true).unwrap();

                let mut inner = manager.build_allocator();
                inner.reserve_workspace(512, false).unwrap();
                inner.close().unwrap();

                outer.close().unwrap();
            }

            manager.allocate().unwrap();
            black_box(manager.get_allocation_size().unwrap())
        })
    });
}

criterion_group!(
    benches,
    bench_pool_churn,
    bench_best_fit_fragmented,
    bench_nested_planning
);
criterion_main!(benches);
