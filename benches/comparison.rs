//! Cross-policy throughput benchmarks.
//!
//! Compares the three read-through policies on:
//! - pure hit streams (resident working set)
//! - uniform random streams larger than the cache
//! - Zipfian streams, the skewed shape real workloads tend to have

use std::convert::Infallible;
use std::hint::black_box;
use std::time::Instant;

use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Zipf};

use carcache::policy::car::CarCore;
use carcache::policy::cart::CartCore;
use carcache::policy::lru::LruCore;
use carcache::traits::{from_fn, Loader, ReplacementCache};

const CAPACITY: usize = 4096;
const OPS: u64 = 100_000;

fn identity() -> impl Loader<u64, Value = u64, Error = Infallible> {
    from_fn(|k: &u64| *k)
}

fn replay<C: ReplacementCache<u64, u64, Error = Infallible>>(cache: &mut C, trace: &[u64]) -> u64 {
    let mut checksum = 0u64;
    for key in trace {
        match cache.try_get(key) {
            Ok(value) => checksum = checksum.wrapping_add(*value),
            Err(never) => match never {},
        }
    }
    checksum
}

fn uniform_trace(len: usize, universe: u64, seed: u64) -> Vec<u64> {
    let mut rng = SmallRng::seed_from_u64(seed);
    (0..len).map(|_| rng.gen_range(0..universe)).collect()
}

fn zipf_trace(len: usize, universe: u64, exponent: f64, seed: u64) -> Vec<u64> {
    let mut rng = SmallRng::seed_from_u64(seed);
    let zipf = Zipf::new(universe, exponent).expect("valid zipf parameters");
    (0..len).map(|_| zipf.sample(&mut rng) as u64 - 1).collect()
}

// =============================================================================
// Get (cache hit) benchmarks
// =============================================================================

fn bench_get_hit(c: &mut Criterion) {
    let mut group = c.benchmark_group("get_hit");
    group.throughput(Throughput::Elements(OPS));

    // The resident half of each adaptive cache; keep the working set inside
    // it so every access after warmup is a hit.
    let working_set: Vec<u64> = (0..(CAPACITY as u64 / 2)).collect();

    group.bench_function("lru", |b| {
        b.iter_custom(|iters| {
            let mut cache = LruCore::new(CAPACITY, identity()).unwrap();
            replay(&mut cache, &working_set);
            let start = Instant::now();
            for _ in 0..iters {
                for i in 0..OPS {
                    black_box(cache.get(&(i % (CAPACITY as u64 / 2))));
                }
            }
            start.elapsed()
        })
    });

    group.bench_function("car", |b| {
        b.iter_custom(|iters| {
            let mut cache = CarCore::new(CAPACITY, identity()).unwrap();
            replay(&mut cache, &working_set);
            let start = Instant::now();
            for _ in 0..iters {
                for i in 0..OPS {
                    black_box(cache.get(&(i % (CAPACITY as u64 / 2))));
                }
            }
            start.elapsed()
        })
    });

    group.bench_function("cart", |b| {
        b.iter_custom(|iters| {
            let mut cache = CartCore::new(CAPACITY, identity()).unwrap();
            replay(&mut cache, &working_set);
            let start = Instant::now();
            for _ in 0..iters {
                for i in 0..OPS {
                    black_box(cache.get(&(i % (CAPACITY as u64 / 2))));
                }
            }
            start.elapsed()
        })
    });

    group.finish();
}

// =============================================================================
// Miss-heavy replay benchmarks
// =============================================================================

fn bench_uniform_replay(c: &mut Criterion) {
    let mut group = c.benchmark_group("uniform_replay");
    group.throughput(Throughput::Elements(OPS));
    let trace = uniform_trace(OPS as usize, CAPACITY as u64 * 8, 0x5eed);

    group.bench_function("lru", |b| {
        b.iter_custom(|iters| {
            let start = Instant::now();
            for _ in 0..iters {
                let mut cache = LruCore::new(CAPACITY, identity()).unwrap();
                black_box(replay(&mut cache, &trace));
            }
            start.elapsed()
        })
    });

    group.bench_function("car", |b| {
        b.iter_custom(|iters| {
            let start = Instant::now();
            for _ in 0..iters {
                let mut cache = CarCore::new(CAPACITY, identity()).unwrap();
                black_box(replay(&mut cache, &trace));
            }
            start.elapsed()
        })
    });

    group.bench_function("cart", |b| {
        b.iter_custom(|iters| {
            let start = Instant::now();
            for _ in 0..iters {
                let mut cache = CartCore::new(CAPACITY, identity()).unwrap();
                black_box(replay(&mut cache, &trace));
            }
            start.elapsed()
        })
    });

    group.finish();
}

fn bench_zipf_replay(c: &mut Criterion) {
    let mut group = c.benchmark_group("zipf_replay");
    group.throughput(Throughput::Elements(OPS));
    let trace = zipf_trace(OPS as usize, CAPACITY as u64 * 16, 1.03, 0xfeed);

    group.bench_function("lru", |b| {
        b.iter_custom(|iters| {
            let start = Instant::now();
            for _ in 0..iters {
                let mut cache = LruCore::new(CAPACITY, identity()).unwrap();
                black_box(replay(&mut cache, &trace));
            }
            start.elapsed()
        })
    });

    group.bench_function("car", |b| {
        b.iter_custom(|iters| {
            let start = Instant::now();
            for _ in 0..iters {
                let mut cache = CarCore::new(CAPACITY, identity()).unwrap();
                black_box(replay(&mut cache, &trace));
            }
            start.elapsed()
        })
    });

    group.bench_function("cart", |b| {
        b.iter_custom(|iters| {
            let start = Instant::now();
            for _ in 0..iters {
                let mut cache = CartCore::new(CAPACITY, identity()).unwrap();
                black_box(replay(&mut cache, &trace));
            }
            start.elapsed()
        })
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_get_hit,
    bench_uniform_replay,
    bench_zipf_replay
);
criterion_main!(benches);
