use std::{iter::repeat_with, num::NonZeroUsize, ops::Range, sync::Arc, thread};

use bcache::{device::MemDisk, BufferCache, CacheConfig, ExhaustionPolicy};
use criterion::{
    black_box, criterion_group, criterion_main, measurement::WallTime, BatchSize, BenchmarkGroup,
    BenchmarkId, Criterion,
};
use rand::{rngs::ThreadRng, thread_rng, Rng};

const SAMPLE_SIZE: usize = 4096;
const SAMPLE_RANGE: Range<u32> = 0..2048;
const CAPACITY: usize = 512;
const BLOCK_SIZE: usize = 512;

fn bench(c: &mut Criterion) {
    let mut group = c.benchmark_group("Buffer Cache");

    bench_buckets("read", 1, &mut group);
    for threads in [2, 4, 8] {
        bench_buckets(&format!("read x{}", threads), threads, &mut group);
    }
}

fn bench_buckets(id: &str, threads: usize, group: &mut BenchmarkGroup<'_, WallTime>) {
    let mut rng = thread_rng();

    for buckets in [1, 13, 61] {
        let cache = new_cache(buckets);
        let id = BenchmarkId::new(id, buckets);
        group.bench_with_input(id, &threads, |b, &threads| {
            b.iter_batched(
                || random_vec(&mut rng, SAMPLE_SIZE, &SAMPLE_RANGE),
                |input| read_all(&cache, threads, &input),
                BatchSize::SmallInput,
            )
        });
    }
}

fn read_all(cache: &BufferCache, threads: usize, blocks: &[u32]) {
    let chunk = blocks.len() / threads;
    thread::scope(|s| {
        for part in blocks.chunks(chunk) {
            s.spawn(move || {
                for block in part {
                    let buf = cache.read(0, black_box(*block)).unwrap();
                    black_box(buf[0]);
                }
            });
        }
    });
}

fn new_cache(buckets: usize) -> BufferCache {
    CacheConfig {
        capacity: NonZeroUsize::new(CAPACITY).unwrap(),
        buckets: NonZeroUsize::new(buckets).unwrap(),
        block_size: NonZeroUsize::new(BLOCK_SIZE).unwrap(),
        exhaustion: ExhaustionPolicy::Wait,
        ..CacheConfig::new(Arc::new(MemDisk::new(BLOCK_SIZE)))
    }
    .build()
    .unwrap()
}

fn random_vec(rng: &mut ThreadRng, count: usize, range: &Range<u32>) -> Vec<u32> {
    repeat_with(|| rng.gen_range(range.clone()))
        .take(count)
        .collect()
}

criterion_group!(benches, bench);
criterion_main!(benches);
