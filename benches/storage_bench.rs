//! Benchmarks for ringkv storage operations

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use ringkv::{Config, Engine};
use tempfile::TempDir;

const KEYS: u32 = 10_000;

fn open_engine(memtable_size_limit: usize) -> (TempDir, Engine) {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp_dir.path())
        .memtable_size_limit(memtable_size_limit)
        .build();
    let engine = Engine::open(config).unwrap();
    (temp_dir, engine)
}

fn key(i: u32) -> [u8; 4] {
    i.to_be_bytes()
}

fn filled_engine() -> (TempDir, Engine) {
    let (temp_dir, engine) = open_engine(64 * 1024);
    for i in 0..KEYS {
        engine.upsert(&key(i), b"benchmark-value").unwrap();
    }
    engine.compact().unwrap();
    // Leave some recent writes in memory so reads hit both layers
    for i in (0..KEYS).step_by(10) {
        engine.upsert(&key(i), b"updated-value").unwrap();
    }
    (temp_dir, engine)
}

fn storage_benchmarks(c: &mut Criterion) {
    c.bench_function("upsert", |b| {
        let (_dir, engine) = open_engine(4 * 1024 * 1024);
        let mut i = 0u32;
        b.iter(|| {
            engine.upsert(&key(i), b"benchmark-value").unwrap();
            i = i.wrapping_add(1);
        });
    });

    c.bench_function("upsert_with_flushes", |b| {
        let (_dir, engine) = open_engine(16 * 1024);
        let mut i = 0u32;
        b.iter(|| {
            engine.upsert(&key(i), b"benchmark-value").unwrap();
            i = i.wrapping_add(1);
        });
    });

    let (_dir, engine) = filled_engine();

    c.bench_function("get_hit", |b| {
        let mut i = 0u32;
        b.iter(|| {
            black_box(engine.get(&key(i % KEYS)).unwrap());
            i = i.wrapping_add(7);
        });
    });

    c.bench_function("get_miss", |b| {
        let mut i = KEYS;
        b.iter(|| {
            black_box(engine.get(&key(i)).unwrap());
            i = i.wrapping_add(1).max(KEYS);
        });
    });

    c.bench_function("range_100", |b| {
        let mut start = 0u32;
        b.iter(|| {
            let count = engine.range(&key(start), Some(&key(start + 100))).unwrap().count();
            black_box(count);
            start = (start + 100) % (KEYS - 100);
        });
    });

    c.bench_function("compact", |b| {
        b.iter_batched(
            filled_engine,
            |(dir, engine)| {
                engine.compact().unwrap();
                (dir, engine)
            },
            BatchSize::PerIteration,
        );
    });
}

criterion_group!(benches, storage_benchmarks);
criterion_main!(benches);
