//! Benchmarks for the storage engine (WAL + LWW table).

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use meshkv_common::VersionedValue;
use meshkv_storage::engine::StorageEngine;
use meshkv_storage::record::StorageRecord;
use meshkv_storage::wal::FsyncPolicy;
use tempfile::TempDir;

fn make_value(ts: f64, value_size: usize) -> VersionedValue {
    VersionedValue::at(ts, serde_json::Value::String("x".repeat(value_size)))
}

fn bench_engine_put(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine_put");

    for size in [64, 1024, 4096] {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let dir = TempDir::new().unwrap();
            let mut engine = StorageEngine::open(dir.path(), FsyncPolicy::None).unwrap();

            let mut i = 0u64;
            b.iter(|| {
                let key = format!("key_{}", i);
                engine.put(&key, make_value(i as f64, size)).unwrap();
                i += 1;
            });
        });
    }
    group.finish();
}

fn bench_engine_get(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let mut engine = StorageEngine::open(dir.path(), FsyncPolicy::None).unwrap();

    // Pre-populate 1000 keys
    for i in 0..1000 {
        let key = format!("key_{:04}", i);
        engine.put(&key, make_value(1.0, 256)).unwrap();
    }

    c.bench_function("engine_get", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = format!("key_{:04}", i % 1000);
            black_box(engine.get(&key));
            i += 1;
        });
    });
}

fn bench_engine_put_overwrite(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let mut engine = StorageEngine::open(dir.path(), FsyncPolicy::None).unwrap();

    // Pre-populate 100 keys
    for i in 0..100 {
        let key = format!("key_{:04}", i);
        engine.put(&key, make_value(1.0, 256)).unwrap();
    }

    c.bench_function("engine_put_overwrite", |b| {
        let mut ts = 2.0f64;
        b.iter(|| {
            for i in 0..100 {
                let key = format!("key_{:04}", i);
                engine.put(&key, make_value(ts, 256)).unwrap();
            }
            ts += 1.0;
        });
    });
}

fn bench_wal_append(c: &mut Criterion) {
    use meshkv_storage::wal::Wal;

    let dir = TempDir::new().unwrap();
    let wal_path = dir.path().join("bench.wal");
    let mut wal = Wal::open(&wal_path, FsyncPolicy::None).unwrap();

    c.bench_function("wal_append", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let record = StorageRecord::new(format!("k_{}", i), make_value(i as f64, 128));
            wal.append(&record).unwrap();
            i += 1;
        });
    });
}

criterion_group!(
    benches,
    bench_engine_put,
    bench_engine_get,
    bench_engine_put_overwrite,
    bench_wal_append
);
criterion_main!(benches);
