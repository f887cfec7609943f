//! Commit-path benchmarks.
//!
//! | Benchmark | What it measures |
//! |-----------|------------------|
//! | codec/encode | Whole-tree encoding cost at commit time |
//! | codec/decode | Whole-tree decoding cost at refresh time |
//! | commit/implicit | Single mutation with its implicit CAS commit |
//! | commit/transaction | Batched mutations amortized over one CAS |
//!
//! ```bash
//! cargo bench --bench commit
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use syncell::{decode, encode, Manager, MemoryBackend, Value};

fn wide_map(entries: usize) -> Value {
    Value::Map(
        (0..entries)
            .map(|i| {
                (
                    syncell::Scalar::Str(format!("key-{i}")),
                    Value::List(vec![Value::Int(i as i64), Value::String("payload".into())]),
                )
            })
            .collect(),
    )
}

fn bench_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec");
    for entries in [16, 256] {
        let value = wide_map(entries);
        let blob = encode(&value).unwrap();

        group.bench_with_input(BenchmarkId::new("encode", entries), &value, |b, value| {
            b.iter(|| encode(black_box(value)).unwrap());
        });
        group.bench_with_input(BenchmarkId::new("decode", entries), &blob, |b, blob| {
            b.iter(|| decode(black_box(blob)).unwrap());
        });
    }
    group.finish();
}

fn bench_commit(c: &mut Criterion) {
    let mut group = c.benchmark_group("commit");

    group.bench_function("implicit", |b| {
        let manager = Manager::new(MemoryBackend::new()).unwrap();
        manager.write(wide_map(16)).unwrap();
        let root = manager.read().unwrap();
        let map = root.as_map().unwrap().clone();
        let mut i = 0i64;
        b.iter(|| {
            i += 1;
            map.insert("hot", i).unwrap();
        });
    });

    group.bench_function("transaction", |b| {
        let manager = Manager::new(MemoryBackend::new()).unwrap();
        manager.write(wide_map(16)).unwrap();
        let root = manager.read().unwrap();
        let map = root.as_map().unwrap().clone();
        let mut i = 0i64;
        b.iter(|| {
            let txn = manager.transaction();
            for _ in 0..8 {
                i += 1;
                map.insert("hot", i).unwrap();
            }
            txn.commit().unwrap();
        });
    });

    group.finish();
}

criterion_group!(benches, bench_codec, bench_commit);
criterion_main!(benches);
