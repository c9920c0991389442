//! Throughput benchmarks for the RESP parser and the keyspace.

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use fluxkv::protocol::parse_frame;
use fluxkv::storage::Store;
use std::sync::Arc;
use std::time::Duration;

/// Benchmark frame parsing.
fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse");
    group.throughput(Throughput::Elements(1));

    let set_cmd = b"*3\r\n$3\r\nSET\r\n$8\r\nuser:101\r\n$5\r\nhello\r\n";
    group.bench_function("set_command", |b| {
        b.iter(|| black_box(parse_frame(set_cmd).unwrap().unwrap()));
    });

    let big_bulk = {
        let payload = "x".repeat(16 * 1024);
        let mut buf = format!("${}\r\n", payload.len()).into_bytes();
        buf.extend_from_slice(payload.as_bytes());
        buf.extend_from_slice(b"\r\n");
        buf
    };
    group.bench_function("bulk_16k", |b| {
        b.iter(|| black_box(parse_frame(&big_bulk).unwrap().unwrap()));
    });

    let nested = b"*2\r\n*2\r\n:1\r\n:2\r\n*2\r\n:3\r\n:4\r\n";
    group.bench_function("nested_array", |b| {
        b.iter(|| black_box(parse_frame(nested).unwrap().unwrap()));
    });

    group.finish();
}

/// Benchmark SET operations.
fn bench_set(c: &mut Criterion) {
    let store = Store::new();

    let mut group = c.benchmark_group("set");
    group.throughput(Throughput::Elements(1));

    group.bench_function("set_small", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = Bytes::from(format!("key:{}", i));
            store.set(key, Bytes::from("small_value"), None);
            i += 1;
        });
    });

    group.bench_function("set_medium", |b| {
        let mut i = 0u64;
        let value = Bytes::from("x".repeat(1024));
        b.iter(|| {
            let key = Bytes::from(format!("key:{}", i));
            store.set(key, value.clone(), None);
            i += 1;
        });
    });

    group.bench_function("set_with_ttl", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = Bytes::from(format!("ttl:{}", i));
            store.set(key, Bytes::from("value"), Some(Duration::from_secs(3600)));
            i += 1;
        });
    });

    group.finish();
}

/// Benchmark GET operations.
fn bench_get(c: &mut Criterion) {
    let store = Store::new();

    for i in 0..100_000 {
        let key = Bytes::from(format!("key:{}", i));
        let value = Bytes::from(format!("value:{}", i));
        store.set(key, value, None);
    }

    let mut group = c.benchmark_group("get");
    group.throughput(Throughput::Elements(1));

    group.bench_function("get_existing", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = Bytes::from(format!("key:{}", i % 100_000));
            black_box(store.get(&key).unwrap());
            i += 1;
        });
    });

    group.bench_function("get_missing", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = Bytes::from(format!("missing:{}", i));
            black_box(store.get(&key).unwrap());
            i += 1;
        });
    });

    group.finish();
}

/// Benchmark mixed workload (80% reads, 20% writes).
fn bench_mixed(c: &mut Criterion) {
    let store = Store::new();

    for i in 0..10_000 {
        let key = Bytes::from(format!("key:{}", i));
        let value = Bytes::from(format!("value:{}", i));
        store.set(key, value, None);
    }

    let mut group = c.benchmark_group("mixed");
    group.throughput(Throughput::Elements(1));

    group.bench_function("80_read_20_write", |b| {
        let mut i = 0u64;
        b.iter(|| {
            if i % 5 == 0 {
                let key = Bytes::from(format!("new:{}", i));
                store.set(key, Bytes::from("value"), None);
            } else {
                let key = Bytes::from(format!("key:{}", i % 10_000));
                black_box(store.get(&key).unwrap());
            }
            i += 1;
        });
    });

    group.finish();
}

/// Benchmark list push/pop.
fn bench_list(c: &mut Criterion) {
    let store = Store::new();

    let mut group = c.benchmark_group("list");
    group.throughput(Throughput::Elements(1));

    group.bench_function("rpush_then_lpop", |b| {
        let key = Bytes::from("queue");
        b.iter(|| {
            store.rpush(key.clone(), vec![Bytes::from("job")]).unwrap();
            black_box(store.lpop(&key).unwrap());
        });
    });

    group.finish();
}

/// Benchmark concurrent access.
fn bench_concurrent(c: &mut Criterion) {
    use std::thread;

    let mut group = c.benchmark_group("concurrent");
    group.measurement_time(Duration::from_secs(10));

    group.bench_function("4_threads_mixed", |b| {
        b.iter(|| {
            let store = Arc::new(Store::new());
            let handles: Vec<_> = (0..4)
                .map(|t| {
                    let store = Arc::clone(&store);
                    thread::spawn(move || {
                        for i in 0..10_000 {
                            let key = Bytes::from(format!("key:{}:{}", t, i));
                            store.set(key.clone(), Bytes::from("value"), None);
                            store.get(&key).unwrap();
                        }
                    })
                })
                .collect();

            for handle in handles {
                handle.join().unwrap();
            }

            black_box(store.len());
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_parse,
    bench_set,
    bench_get,
    bench_mixed,
    bench_list,
    bench_concurrent,
);

criterion_main!(benches);
