//! Benchmarks for record decoding and cursor reads.
//!
//! Run with: cargo bench --package alopex-tsdb
//!
//! ## Benchmark Categories
//!
//! - **Decoder**: Scalar and sparse tuple records
//! - **Cursor**: End-to-end select and join reads through the in-process engine

use alopex_tsdb::sample::{self, MAX_TUPLE_ELEMENTS};
use alopex_tsdb::{CreateOptions, CursorConfig, DatabaseConfig, JoinQuery, SelectQuery, Tsdb};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tempfile::TempDir;

fn resolve(id: u64) -> Option<String> {
    Some(format!("cpu.load host={}", id))
}

fn bench_decode_scalar(c: &mut Criterion) {
    let mut buf = Vec::new();
    for i in 0..1_000u64 {
        sample::encode_scalar(&mut buf, i % 16, i * 1_000_000_000, i as f64 * 0.5);
    }

    let mut group = c.benchmark_group("decode_scalar");
    group.throughput(Throughput::Elements(1_000));
    group.bench_function("1k_records", |b| {
        b.iter(|| {
            let mut offset = 0;
            while offset < buf.len() {
                let (row, consumed) = sample::decode(black_box(&buf), offset, resolve).unwrap();
                black_box(row);
                offset += consumed;
            }
        })
    });
    group.finish();
}

fn bench_decode_tuple(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_tuple");
    for width in [4usize, 16, MAX_TUPLE_ELEMENTS] {
        // Every third slot is absent.
        let slots: Vec<Option<f64>> = (0..width)
            .map(|i| (i % 3 != 0).then_some(i as f64))
            .collect();
        let mut buf = Vec::new();
        sample::encode_tuple(&mut buf, 1, 0, &slots);

        group.bench_with_input(BenchmarkId::from_parameter(width), &buf, |b, buf| {
            b.iter(|| sample::decode(black_box(buf), 0, resolve).unwrap())
        });
    }
    group.finish();
}

fn bench_cursor_select(c: &mut Criterion) {
    let temp_dir = TempDir::new().unwrap();
    let tsdb = Tsdb::in_memory();
    tsdb.create_database(temp_dir.path(), "bench", &CreateOptions::default())
        .unwrap();

    let mut group = c.benchmark_group("cursor_select_10k");
    group.throughput(Throughput::Elements(10_000));
    for buffer_size in [1024usize, 64 * 1024] {
        let config = DatabaseConfig {
            cursor: CursorConfig::new(buffer_size),
            ..Default::default()
        };
        let db = tsdb
            .open_database(temp_dir.path(), "bench", config)
            .unwrap();
        let session = db.session().unwrap();
        if buffer_size == 1024 {
            for i in 0..10_000u64 {
                let series = format!("cpu.load host={}", i % 10);
                session.write(&series, i * 1_000_000, i as f64).unwrap();
            }
        }
        let query = SelectQuery::builder("cpu.load").from(0).build().unwrap();

        group.bench_with_input(BenchmarkId::from_parameter(buffer_size), &query, |b, query| {
            b.iter(|| {
                let count = session
                    .query(query)
                    .unwrap()
                    .filter(|row| row.is_ok())
                    .count();
                assert_eq!(count, 10_000);
            })
        });
    }
    group.finish();
}

fn bench_cursor_join(c: &mut Criterion) {
    let temp_dir = TempDir::new().unwrap();
    let tsdb = Tsdb::in_memory();
    tsdb.create_database(temp_dir.path(), "bench", &CreateOptions::default())
        .unwrap();
    let db = tsdb
        .open_database(temp_dir.path(), "bench", DatabaseConfig::default())
        .unwrap();
    let session = db.session().unwrap();
    for i in 0..1_000u64 {
        session.write("cpu.user host=a", i, 1.0).unwrap();
        if i % 2 == 0 {
            session.write("cpu.sys host=a", i, 2.0).unwrap();
        }
    }
    let query = JoinQuery::builder(&["cpu.user", "cpu.sys"])
        .from(0)
        .build()
        .unwrap();

    c.bench_function("cursor_join_1k", |b| {
        b.iter(|| session.query(&query).unwrap().count())
    });
}

criterion_group!(
    benches,
    bench_decode_scalar,
    bench_decode_tuple,
    bench_cursor_select,
    bench_cursor_join
);
criterion_main!(benches);
