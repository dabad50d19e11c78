//! Benchmarks for the loop generation pipeline.
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use polygen::prelude::*;

/// Benchmark domain parsing.
fn bench_parsing(c: &mut Criterion) {
    let source = "[n, m] -> { S[i, j] : 0 <= i < n and 0 <= j < m; T[i] : 0 <= i < n }";

    c.bench_function("parse_union_set", |b| {
        b.iter(|| parse_union_set(black_box(source), &[]).unwrap())
    });
}

/// Benchmark band tiling on the schedule tree.
fn bench_tiling(c: &mut Criterion) {
    let domain = parse_union_set("{ S[i, j, k] : 0 <= i, j, k < 256 }", &[]).unwrap();
    let map = parse_union_map("{ S[i, j, k] -> [i, j, k] }", &[]).unwrap();
    let tree = ScheduleTree::from_domain(domain).insert_band(&map).unwrap();

    c.bench_function("tile_band_3d", |b| {
        b.iter(|| {
            let band = tree.first_band().unwrap();
            tile_band(&tree, &band, black_box(&[32, 32, 32])).unwrap()
        })
    });
}

/// Benchmark code generation for a tiled nest.
fn bench_codegen(c: &mut Criterion) {
    c.bench_function("compile_tiled_matmul", |b| {
        b.iter(|| {
            Pipeline::new(black_box("[n] -> { S[i, j, k] : 0 <= i, j, k < n }"))
                .schedule("{ S[i, j, k] -> [i, j, k] }")
                .tile(&[32, 32, 32])
                .compile()
                .unwrap()
        })
    });

    let points = parse_set("{ S[i, j] : 0 <= i < 100 and 0 <= j <= i }", &[]).unwrap();
    c.bench_function("enumerate_triangle", |b| {
        b.iter(|| black_box(&points).points(&[]).unwrap())
    });
}

criterion_group!(benches, bench_parsing, bench_tiling, bench_codegen);
criterion_main!(benches);
