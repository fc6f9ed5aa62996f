//! Performance benchmarks for terra-raster-lib
//!
//! Run with: cargo bench --package terra-raster-lib

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use geo::{Coord, LineString, MultiLineString, MultiPolygon, Polygon};
use std::sync::Arc;
use terra_raster_lib::element::ElementKind;
use terra_raster_lib::{
    BlendMode, BlockState, ChunkPos, CollectionConfig, DrawFunction, ElementCollection, GridBuilder,
    IntervalTree, VectorElement,
};

/// A wobbly closed ring of `n` vertices around a center, in block coordinates
fn generate_ring(n: usize, cx: f64, cz: f64, radius: f64) -> LineString<f64> {
    let mut coords: Vec<Coord<f64>> = (0..n)
        .map(|i| {
            let t = i as f64 / n as f64 * std::f64::consts::TAU;
            let r = radius * (1.0 + 0.15 * (t * 7.0).sin());
            Coord {
                x: cx + r * t.cos(),
                y: cz + r * t.sin(),
            }
        })
        .collect();
    coords.push(coords[0]);
    LineString::new(coords)
}

/// A meandering polyline of `n` vertices heading east
fn generate_road(n: usize, x0: f64, z0: f64) -> LineString<f64> {
    LineString::new(
        (0..n)
            .map(|i| Coord {
                x: x0 + i as f64 * 2.0,
                y: z0 + (i as f64 * 0.1).sin() * 40.0,
            })
            .collect(),
    )
}

fn block(name: &str) -> Arc<DrawFunction> {
    Arc::new(DrawFunction::Block(BlockState::new(name)))
}

/// Lakes and roads spread over a square of `side` blocks
fn generate_elements(count: usize, side: f64) -> Vec<VectorElement> {
    let per_row = (count as f64).sqrt().ceil().max(1.0) as usize;
    let spacing = side / per_row as f64;
    (0..count)
        .filter_map(|i| {
            let cx = (i % per_row) as f64 * spacing + spacing / 2.0;
            let cz = (i / per_row) as f64 * spacing + spacing / 2.0;
            let kind = if i % 2 == 0 {
                let ring = generate_ring(64, cx, cz, spacing / 3.0);
                ElementKind::fill_polygon(&MultiPolygon::new(vec![Polygon::new(ring, vec![])]))?
            } else {
                let road = generate_road(32, cx - spacing / 2.0, cz);
                ElementKind::line(&MultiLineString::new(vec![road]), 3.0)?
            };
            Some(VectorElement::new(i.to_string(), (i % 3) as f64, block("stone"), kind))
        })
        .collect()
}

// ============================================================================
// Core Benchmarks - Key performance indicators
// ============================================================================

fn bench_interval_tree(c: &mut Criterion) {
    let mut group = c.benchmark_group("interval_tree");

    let intervals: Vec<(f64, f64)> = (0..100_000)
        .map(|i| {
            let start = (i * 7919 % 100_000) as f64;
            (start, start + (i % 50) as f64 + 1.0)
        })
        .collect();

    group.throughput(Throughput::Elements(intervals.len() as u64));
    group.bench_function("build_100k", |b| {
        b.iter(|| IntervalTree::new(intervals.iter().copied()));
    });

    let tree = IntervalTree::new(intervals.iter().copied());
    group.bench_function("stab_100k", |b| {
        let mut x = 0.0;
        b.iter(|| {
            x = (x + 997.5) % 100_000.0;
            tree.query_point(x).len()
        });
    });

    group.finish();
}

fn bench_rasterize(c: &mut Criterion) {
    let mut group = c.benchmark_group("rasterize");

    for vertices in [64, 1_024, 16_384] {
        let ring = generate_ring(vertices, 8.0, 8.0, 200.0);
        let kind = ElementKind::fill_polygon(&MultiPolygon::new(vec![Polygon::new(ring, vec![])]));
        let Some(kind) = kind else { continue };
        let lake = VectorElement::new("lake", 0.0, Arc::new(DrawFunction::Water), kind);

        group.bench_with_input(BenchmarkId::new("fill_polygon", vertices), &lake, |b, lake| {
            b.iter(|| {
                let mut builder = GridBuilder::new();
                lake.rasterize(ChunkPos::new(0, 0), &mut builder);
                builder
            });
        });
    }

    let ring = generate_ring(4_096, 8.0, 8.0, 200.0);
    if let Some(kind) =
        ElementKind::distance_polygon(&MultiPolygon::new(vec![Polygon::new(ring, vec![])]), 32)
    {
        let coast = VectorElement::new("coast", 0.0, Arc::new(DrawFunction::Water), kind);
        group.bench_function("distance_polygon_4k", |b| {
            b.iter(|| {
                let mut builder = GridBuilder::new();
                coast.rasterize(ChunkPos::new(12, 0), &mut builder);
                builder
            });
        });
    }

    let road = generate_road(10_000, -100.0, 8.0);
    if let Some(kind) = ElementKind::line(&MultiLineString::new(vec![road]), 4.0) {
        let road = VectorElement::new("road", 0.0, block("gravel"), kind);
        group.bench_function("line_10k", |b| {
            b.iter(|| {
                let mut builder = GridBuilder::new();
                road.rasterize(ChunkPos::new(3, 0), &mut builder);
                builder
            });
        });
    }

    group.finish();
}

fn bench_collection(c: &mut Criterion) {
    let mut group = c.benchmark_group("collection");
    group.sample_size(20);

    let elements = generate_elements(2_000, 4_096.0);
    group.throughput(Throughput::Elements(elements.len() as u64));
    group.bench_function("build_2k", |b| {
        b.iter(|| ElementCollection::build(CollectionConfig::default(), elements.clone()));
    });

    let collection = ElementCollection::build(CollectionConfig::default(), elements);
    group.bench_function("rasterize_tile_2k", |b| {
        let mut n = 0;
        b.iter(|| {
            n = (n + 37) % 256;
            let mut builder = GridBuilder::new();
            collection.rasterize(ChunkPos::new(n, (n * 7) % 256), 0, &mut builder);
            builder
        });
    });

    group.finish();
}

fn bench_blend(c: &mut Criterion) {
    let mut group = c.benchmark_group("blend");

    let width = 256;
    let grid: Vec<f64> = (0..width * width).map(|i| ((i % 97) as f64).sin()).collect();
    for mode in [BlendMode::Nearest, BlendMode::Linear, BlendMode::Smooth, BlendMode::Cubic] {
        group.bench_with_input(BenchmarkId::new("sample_grid", mode), &mode, |b, &mode| {
            let mut x = 0.0;
            b.iter(|| {
                x = (x + 3.3) % 250.0;
                mode.sample_grid(&grid, width, width, x, 250.0 - x)
            });
        });
    }

    group.finish();
}

// ============================================================================
// Criterion Configuration
// ============================================================================

criterion_group!(
    benches,
    bench_interval_tree,
    bench_rasterize,
    bench_collection,
    bench_blend,
);

criterion_main!(benches);
