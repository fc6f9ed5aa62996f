//! Scanline polygon fill and clamped signed distance field
//!
//! Both rasterizers sample one vertical scanline per block column at the column
//! center `x + 0.5`, collect the z values where boundary edges cross it, and pair
//! them up with the even-odd rule. A block is inside when its center lies in
//! `[z_even, z_odd)` for some crossing pair.

use super::{ChunkPos, TILE_SIZE};
use crate::interval_tree::IntervalTree;
use crate::segment::Segment;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use smallvec::SmallVec;

/// Crossing buffer; most scanlines cross a ring only a handful of times
pub(super) type Crossings = SmallVec<[f64; 8]>;

/// Attempts with a jittered sample position after an odd crossing count
const JITTER_RETRIES: usize = 3;

/// Largest jitter applied to the sample position, in blocks
const JITTER: f64 = 1e-3;

/// Sorted z coordinates where polygon edges cross the vertical line at `x`.
///
/// Half-open edge extents count a vertex on the sample line once per side, so
/// closed rings always give an even count. An odd count comes from open or
/// degenerate rings; the sample is nudged by a small seeded jitter and retried.
/// If every retry still yields an odd count, the scanline is treated as empty.
pub(super) fn crossings(edges: &IntervalTree<Segment>, x: f64, out: &mut Crossings) {
    collect_crossings(edges, x, out);
    if out.len() % 2 == 0 {
        out.sort_by(f64::total_cmp);
        return;
    }

    let mut rng = StdRng::seed_from_u64(x.to_bits());
    for _ in 0..JITTER_RETRIES {
        collect_crossings(edges, x + rng.gen_range(-JITTER..JITTER), out);
        if out.len() % 2 == 0 {
            out.sort_by(f64::total_cmp);
            return;
        }
    }

    tracing::warn!(x, "odd crossing count after jitter retries, skipping scanline");
    out.clear();
}

fn collect_crossings(edges: &IntervalTree<Segment>, x: f64, out: &mut Crossings) {
    out.clear();
    edges.for_each_intersecting(x, |segment| out.push(segment.z_at(x)));
}

/// Emit weight 1 for every block inside the polygon
pub(super) fn rasterize_fill(
    edges: &IntervalTree<Segment>,
    chunk: ChunkPos,
    f: &mut dyn FnMut(usize, usize, i32),
) {
    let (ox, oz) = chunk.origin();
    let size = TILE_SIZE as i64;
    let mut scratch = Crossings::new();

    for lx in 0..TILE_SIZE {
        let x = (ox + lx as i64) as f64 + 0.5;
        crossings(edges, x, &mut scratch);
        for pair in scratch.chunks_exact(2) {
            // Blocks with center z + 0.5 in [pair[0], pair[1])
            let start = ((pair[0] - 0.5).ceil() as i64 - oz).max(0);
            let end = ((pair[1] - 0.5).ceil() as i64 - oz).min(size);
            for lz in start..end {
                f(lx, lz as usize, 1);
            }
        }
    }
}

/// Emit the clamped signed distance to the boundary for every block of the tile.
///
/// Outside blocks report `floor(d)` and inside blocks `-(floor(d) + 1)`, where
/// `d` is the distance from the block center, both clamped to `±max_dist`.
///
/// Each scanline of the tile plus a `max_dist` halo on both sides yields an
/// inside flag and the exact distance along z to the nearest crossing. A block's
/// distance is then the minimum over columns `dx` within the halo of
/// `hypot(dx, dz)` for columns on the same side, or `|dx| - 0.5` for columns on
/// the other side of the boundary.
pub(super) fn rasterize_distance(
    edges: &IntervalTree<Segment>,
    max_dist: i32,
    chunk: ChunkPos,
    f: &mut dyn FnMut(usize, usize, i32),
) {
    let (ox, oz) = chunk.origin();
    let halo = max_dist.max(0) as usize;
    let limit = halo as f64;
    let columns = TILE_SIZE + 2 * halo;

    // Column-major: entry `col * TILE_SIZE + lz`
    let mut inside = vec![false; columns * TILE_SIZE];
    let mut along = vec![f64::INFINITY; columns * TILE_SIZE];
    let mut scratch = Crossings::new();

    for col in 0..columns {
        let x = (ox - halo as i64 + col as i64) as f64 + 0.5;
        crossings(edges, x, &mut scratch);
        if scratch.is_empty() {
            continue;
        }
        for lz in 0..TILE_SIZE {
            let z = (oz + lz as i64) as f64 + 0.5;
            let below = scratch.partition_point(|c| *c <= z);
            let mut nearest = f64::INFINITY;
            if below > 0 {
                nearest = z - scratch[below - 1];
            }
            if below < scratch.len() {
                nearest = nearest.min(scratch[below] - z);
            }
            inside[col * TILE_SIZE + lz] = below % 2 == 1;
            along[col * TILE_SIZE + lz] = nearest;
        }
    }

    for lx in 0..TILE_SIZE {
        let col = lx + halo;
        for lz in 0..TILE_SIZE {
            let here = inside[col * TILE_SIZE + lz];
            let mut best = along[col * TILE_SIZE + lz];

            for dx in 1..=halo {
                let horizontal = dx as f64;
                if horizontal - 0.5 >= best {
                    break;
                }
                for other in [col - dx, col + dx] {
                    let i = other * TILE_SIZE + lz;
                    let candidate = if inside[i] != here {
                        horizontal - 0.5
                    } else {
                        horizontal.hypot(along[i])
                    };
                    best = best.min(candidate);
                }
            }

            let d = best.floor();
            let weight = if here {
                -(d + 1.0).min(limit)
            } else {
                d.min(limit)
            };
            f(lx, lz, weight as i32);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edges(points: &[(f64, f64)]) -> IntervalTree<Segment> {
        let mut ring: Vec<geo::Coord<f64>> = points.iter().map(|&(x, y)| geo::Coord { x, y }).collect();
        ring.push(ring[0]);
        IntervalTree::new(Segment::from_points(&ring).collect::<Vec<_>>())
    }

    #[test]
    fn test_crossings_sorted() {
        let tree = edges(&[(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0)]);
        let mut out = Crossings::new();
        crossings(&tree, 5.5, &mut out);
        assert_eq!(out.as_slice(), &[0.0, 10.0]);
        crossings(&tree, 10.5, &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn test_vertex_on_scanline_counts_once() {
        // Diamond whose left vertex sits exactly on the sample line x = 0.5
        let tree = edges(&[(0.5, 5.0), (5.0, 0.0), (9.5, 5.0), (5.0, 10.0)]);
        let mut out = Crossings::new();
        crossings(&tree, 0.5, &mut out);
        assert_eq!(out.as_slice(), &[5.0, 5.0]);
        crossings(&tree, 9.5, &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn test_odd_crossings_dropped() {
        // An open chain can never pair up, jitter or not
        let tree = IntervalTree::new(vec![Segment::new(0.0, 0.0, 10.0, 3.0)]);
        let mut out = Crossings::new();
        crossings(&tree, 5.0, &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn test_distance_zero_radius() {
        let tree = edges(&[(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0)]);
        let mut draws = Vec::new();
        rasterize_distance(&tree, 0, ChunkPos::new(0, 0), &mut |x, z, w| draws.push((x, z, w)));
        assert_eq!(draws.len(), 256);
        assert!(draws.iter().all(|d| d.2 == 0));
    }
}
