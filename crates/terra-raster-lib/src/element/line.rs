//! Line rasterization with a radius around each segment

use super::{ChunkPos, TILE_SIZE};
use crate::bounds;
use crate::bvh::{Bounded, Bvh};
use crate::segment::Segment;

/// Emit `floor(radius - distance)` for every block center within `radius` of a
/// segment. A block near several segments receives the largest weight, once.
pub(super) fn rasterize(
    segments: &Bvh<Segment>,
    radius: f64,
    chunk: ChunkPos,
    f: &mut dyn FnMut(usize, usize, i32),
) {
    let (ox, oz) = chunk.origin();
    let last = TILE_SIZE as i64 - 1;
    // Local block index of `v`, clamped before the integer cast
    let local = |v: f64, origin: i64| (v - origin as f64).clamp(-1.0, TILE_SIZE as f64) as i64;
    let area = bounds::expand(chunk.bounds(), radius);
    let mut weights = [None::<i32>; TILE_SIZE * TILE_SIZE];

    segments.for_each_in(&area, |segment| {
        let b = bounds::expand(segment.bounds(), radius);
        // Blocks whose center falls inside the padded segment box
        let x0 = local((b.min().x - 0.5).ceil(), ox).max(0);
        let x1 = local((b.max().x - 0.5).floor(), ox).min(last);
        let z0 = local((b.min().y - 0.5).ceil(), oz).max(0);
        let z1 = local((b.max().y - 0.5).floor(), oz).min(last);

        for lx in x0..=x1 {
            let cx = (ox + lx) as f64 + 0.5;
            for lz in z0..=z1 {
                let cz = (oz + lz) as f64 + 0.5;
                let distance = segment.distance_to(cx, cz);
                if distance > radius {
                    continue;
                }
                let weight = (radius - distance).floor() as i32;
                let slot = &mut weights[lz as usize * TILE_SIZE + lx as usize];
                *slot = Some(slot.map_or(weight, |w| w.max(weight)));
            }
        }
    });

    for (i, weight) in weights.iter().enumerate() {
        if let Some(weight) = weight {
            f(i % TILE_SIZE, i / TILE_SIZE, *weight);
        }
    }
}
