//! Vector elements and their per-tile rasterization
//!
//! A [`VectorElement`] is one projected feature ready to be drawn: its geometry
//! lives in a spatial index built once at construction, and rasterizing a tile
//! only walks the part of that index overlapping the tile. Coordinates are in
//! block units, so one planar unit is one block column.

mod line;
mod polygon;

use crate::bounds;
use crate::bvh::{Bounded, Bvh};
use crate::draw::{DrawFunction, TileBuilder};
use crate::interval_tree::IntervalTree;
use crate::segment::Segment;
use geo::{Coord, MultiLineString, MultiPolygon, Rect};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::ops::RangeInclusive;
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Side length of a tile in blocks
pub const TILE_SIZE: usize = 16;

/// Largest distance a distance polygon measures, in blocks
pub const MAX_DISTANCE: i32 = 1024;

/// Tile address in block space; tile `(x, z)` covers blocks `x*16 .. x*16+16`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ChunkPos {
    pub x: i32,
    pub z: i32,
}

impl ChunkPos {
    pub fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// Tile containing the block at `(x, z)`
    pub fn containing(x: f64, z: f64) -> Self {
        let size = TILE_SIZE as f64;
        Self::new((x / size).floor() as i32, (z / size).floor() as i32)
    }

    /// Block coordinates of the tile's minimum corner
    #[inline]
    pub fn origin(&self) -> (i64, i64) {
        let size = TILE_SIZE as i64;
        (self.x as i64 * size, self.z as i64 * size)
    }

    /// Planar area covered by the tile
    pub fn bounds(&self) -> Rect<f64> {
        let (x, z) = self.origin();
        let size = TILE_SIZE as f64;
        Rect::new(
            Coord {
                x: x as f64,
                y: z as f64,
            },
            Coord {
                x: x as f64 + size,
                y: z as f64 + size,
            },
        )
    }
}

/// Geometry and index of a rasterizable element
#[derive(Debug, Clone)]
pub enum ElementKind {
    /// Polyline drawn with a fixed radius around every segment
    Line { segments: Bvh<Segment>, radius: f64 },
    /// Even-odd filled polygon
    FillPolygon { edges: IntervalTree<Segment> },
    /// Signed distance to the polygon boundary, clamped to `±max_dist`
    /// (at most [`MAX_DISTANCE`])
    DistancePolygon {
        edges: IntervalTree<Segment>,
        max_dist: i32,
    },
}

impl ElementKind {
    /// Index the segments of a multi-line; `None` if nothing remains to draw
    pub fn line(lines: &MultiLineString<f64>, radius: f64) -> Option<Self> {
        if !(radius >= 0.0 && radius.is_finite()) {
            return None;
        }
        let segments = Bvh::new(
            lines
                .iter()
                .flat_map(|line| Segment::from_points(&line.0))
                .filter(|s| s.x0.is_finite() && s.z0.is_finite() && s.x1.is_finite() && s.z1.is_finite()),
        );
        (!segments.is_empty()).then_some(Self::Line { segments, radius })
    }

    /// Index the boundary of every ring, outer and inner alike
    pub fn fill_polygon(polygons: &MultiPolygon<f64>) -> Option<Self> {
        let edges = polygon_edges(polygons);
        (!edges.is_empty()).then_some(Self::FillPolygon { edges })
    }

    pub fn distance_polygon(polygons: &MultiPolygon<f64>, max_dist: i32) -> Option<Self> {
        let edges = polygon_edges(polygons);
        (!edges.is_empty()).then_some(Self::DistancePolygon {
            edges,
            max_dist: max_dist.clamp(0, MAX_DISTANCE),
        })
    }

    /// Area in which rasterizing can produce draws
    fn bounds(&self) -> Rect<f64> {
        match self {
            Self::Line { segments, radius } => {
                let b = segments.bounds().unwrap_or_else(empty_rect);
                bounds::expand(b, *radius)
            }
            Self::FillPolygon { edges } => edge_bounds(edges),
            Self::DistancePolygon { edges, max_dist } => {
                bounds::expand(edge_bounds(edges), *max_dist as f64)
            }
        }
    }
}

fn empty_rect() -> Rect<f64> {
    Rect::new(Coord::zero(), Coord::zero())
}

fn polygon_edges(polygons: &MultiPolygon<f64>) -> IntervalTree<Segment> {
    IntervalTree::new(
        polygons
            .iter()
            .flat_map(|p| std::iter::once(p.exterior()).chain(p.interiors()))
            .flat_map(|ring| Segment::from_points(&ring.0))
            .filter(|s| s.z0.is_finite() && s.z1.is_finite()),
    )
}

fn edge_bounds(edges: &IntervalTree<Segment>) -> Rect<f64> {
    edges
        .iter()
        .map(Bounded::bounds)
        .reduce(|a, b| bounds::union(&a, &b))
        .unwrap_or_else(empty_rect)
}

/// One drawable feature
#[derive(Debug, Clone)]
pub struct VectorElement {
    pub id: Arc<str>,
    /// Paint order; higher layers draw later
    pub layer: f64,
    pub draw: Arc<DrawFunction>,
    /// Zoom levels at which the element applies, all of them if `None`
    pub levels: Option<RangeInclusive<i32>>,
    kind: ElementKind,
    bounds: Rect<f64>,
}

impl VectorElement {
    pub fn new(id: impl Into<Arc<str>>, layer: f64, draw: Arc<DrawFunction>, kind: ElementKind) -> Self {
        let bounds = kind.bounds();
        Self {
            id: id.into(),
            layer,
            draw,
            levels: None,
            kind,
            bounds,
        }
    }

    pub fn with_levels(mut self, levels: Option<RangeInclusive<i32>>) -> Self {
        self.levels = levels;
        self
    }

    pub fn kind(&self) -> &ElementKind {
        &self.kind
    }

    pub fn is_line(&self) -> bool {
        matches!(self.kind, ElementKind::Line { .. })
    }

    /// Whether the element is drawn at `zoom`
    #[inline]
    pub fn applies_at(&self, zoom: i32) -> bool {
        self.levels.as_ref().is_none_or(|l| l.contains(&zoom))
    }

    /// Compute the weight of every affected block in `chunk` and pass it to `f`
    /// as `(local_x, local_z, weight)`.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn rasterize_with(&self, chunk: ChunkPos, f: &mut dyn FnMut(usize, usize, i32)) {
        if !bounds::intersects(&self.bounds, &chunk.bounds()) {
            return;
        }
        match &self.kind {
            ElementKind::Line { segments, radius } => line::rasterize(segments, *radius, chunk, f),
            ElementKind::FillPolygon { edges } => polygon::rasterize_fill(edges, chunk, f),
            ElementKind::DistancePolygon { edges, max_dist } => {
                polygon::rasterize_distance(edges, *max_dist, chunk, f)
            }
        }
    }

    /// Rasterize into a builder through this element's draw function
    pub fn rasterize(&self, chunk: ChunkPos, builder: &mut dyn TileBuilder) {
        let draw = &self.draw;
        self.rasterize_with(chunk, &mut |x, z, weight| draw.draw(builder, x, z, weight));
    }
}

impl Bounded for VectorElement {
    fn bounds(&self) -> Rect<f64> {
        self.bounds
    }
}

impl PartialEq for VectorElement {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for VectorElement {}

impl PartialOrd for VectorElement {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for VectorElement {
    /// Paint order: by layer, then by id
    fn cmp(&self, other: &Self) -> Ordering {
        self.layer
            .total_cmp(&other.layer)
            .then_with(|| self.id.cmp(&other.id))
    }
}

/// Draw every element overlapping `chunk` into `builder` in paint order.
///
/// Elements sharing an id (one feature seen through several source tiles) are
/// drawn once.
#[cfg_attr(feature = "profiling", profiling::function)]
pub fn rasterize_tile<'a>(
    elements: impl IntoIterator<Item = &'a VectorElement>,
    chunk: ChunkPos,
    builder: &mut dyn TileBuilder,
) {
    let mut ordered: Vec<&VectorElement> = elements.into_iter().collect();
    ordered.sort();
    let mut seen = HashSet::new();
    ordered.retain(|e| seen.insert(e.id.clone()));
    for element in ordered {
        element.rasterize(chunk, builder);
    }
}
