//! Straight edges of projected lines and polygon rings

use crate::bvh::Bounded;
use crate::interval_tree::Interval;
use geo::{Coord, Rect};

/// One edge from `(x0, z0)` to `(x1, z1)` in block coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub x0: f64,
    pub z0: f64,
    pub x1: f64,
    pub z1: f64,
}

impl Segment {
    pub fn new(x0: f64, z0: f64, x1: f64, z1: f64) -> Self {
        Self { x0, z0, x1, z1 }
    }

    /// Build the edges of a polyline, skipping zero-length steps
    pub fn from_points(points: &[Coord<f64>]) -> impl Iterator<Item = Segment> + '_ {
        points
            .windows(2)
            .filter(|w| w[0] != w[1])
            .map(|w| Segment::new(w[0].x, w[0].y, w[1].x, w[1].y))
    }

    /// Z coordinate where the segment crosses the vertical line at `x`.
    ///
    /// Only meaningful when `x` is inside the segment's x extent.
    #[inline]
    pub fn z_at(&self, x: f64) -> f64 {
        let t = (x - self.x0) / (self.x1 - self.x0);
        self.z0 + t * (self.z1 - self.z0)
    }

    /// Euclidean distance from `(x, z)` to the closest point of the segment
    #[inline]
    pub fn distance_to(&self, x: f64, z: f64) -> f64 {
        let dx = self.x1 - self.x0;
        let dz = self.z1 - self.z0;
        let len_sq = dx * dx + dz * dz;
        let r = if len_sq > 0.0 {
            (((x - self.x0) * dx + (z - self.z0) * dz) / len_sq).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let px = self.x0 + r * dx;
        let pz = self.z0 + r * dz;
        (x - px).hypot(z - pz)
    }

    /// Same segment with its endpoints swapped
    pub fn reversed(&self) -> Self {
        Self::new(self.x1, self.z1, self.x0, self.z0)
    }
}

impl Interval for Segment {
    #[inline]
    fn min(&self) -> f64 {
        self.x0.min(self.x1)
    }

    #[inline]
    fn max(&self) -> f64 {
        self.x0.max(self.x1)
    }
}

impl Bounded for Segment {
    fn bounds(&self) -> Rect<f64> {
        Rect::new(
            Coord {
                x: self.x0,
                y: self.z0,
            },
            Coord {
                x: self.x1,
                y: self.z1,
            },
        )
    }
}
