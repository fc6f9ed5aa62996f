//! Bounding box helpers shared by the rasterizers and the dataset pipeline

use crate::projection::{GeographicProjection, OutOfProjectionBounds};
use geo::{Coord, Rect};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A quadrilateral given by the images of a planar rectangle's four corners.
///
/// Projections are not affine, so a planar tile maps to a skewed shape in
/// geographic space. Sampling inside it uses bilinear interpolation between the
/// corners, which is exact along the edges and close enough inside one tile.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CornerBoundingBox {
    /// Corners at `(min_x, min_y)`, `(max_x, min_y)`, `(max_x, max_y)`, `(min_x, max_y)`
    pub corners: [Coord<f64>; 4],
}

impl CornerBoundingBox {
    /// Wrap an axis-aligned rectangle without any projection
    pub fn from_rect(rect: Rect<f64>) -> Self {
        let (min, max) = (rect.min(), rect.max());
        Self {
            corners: [
                min,
                Coord { x: max.x, y: min.y },
                max,
                Coord { x: min.x, y: max.y },
            ],
        }
    }

    /// Project the corners of a planar rectangle back to `(lon, lat)`
    pub fn from_planar<P: GeographicProjection + ?Sized>(
        rect: Rect<f64>,
        projection: &P,
    ) -> Result<Self, OutOfProjectionBounds> {
        let mut corners = Self::from_rect(rect).corners;
        for corner in &mut corners {
            let (lon, lat) = projection.to_geo(corner.x, corner.y)?;
            *corner = Coord { x: lon, y: lat };
        }
        Ok(Self { corners })
    }

    /// Bilinear interpolation: `(0, 0)` is the first corner, `(1, 1)` the third
    #[inline]
    pub fn lerp(&self, u: f64, v: f64) -> Coord<f64> {
        let [a, b, c, d] = self.corners;
        let bottom = a + (b - a) * u;
        let top = d + (c - d) * u;
        bottom + (top - bottom) * v
    }

    /// Smallest axis-aligned rectangle containing all corners
    pub fn axis_aligned(&self) -> Rect<f64> {
        let mut min = self.corners[0];
        let mut max = self.corners[0];
        for c in &self.corners[1..] {
            min.x = min.x.min(c.x);
            min.y = min.y.min(c.y);
            max.x = max.x.max(c.x);
            max.y = max.y.max(c.y);
        }
        Rect::new(min, max)
    }
}

/// Grow a rectangle by `amount` on every side
#[inline]
pub fn expand(rect: Rect<f64>, amount: f64) -> Rect<f64> {
    let delta = Coord {
        x: amount,
        y: amount,
    };
    Rect::new(rect.min() - delta, rect.max() + delta)
}

/// Whether two rectangles overlap (touching edges count)
#[inline]
pub fn intersects(a: &Rect<f64>, b: &Rect<f64>) -> bool {
    a.min().x <= b.max().x && a.max().x >= b.min().x && a.min().y <= b.max().y && a.max().y >= b.min().y
}

/// Smallest rectangle containing both
#[inline]
pub fn union(a: &Rect<f64>, b: &Rect<f64>) -> Rect<f64> {
    Rect::new(
        Coord {
            x: a.min().x.min(b.min().x),
            y: a.min().y.min(b.min().y),
        },
        Coord {
            x: a.max().x.max(b.max().x),
            y: a.max().y.max(b.max().y),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projection::{Equirectangular, Scale};

    fn rect(x0: f64, y0: f64, x1: f64, y1: f64) -> Rect<f64> {
        Rect::new(Coord { x: x0, y: y0 }, Coord { x: x1, y: y1 })
    }

    #[test]
    fn test_lerp_corners_and_center() {
        let bb = CornerBoundingBox::from_rect(rect(0.0, 0.0, 10.0, 20.0));
        assert_eq!(bb.lerp(0.0, 0.0), Coord { x: 0.0, y: 0.0 });
        assert_eq!(bb.lerp(1.0, 0.0), Coord { x: 10.0, y: 0.0 });
        assert_eq!(bb.lerp(1.0, 1.0), Coord { x: 10.0, y: 20.0 });
        assert_eq!(bb.lerp(0.5, 0.5), Coord { x: 5.0, y: 10.0 });
    }

    #[test]
    fn test_from_planar_projects_corners() {
        let projection = Scale::new(Equirectangular, 2.0, 2.0).unwrap();
        let bb = CornerBoundingBox::from_planar(rect(-20.0, -10.0, 20.0, 10.0), &projection).unwrap();
        assert_eq!(bb.axis_aligned(), rect(-10.0, -5.0, 10.0, 5.0));

        assert!(CornerBoundingBox::from_planar(rect(0.0, 0.0, 400.0, 1.0), &projection).is_err());
    }

    #[test]
    fn test_rect_helpers() {
        let a = rect(0.0, 0.0, 1.0, 1.0);
        let b = rect(1.0, 1.0, 2.0, 2.0);
        assert!(intersects(&a, &b));
        assert!(!intersects(&a, &rect(1.5, 0.0, 2.0, 1.0)));
        assert_eq!(union(&a, &b), rect(0.0, 0.0, 2.0, 2.0));
        assert_eq!(expand(a, 1.0), rect(-1.0, -1.0, 2.0, 2.0));
    }
}
