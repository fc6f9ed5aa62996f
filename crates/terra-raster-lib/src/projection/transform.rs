//! Composable planar transforms wrapping another projection
//!
//! Each transform maps the delegate's planar output through an invertible affine
//! step (or a clamp), so domain errors surface from the delegate unchanged.

use super::{GeographicProjection, OutOfProjectionBounds};
use geo::{Coord, Rect};

/// Build the envelope of a rectangle after mapping both corners through `f`
fn map_rect(rect: Rect<f64>, f: impl Fn(f64, f64) -> (f64, f64)) -> Rect<f64> {
    let a = f(rect.min().x, rect.min().y);
    let b = f(rect.max().x, rect.max().y);
    Rect::new(Coord { x: a.0, y: a.1 }, Coord { x: b.0, y: b.1 })
}

/// Mirrors the x axis (`x → -x`)
#[derive(Debug, Clone)]
pub struct FlipHorizontal<P> {
    delegate: P,
}

impl<P: GeographicProjection> FlipHorizontal<P> {
    pub fn new(delegate: P) -> Self {
        Self { delegate }
    }
}

impl<P: GeographicProjection> GeographicProjection for FlipHorizontal<P> {
    fn to_geo(&self, x: f64, y: f64) -> Result<(f64, f64), OutOfProjectionBounds> {
        self.delegate.to_geo(-x, y)
    }

    fn from_geo(&self, lon: f64, lat: f64) -> Result<(f64, f64), OutOfProjectionBounds> {
        let (x, y) = self.delegate.from_geo(lon, lat)?;
        Ok((-x, y))
    }

    fn meters_per_unit(&self) -> f64 {
        self.delegate.meters_per_unit()
    }

    fn bounds_geo(&self) -> Rect<f64> {
        self.delegate.bounds_geo()
    }

    fn bounds(&self) -> Result<Rect<f64>, OutOfProjectionBounds> {
        Ok(map_rect(self.delegate.bounds()?, |x, y| (-x, y)))
    }
}

/// Mirrors the y axis (`y → -y`)
#[derive(Debug, Clone)]
pub struct FlipVertical<P> {
    delegate: P,
}

impl<P: GeographicProjection> FlipVertical<P> {
    pub fn new(delegate: P) -> Self {
        Self { delegate }
    }
}

impl<P: GeographicProjection> GeographicProjection for FlipVertical<P> {
    fn to_geo(&self, x: f64, y: f64) -> Result<(f64, f64), OutOfProjectionBounds> {
        self.delegate.to_geo(x, -y)
    }

    fn from_geo(&self, lon: f64, lat: f64) -> Result<(f64, f64), OutOfProjectionBounds> {
        let (x, y) = self.delegate.from_geo(lon, lat)?;
        Ok((x, -y))
    }

    fn meters_per_unit(&self) -> f64 {
        self.delegate.meters_per_unit()
    }

    fn bounds_geo(&self) -> Rect<f64> {
        self.delegate.bounds_geo()
    }

    fn bounds(&self) -> Result<Rect<f64>, OutOfProjectionBounds> {
        Ok(map_rect(self.delegate.bounds()?, |x, y| (x, -y)))
    }
}

/// Exchanges the x and y axes
#[derive(Debug, Clone)]
pub struct SwapAxes<P> {
    delegate: P,
}

impl<P: GeographicProjection> SwapAxes<P> {
    pub fn new(delegate: P) -> Self {
        Self { delegate }
    }
}

impl<P: GeographicProjection> GeographicProjection for SwapAxes<P> {
    fn to_geo(&self, x: f64, y: f64) -> Result<(f64, f64), OutOfProjectionBounds> {
        self.delegate.to_geo(y, x)
    }

    fn from_geo(&self, lon: f64, lat: f64) -> Result<(f64, f64), OutOfProjectionBounds> {
        let (x, y) = self.delegate.from_geo(lon, lat)?;
        Ok((y, x))
    }

    fn meters_per_unit(&self) -> f64 {
        self.delegate.meters_per_unit()
    }

    fn bounds_geo(&self) -> Rect<f64> {
        self.delegate.bounds_geo()
    }

    fn bounds(&self) -> Result<Rect<f64>, OutOfProjectionBounds> {
        Ok(map_rect(self.delegate.bounds()?, |x, y| (y, x)))
    }
}

/// Multiplies planar coordinates by per-axis factors
#[derive(Debug, Clone)]
pub struct Scale<P> {
    delegate: P,
    x: f64,
    y: f64,
}

impl<P: GeographicProjection> Scale<P> {
    /// Returns `None` if either factor is zero or not finite
    pub fn new(delegate: P, x: f64, y: f64) -> Option<Self> {
        let valid = |f: f64| f.is_finite() && f != 0.0;
        (valid(x) && valid(y)).then_some(Self { delegate, x, y })
    }
}

impl<P: GeographicProjection> GeographicProjection for Scale<P> {
    fn to_geo(&self, x: f64, y: f64) -> Result<(f64, f64), OutOfProjectionBounds> {
        self.delegate.to_geo(x / self.x, y / self.y)
    }

    fn from_geo(&self, lon: f64, lat: f64) -> Result<(f64, f64), OutOfProjectionBounds> {
        let (x, y) = self.delegate.from_geo(lon, lat)?;
        Ok((x * self.x, y * self.y))
    }

    fn meters_per_unit(&self) -> f64 {
        self.delegate.meters_per_unit() / ((self.x * self.x + self.y * self.y) / 2.0).sqrt()
    }

    fn bounds_geo(&self) -> Rect<f64> {
        self.delegate.bounds_geo()
    }

    fn bounds(&self) -> Result<Rect<f64>, OutOfProjectionBounds> {
        Ok(map_rect(self.delegate.bounds()?, |x, y| {
            (x * self.x, y * self.y)
        }))
    }
}

/// Translates planar coordinates
#[derive(Debug, Clone)]
pub struct Offset<P> {
    delegate: P,
    dx: f64,
    dy: f64,
}

impl<P: GeographicProjection> Offset<P> {
    pub fn new(delegate: P, dx: f64, dy: f64) -> Self {
        Self { delegate, dx, dy }
    }
}

impl<P: GeographicProjection> GeographicProjection for Offset<P> {
    fn to_geo(&self, x: f64, y: f64) -> Result<(f64, f64), OutOfProjectionBounds> {
        self.delegate.to_geo(x - self.dx, y - self.dy)
    }

    fn from_geo(&self, lon: f64, lat: f64) -> Result<(f64, f64), OutOfProjectionBounds> {
        let (x, y) = self.delegate.from_geo(lon, lat)?;
        Ok((x + self.dx, y + self.dy))
    }

    fn meters_per_unit(&self) -> f64 {
        self.delegate.meters_per_unit()
    }

    fn bounds_geo(&self) -> Rect<f64> {
        self.delegate.bounds_geo()
    }

    fn bounds(&self) -> Result<Rect<f64>, OutOfProjectionBounds> {
        Ok(map_rect(self.delegate.bounds()?, |x, y| {
            (x + self.dx, y + self.dy)
        }))
    }
}

/// Clamps planar coordinates to a rectangle in both directions.
///
/// Inside the rectangle this is the identity, so the round-trip contract holds
/// there; outside it points are pulled onto the edge before delegation.
#[derive(Debug, Clone)]
pub struct Clamp<P> {
    delegate: P,
    min_x: f64,
    max_x: f64,
    min_y: f64,
    max_y: f64,
}

impl<P: GeographicProjection> Clamp<P> {
    /// Returns `None` if the rectangle is empty
    pub fn new(delegate: P, min_x: f64, max_x: f64, min_y: f64, max_y: f64) -> Option<Self> {
        (min_x <= max_x && min_y <= max_y).then_some(Self {
            delegate,
            min_x,
            max_x,
            min_y,
            max_y,
        })
    }

    #[inline]
    fn clamp(&self, x: f64, y: f64) -> (f64, f64) {
        (
            x.clamp(self.min_x, self.max_x),
            y.clamp(self.min_y, self.max_y),
        )
    }
}

impl<P: GeographicProjection> GeographicProjection for Clamp<P> {
    fn to_geo(&self, x: f64, y: f64) -> Result<(f64, f64), OutOfProjectionBounds> {
        let (x, y) = self.clamp(x, y);
        self.delegate.to_geo(x, y)
    }

    fn from_geo(&self, lon: f64, lat: f64) -> Result<(f64, f64), OutOfProjectionBounds> {
        let (x, y) = self.delegate.from_geo(lon, lat)?;
        Ok(self.clamp(x, y))
    }

    fn meters_per_unit(&self) -> f64 {
        self.delegate.meters_per_unit()
    }

    fn bounds_geo(&self) -> Rect<f64> {
        self.delegate.bounds_geo()
    }

    fn bounds(&self) -> Result<Rect<f64>, OutOfProjectionBounds> {
        Ok(map_rect(self.delegate.bounds()?, |x, y| self.clamp(x, y)))
    }
}
