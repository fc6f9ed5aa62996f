//! Geographic projections between longitude/latitude and a local planar system
//!
//! Every projection is a pair of pure functions, `from_geo` and `to_geo`, which are
//! analytic inverses of each other inside the projection's declared domain. Both
//! directions report [`OutOfProjectionBounds`] for inputs past that domain instead of
//! returning garbage, so callers can skip the offending sample or element.
//!
//! Transforms ([`FlipHorizontal`], [`Scale`], [`Offset`], ...) wrap a base projection
//! and keep the round-trip and domain-check contract by delegating to it.

mod mercator;
mod simple;
mod transform;

pub use mercator::{CenteredMercator, LIMIT_LATITUDE, TransverseMercator, Utm, WebMercator};
pub use simple::{Equirectangular, Sinusoidal};
pub use transform::{Clamp, FlipHorizontal, FlipVertical, Offset, Scale, SwapAxes};

use geo::{Coord, Rect};
use std::fmt;
use std::sync::Arc;

/// Equatorial circumference of the Earth in meters
pub const EARTH_CIRCUMFERENCE: f64 = 40_075_017.0;

/// Equatorial radius of the Earth in meters
pub const EARTH_RADIUS: f64 = 6_378_137.0;

/// A point fell outside the domain of a projection
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
#[error("point ({x}, {y}) is outside the projection domain")]
pub struct OutOfProjectionBounds {
    pub x: f64,
    pub y: f64,
}

impl OutOfProjectionBounds {
    /// Fail unless `|x| <= max_x` and `|y| <= max_y` (NaN always fails)
    #[inline]
    pub fn check_in_range(x: f64, y: f64, max_x: f64, max_y: f64) -> Result<(), Self> {
        if x.abs() <= max_x && y.abs() <= max_y {
            Ok(())
        } else {
            Err(Self { x, y })
        }
    }

    /// Fail unless the coordinates are a valid longitude/latitude pair
    #[inline]
    pub fn check_lon_lat(lon: f64, lat: f64) -> Result<(), Self> {
        Self::check_in_range(lon, lat, 180.0, 90.0)
    }
}

/// A reversible mapping between geographic and planar coordinates.
///
/// Implementations are stateless apart from fixed parameters and may be shared
/// freely between threads.
pub trait GeographicProjection: Send + Sync + fmt::Debug {
    /// Convert planar `(x, y)` to `(longitude, latitude)` in degrees
    fn to_geo(&self, x: f64, y: f64) -> Result<(f64, f64), OutOfProjectionBounds>;

    /// Convert `(longitude, latitude)` in degrees to planar `(x, y)`
    fn from_geo(&self, lon: f64, lat: f64) -> Result<(f64, f64), OutOfProjectionBounds>;

    /// Approximate number of meters covered by one planar unit
    fn meters_per_unit(&self) -> f64;

    /// Geographic area covered by the projection, as `(lon, lat)` corners
    fn bounds_geo(&self) -> Rect<f64> {
        Rect::new(Coord { x: -180.0, y: -90.0 }, Coord { x: 180.0, y: 90.0 })
    }

    /// Planar area covered by the projection
    fn bounds(&self) -> Result<Rect<f64>, OutOfProjectionBounds> {
        let geo = self.bounds_geo();
        let a = self.from_geo(geo.min().x, geo.min().y)?;
        let b = self.from_geo(geo.max().x, geo.max().y)?;
        Ok(Rect::new(Coord { x: a.0, y: a.1 }, Coord { x: b.0, y: b.1 }))
    }

    /// Whether north maps to smaller `y` values
    fn upright(&self) -> bool {
        let geo = self.bounds_geo();
        match (
            self.from_geo(0.0, geo.max().y),
            self.from_geo(0.0, geo.min().y),
        ) {
            (Ok(north), Ok(south)) => north.1 <= south.1,
            _ => false,
        }
    }
}

impl<P: GeographicProjection + ?Sized> GeographicProjection for Box<P> {
    fn to_geo(&self, x: f64, y: f64) -> Result<(f64, f64), OutOfProjectionBounds> {
        (**self).to_geo(x, y)
    }

    fn from_geo(&self, lon: f64, lat: f64) -> Result<(f64, f64), OutOfProjectionBounds> {
        (**self).from_geo(lon, lat)
    }

    fn meters_per_unit(&self) -> f64 {
        (**self).meters_per_unit()
    }

    fn bounds_geo(&self) -> Rect<f64> {
        (**self).bounds_geo()
    }

    fn bounds(&self) -> Result<Rect<f64>, OutOfProjectionBounds> {
        (**self).bounds()
    }

    fn upright(&self) -> bool {
        (**self).upright()
    }
}

impl<P: GeographicProjection + ?Sized> GeographicProjection for Arc<P> {
    fn to_geo(&self, x: f64, y: f64) -> Result<(f64, f64), OutOfProjectionBounds> {
        (**self).to_geo(x, y)
    }

    fn from_geo(&self, lon: f64, lat: f64) -> Result<(f64, f64), OutOfProjectionBounds> {
        (**self).from_geo(lon, lat)
    }

    fn meters_per_unit(&self) -> f64 {
        (**self).meters_per_unit()
    }

    fn bounds_geo(&self) -> Rect<f64> {
        (**self).bounds_geo()
    }

    fn bounds(&self) -> Result<Rect<f64>, OutOfProjectionBounds> {
        (**self).bounds()
    }

    fn upright(&self) -> bool {
        (**self).upright()
    }
}
