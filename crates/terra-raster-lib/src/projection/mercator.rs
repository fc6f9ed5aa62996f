//! Mercator family projections

use super::{EARTH_CIRCUMFERENCE, EARTH_RADIUS, GeographicProjection, OutOfProjectionBounds};
use geo::{Coord, Rect};
use std::f64::consts::{FRAC_PI_2, FRAC_PI_4, PI};

/// Latitude at which the Web Mercator square map ends, `2·atan(e^π) − π/2` in degrees
pub const LIMIT_LATITUDE: f64 = 85.051_128_779_806_59;

/// Pixel size of one tile at zoom level 0
const TILE_PIXELS: f64 = 256.0;

#[inline(always)]
fn mercator_y(lat: f64) -> f64 {
    (FRAC_PI_4 + lat.to_radians() / 2.0).tan().ln()
}

#[inline(always)]
fn inverse_mercator_y(y: f64) -> f64 {
    y.sinh().atan().to_degrees()
}

#[inline]
fn check_mercator_domain(lon: f64, lat: f64) -> Result<(), OutOfProjectionBounds> {
    OutOfProjectionBounds::check_in_range(lon, lat, 180.0, LIMIT_LATITUDE)
}

/// Web Mercator in pixel space: the world is a `256·2^zoom` pixel square with the
/// origin in the north-west corner and `y` growing southwards.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WebMercator {
    zoom: u32,
    size: f64,
}

impl WebMercator {
    pub fn new(zoom: u32) -> Self {
        Self {
            zoom,
            size: TILE_PIXELS * (1u64 << zoom.min(40)) as f64,
        }
    }

    pub fn zoom(&self) -> u32 {
        self.zoom
    }

    /// Side length of the whole map in pixels
    pub fn map_size(&self) -> f64 {
        self.size
    }
}

impl Default for WebMercator {
    fn default() -> Self {
        Self::new(0)
    }
}

impl GeographicProjection for WebMercator {
    fn to_geo(&self, x: f64, y: f64) -> Result<(f64, f64), OutOfProjectionBounds> {
        if !(0.0..=self.size).contains(&x) || !(0.0..=self.size).contains(&y) {
            return Err(OutOfProjectionBounds { x, y });
        }
        let lon = x / self.size * 360.0 - 180.0;
        let lat = inverse_mercator_y(PI * (1.0 - 2.0 * y / self.size));
        Ok((lon, lat))
    }

    fn from_geo(&self, lon: f64, lat: f64) -> Result<(f64, f64), OutOfProjectionBounds> {
        check_mercator_domain(lon, lat)?;
        let x = self.size * (lon + 180.0) / 360.0;
        let y = self.size * (1.0 - mercator_y(lat) / PI) / 2.0;
        Ok((x, y))
    }

    fn meters_per_unit(&self) -> f64 {
        EARTH_CIRCUMFERENCE / self.size
    }

    fn bounds_geo(&self) -> Rect<f64> {
        Rect::new(
            Coord {
                x: -180.0,
                y: -LIMIT_LATITUDE,
            },
            Coord {
                x: 180.0,
                y: LIMIT_LATITUDE,
            },
        )
    }

    fn bounds(&self) -> Result<Rect<f64>, OutOfProjectionBounds> {
        Ok(Rect::new(
            Coord { x: 0.0, y: 0.0 },
            Coord {
                x: self.size,
                y: self.size,
            },
        ))
    }
}

/// Mercator normalized to the `[-1, 1]²` square, north up.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CenteredMercator;

impl GeographicProjection for CenteredMercator {
    fn to_geo(&self, x: f64, y: f64) -> Result<(f64, f64), OutOfProjectionBounds> {
        OutOfProjectionBounds::check_in_range(x, y, 1.0, 1.0)?;
        Ok((x * 180.0, inverse_mercator_y(y * PI)))
    }

    fn from_geo(&self, lon: f64, lat: f64) -> Result<(f64, f64), OutOfProjectionBounds> {
        check_mercator_domain(lon, lat)?;
        Ok((lon / 180.0, mercator_y(lat) / PI))
    }

    fn meters_per_unit(&self) -> f64 {
        EARTH_CIRCUMFERENCE / 2.0
    }

    fn bounds_geo(&self) -> Rect<f64> {
        WebMercator::default().bounds_geo()
    }

    fn bounds(&self) -> Result<Rect<f64>, OutOfProjectionBounds> {
        Ok(Rect::new(Coord { x: -1.0, y: -1.0 }, Coord { x: 1.0, y: 1.0 }))
    }
}

/// Spherical transverse Mercator around a central meridian, in meters.
///
/// Valid within 90° of the central meridian; accuracy degrades quickly past a few
/// degrees away from it, which is why zoned variants such as [`Utm`] exist.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TransverseMercator {
    central_meridian: f64,
}

impl TransverseMercator {
    pub fn new(central_meridian: f64) -> Self {
        Self { central_meridian }
    }

    pub fn central_meridian(&self) -> f64 {
        self.central_meridian
    }

    /// Longitude difference from the central meridian, wrapped to `[-180, 180)`
    #[inline]
    fn delta_lon(&self, lon: f64) -> f64 {
        (lon - self.central_meridian + 180.0).rem_euclid(360.0) - 180.0
    }
}

impl GeographicProjection for TransverseMercator {
    fn to_geo(&self, x: f64, y: f64) -> Result<(f64, f64), OutOfProjectionBounds> {
        if !x.is_finite() || !(y.abs() <= EARTH_RADIUS * FRAC_PI_2) {
            return Err(OutOfProjectionBounds { x, y });
        }
        let d = y / EARTH_RADIUS;
        let k = x / EARTH_RADIUS;
        let lat = (d.sin() / k.cosh()).asin().to_degrees();
        let lon = self.central_meridian + k.sinh().atan2(d.cos()).to_degrees();
        let lon = (lon + 180.0).rem_euclid(360.0) - 180.0;
        Ok((lon, lat))
    }

    fn from_geo(&self, lon: f64, lat: f64) -> Result<(f64, f64), OutOfProjectionBounds> {
        OutOfProjectionBounds::check_lon_lat(lon, lat)?;
        let dlon = self.delta_lon(lon);
        if dlon.abs() >= 90.0 {
            return Err(OutOfProjectionBounds { x: lon, y: lat });
        }
        let (phi, lambda) = (lat.to_radians(), dlon.to_radians());
        let b = phi.cos() * lambda.sin();
        let x = EARTH_RADIUS * b.atanh();
        let y = EARTH_RADIUS * phi.tan().atan2(lambda.cos());
        Ok((x, y))
    }

    fn meters_per_unit(&self) -> f64 {
        1.0
    }

    fn bounds_geo(&self) -> Rect<f64> {
        // Keep clear of the singular meridians 90° away
        Rect::new(
            Coord {
                x: self.central_meridian - 89.0,
                y: -90.0,
            },
            Coord {
                x: self.central_meridian + 89.0,
                y: 90.0,
            },
        )
    }
}

/// Universal Transverse Mercator zone on the sphere.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Utm {
    zone: u8,
    north: bool,
    tm: TransverseMercator,
}

impl Utm {
    const SCALE: f64 = 0.9996;
    const FALSE_EASTING: f64 = 500_000.0;
    const FALSE_NORTHING: f64 = 10_000_000.0;

    /// Create a projection for `zone` (1..=60) in the given hemisphere
    pub fn new(zone: u8, north: bool) -> Option<Self> {
        if !(1..=60).contains(&zone) {
            return None;
        }
        let central_meridian = zone as f64 * 6.0 - 183.0;
        Some(Self {
            zone,
            north,
            tm: TransverseMercator::new(central_meridian),
        })
    }

    pub fn zone(&self) -> u8 {
        self.zone
    }

    pub fn north(&self) -> bool {
        self.north
    }

    fn false_northing(&self) -> f64 {
        if self.north { 0.0 } else { Self::FALSE_NORTHING }
    }
}

impl GeographicProjection for Utm {
    fn to_geo(&self, x: f64, y: f64) -> Result<(f64, f64), OutOfProjectionBounds> {
        self.tm
            .to_geo(
                (x - Self::FALSE_EASTING) / Self::SCALE,
                (y - self.false_northing()) / Self::SCALE,
            )
            .map_err(|_| OutOfProjectionBounds { x, y })
    }

    fn from_geo(&self, lon: f64, lat: f64) -> Result<(f64, f64), OutOfProjectionBounds> {
        let (x, y) = self.tm.from_geo(lon, lat)?;
        Ok((
            x * Self::SCALE + Self::FALSE_EASTING,
            y * Self::SCALE + self.false_northing(),
        ))
    }

    fn meters_per_unit(&self) -> f64 {
        1.0
    }

    fn bounds_geo(&self) -> Rect<f64> {
        let cm = self.tm.central_meridian();
        Rect::new(
            Coord {
                x: cm - 3.0,
                y: if self.north { 0.0 } else { -80.0 },
            },
            Coord {
                x: cm + 3.0,
                y: if self.north { 84.0 } else { 0.0 },
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projection::tests::assert_round_trip;

    #[test]
    fn test_limit_latitude_constant() {
        let expected = (2.0 * PI.exp().atan() - FRAC_PI_2).to_degrees();
        assert!((LIMIT_LATITUDE - expected).abs() < 1e-12);
    }

    #[test]
    fn test_web_mercator_origin() {
        let projection = WebMercator::new(0);
        let (x, y) = projection.from_geo(0.0, 0.0).unwrap();
        assert!((x - 128.0).abs() < 1e-9);
        assert!((y - 128.0).abs() < 1e-9);

        let (x, y) = projection.from_geo(-180.0, LIMIT_LATITUDE).unwrap();
        assert!(x.abs() < 1e-9);
        assert!(y.abs() < 1e-6);
    }

    #[test]
    fn test_web_mercator_round_trip() {
        for zoom in [0, 10, 17] {
            assert_round_trip(
                &WebMercator::new(zoom),
                (-180.0, 180.0),
                (-LIMIT_LATITUDE, LIMIT_LATITUDE),
            );
        }
    }

    #[test]
    fn test_web_mercator_domain() {
        let projection = WebMercator::new(3);
        assert!(projection.from_geo(0.0, 85.0511).is_ok());
        assert!(projection.from_geo(0.0, 85.0512).is_err());
        assert!(projection.from_geo(0.0, -85.06).is_err());
        assert!(projection.from_geo(180.5, 0.0).is_err());
        assert!(projection.to_geo(-1.0, 10.0).is_err());
        assert!(projection.to_geo(10.0, projection.map_size() + 1.0).is_err());
        assert!(projection.upright());
    }

    #[test]
    fn test_centered_mercator() {
        assert_round_trip(
            &CenteredMercator,
            (-180.0, 180.0),
            (-LIMIT_LATITUDE, LIMIT_LATITUDE),
        );
        assert!(CenteredMercator.to_geo(1.01, 0.0).is_err());
        assert!(CenteredMercator.to_geo(0.0, -1.01).is_err());
        assert!(!CenteredMercator.upright());

        let (_, y) = CenteredMercator.from_geo(0.0, LIMIT_LATITUDE).unwrap();
        assert!((y - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_transverse_mercator_round_trip() {
        assert_round_trip(&TransverseMercator::new(0.0), (-60.0, 60.0), (-80.0, 80.0));
        assert_round_trip(
            &TransverseMercator::new(170.0),
            (120.0, 180.0),
            (-80.0, 80.0),
        );
    }

    #[test]
    fn test_transverse_mercator_domain() {
        let projection = TransverseMercator::new(0.0);
        assert!(projection.from_geo(90.0, 0.0).is_err());
        assert!(projection.from_geo(-120.0, 10.0).is_err());
        assert!(projection.to_geo(0.0, EARTH_RADIUS * 2.0).is_err());

        // Along the central meridian y is the arc length
        let (x, y) = projection.from_geo(0.0, 45.0).unwrap();
        assert!(x.abs() < 1e-6);
        assert!((y - EARTH_RADIUS * FRAC_PI_4).abs() < 1e-6);
    }

    #[test]
    fn test_utm() {
        assert!(Utm::new(0, true).is_none());
        assert!(Utm::new(61, true).is_none());

        // Zone 31 is centered on 3°E
        let utm = Utm::new(31, true).unwrap();
        let (x, y) = utm.from_geo(3.0, 0.0).unwrap();
        assert!((x - 500_000.0).abs() < 1e-6);
        assert!(y.abs() < 1e-6);
        assert_round_trip(&utm, (0.0, 6.0), (0.0, 84.0));

        let south = Utm::new(31, false).unwrap();
        let (_, y) = south.from_geo(3.0, -10.0).unwrap();
        assert!(y > 0.0 && y < 10_000_000.0);
        assert_round_trip(&south, (0.0, 6.0), (-80.0, 0.0));
    }
}
