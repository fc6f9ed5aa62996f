//! Projections that keep latitude on the vertical axis

use super::{EARTH_CIRCUMFERENCE, GeographicProjection, OutOfProjectionBounds};
use geo::{Coord, Rect};

/// Plate carrée: `x = lon`, `y = lat`
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Equirectangular;

impl GeographicProjection for Equirectangular {
    #[inline]
    fn to_geo(&self, x: f64, y: f64) -> Result<(f64, f64), OutOfProjectionBounds> {
        OutOfProjectionBounds::check_lon_lat(x, y)?;
        Ok((x, y))
    }

    #[inline]
    fn from_geo(&self, lon: f64, lat: f64) -> Result<(f64, f64), OutOfProjectionBounds> {
        OutOfProjectionBounds::check_lon_lat(lon, lat)?;
        Ok((lon, lat))
    }

    fn meters_per_unit(&self) -> f64 {
        EARTH_CIRCUMFERENCE / 360.0
    }
}

/// Equal-area sinusoidal projection: `x = lon * cos(lat)`, `y = lat`
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Sinusoidal;

impl GeographicProjection for Sinusoidal {
    fn to_geo(&self, x: f64, y: f64) -> Result<(f64, f64), OutOfProjectionBounds> {
        OutOfProjectionBounds::check_in_range(x, y, 180.0, 90.0)?;
        let cos = y.to_radians().cos();
        let lon = if cos.abs() < f64::EPSILON {
            // Both poles collapse to a single point
            if x.abs() > f64::EPSILON {
                return Err(OutOfProjectionBounds { x, y });
            }
            0.0
        } else {
            x / cos
        };
        OutOfProjectionBounds::check_lon_lat(lon, y).map_err(|_| OutOfProjectionBounds { x, y })?;
        Ok((lon, y))
    }

    fn from_geo(&self, lon: f64, lat: f64) -> Result<(f64, f64), OutOfProjectionBounds> {
        OutOfProjectionBounds::check_lon_lat(lon, lat)?;
        Ok((lon * lat.to_radians().cos(), lat))
    }

    fn meters_per_unit(&self) -> f64 {
        EARTH_CIRCUMFERENCE / 360.0
    }

    fn bounds(&self) -> Result<Rect<f64>, OutOfProjectionBounds> {
        // The widest extent is along the equator, not at the corners
        Ok(Rect::new(
            Coord { x: -180.0, y: -90.0 },
            Coord { x: 180.0, y: 90.0 },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projection::tests::assert_round_trip;

    #[test]
    fn test_equirectangular_round_trip() {
        assert_round_trip(&Equirectangular, (-180.0, 180.0), (-90.0, 90.0));
    }

    #[test]
    fn test_equirectangular_domain() {
        assert!(Equirectangular.from_geo(0.0, 90.5).is_err());
        assert!(Equirectangular.to_geo(-180.5, 0.0).is_err());
    }

    #[test]
    fn test_sinusoidal_round_trip() {
        assert_round_trip(&Sinusoidal, (-180.0, 180.0), (-85.0, 85.0));
    }

    #[test]
    fn test_sinusoidal_outside_lens() {
        // At 60° latitude the map is only 90 units wide on each side
        assert!(Sinusoidal.to_geo(100.0, 60.0).is_err());
        assert!(Sinusoidal.to_geo(80.0, 60.0).is_ok());
        assert_eq!(Sinusoidal.to_geo(0.0, 90.0).unwrap(), (0.0, 90.0));
    }

    #[test]
    fn test_sinusoidal_bounds() {
        let bounds = Sinusoidal.bounds().unwrap();
        assert_eq!(bounds.width(), 360.0);
        assert_eq!(bounds.height(), 180.0);
    }
}
