//! Asynchronous tiled datasets
//!
//! A dataset splits a planar projection into square tiles addressed by
//! [`TilePos`]. Each tile is fetched from a list of candidate URLs, decoded off
//! the async executor, and memoized in a [`TileCache`] so that concurrent
//! requests for one key share a single fetch. Region queries compute the
//! covering tiles, wait for all of them, then combine the results.
//!
//! - [`ScalarDataset`]: raster tiles sampled through a [`BlendMode`](crate::BlendMode)
//! - [`GeometryDataset`]: newline-delimited GeoJSON tiles whose reference
//!   objects are resolved recursively

pub mod cache;
pub mod geometry;
pub mod http;
pub mod scalar;

pub use cache::{CacheStats, TileCache};
pub use geometry::{
    GeoObject, GeometryDataset, GeometryDatasetConfig, RawGeometryDataset,
    ReferenceResolvingDataset,
};
pub use http::{HttpClient, ReqwestClient, fetch_with_fallback};
pub use scalar::{MultiScalarDataset, ScalarDataset, ScalarDatasetConfig, ScalarFormat};

use crate::bounds::CornerBoundingBox;
use crate::projection::{GeographicProjection, OutOfProjectionBounds};
use geo::{Coord, Rect};
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Key of one dataset tile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TilePos {
    pub x: i32,
    pub z: i32,
    pub zoom: i32,
}

impl TilePos {
    pub fn new(x: i32, z: i32, zoom: i32) -> Self {
        Self { x, z, zoom }
    }
}

impl fmt::Display for TilePos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.zoom, self.x, self.z)
    }
}

/// Errors from fetching, decoding and resolving dataset tiles.
///
/// Cloneable because every waiter on a shared tile future receives a copy.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DatasetError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("reference cycle through '{0}'")]
    ReferenceCycle(String),

    #[error("reference chain deeper than {0}")]
    ReferenceDepth(usize),

    #[error("invalid dataset configuration: {0}")]
    Config(String),

    #[error("task failed: {0}")]
    Task(String),

    #[error(transparent)]
    OutOfBounds(#[from] OutOfProjectionBounds),
}

/// Square tiling of a planar coordinate system
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TileGrid {
    /// Side of one tile in planar units
    pub tile_size: f64,
    /// Samples along one side of a tile
    pub resolution: usize,
    /// Zoom component of every key in this grid
    pub zoom: i32,
}

impl TileGrid {
    pub fn new(tile_size: f64, resolution: usize, zoom: i32) -> Result<Self, DatasetError> {
        if !(tile_size > 0.0 && tile_size.is_finite()) {
            return Err(DatasetError::Config(format!("tile size must be positive, got {tile_size}")));
        }
        if resolution == 0 {
            return Err(DatasetError::Config("resolution must be at least 1".into()));
        }
        Ok(Self {
            tile_size,
            resolution,
            zoom,
        })
    }

    /// Planar size of one sample
    #[inline]
    pub fn sample_size(&self) -> f64 {
        self.tile_size / self.resolution as f64
    }

    pub fn tile_containing(&self, x: f64, y: f64) -> TilePos {
        TilePos::new(
            (x / self.tile_size).floor() as i32,
            (y / self.tile_size).floor() as i32,
            self.zoom,
        )
    }

    pub fn tile_bounds(&self, pos: TilePos) -> Rect<f64> {
        let s = self.tile_size;
        Rect::new(
            Coord {
                x: pos.x as f64 * s,
                y: pos.z as f64 * s,
            },
            Coord {
                x: (pos.x as f64 + 1.0) * s,
                y: (pos.z as f64 + 1.0) * s,
            },
        )
    }

    /// Keys of every tile overlapping `area`, row by row
    pub fn tiles_covering(&self, area: &Rect<f64>) -> Vec<TilePos> {
        let min = self.tile_containing(area.min().x, area.min().y);
        let max = self.tile_containing(area.max().x, area.max().y);
        // A max edge lying exactly on a tile boundary does not reach into the next tile
        let last = |lo: i32, hi: i32, edge: f64| {
            if hi > lo && edge == hi as f64 * self.tile_size {
                hi - 1
            } else {
                hi
            }
        };
        let max_x = last(min.x, max.x, area.max().x);
        let max_z = last(min.z, max.z, area.max().y);

        (min.z..=max_z)
            .flat_map(|z| (min.x..=max_x).map(move |x| TilePos::new(x, z, self.zoom)))
            .collect()
    }
}

/// URL with `{x}`, `{z}` (or `{y}`), `{zoom}`, `{lon.min}`, `{lon.max}`,
/// `{lat.min}` and `{lat.max}` placeholders
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct UrlTemplate(pub String);

impl UrlTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self(template.into())
    }

    /// Whether rendering needs the tile's geographic bounds
    pub fn needs_geo_bounds(&self) -> bool {
        self.0.contains("{lon.") || self.0.contains("{lat.")
    }

    /// Substitute the tile key and, when given, its geographic bounds
    pub fn render(&self, pos: TilePos, geo_bounds: Option<Rect<f64>>) -> String {
        let mut url = self
            .0
            .replace("{x}", &pos.x.to_string())
            .replace("{z}", &pos.z.to_string())
            .replace("{y}", &pos.z.to_string())
            .replace("{zoom}", &pos.zoom.to_string());
        if let Some(b) = geo_bounds {
            url = url
                .replace("{lon.min}", &b.min().x.to_string())
                .replace("{lon.max}", &b.max().x.to_string())
                .replace("{lat.min}", &b.min().y.to_string())
                .replace("{lat.max}", &b.max().y.to_string());
        }
        url
    }

    /// Render every template for one tile, in order
    pub fn render_all<P: GeographicProjection + ?Sized>(
        templates: &[UrlTemplate],
        grid: &TileGrid,
        projection: &P,
        pos: TilePos,
    ) -> Result<Vec<String>, DatasetError> {
        let geo_bounds = if templates.iter().any(UrlTemplate::needs_geo_bounds) {
            let corners = CornerBoundingBox::from_planar(grid.tile_bounds(pos), projection)?;
            Some(corners.axis_aligned())
        } else {
            None
        };
        Ok(templates.iter().map(|t| t.render(pos, geo_bounds)).collect())
    }
}

impl fmt::Display for UrlTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UrlTemplate {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Planar bounding box of a geographic box, or the first corner that fails to project
pub(crate) fn planar_bounds<P: GeographicProjection + ?Sized>(
    geo: &CornerBoundingBox,
    projection: &P,
) -> Result<Rect<f64>, OutOfProjectionBounds> {
    let mut min = Coord {
        x: f64::INFINITY,
        y: f64::INFINITY,
    };
    let mut max = Coord {
        x: f64::NEG_INFINITY,
        y: f64::NEG_INFINITY,
    };
    for corner in geo.corners {
        let (x, y) = projection.from_geo(corner.x, corner.y)?;
        min.x = min.x.min(x);
        min.y = min.y.min(y);
        max.x = max.x.max(x);
        max.y = max.y.max(y);
    }
    Ok(Rect::new(min, max))
}
