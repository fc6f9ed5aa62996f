//! Raster datasets sampled as continuous scalar fields
//!
//! Tiles hold `resolution × resolution` samples in row-major order. Missing
//! tiles, no-data pixels and failed fetches all read as `NaN`, which the
//! [`BlendMode`] propagates to every sample they influence.

use super::cache::TileCache;
use super::http::{HttpClient, fetch_with_fallback};
use super::{DatasetError, TileGrid, TilePos, UrlTemplate};
use crate::blend::BlendMode;
use crate::bounds::CornerBoundingBox;
use crate::projection::GeographicProjection;
use futures::future::join_all;
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// How tile bytes turn into raw sample values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ScalarFormat {
    /// Mapzen Terrarium elevation PNG: `r * 256 + g + b / 256 - 32768`
    #[default]
    Terrarium,
    /// One channel (0 = red .. 3 = alpha) of an 8-bit RGBA image
    Channel { channel: usize },
    /// Red, green and blue packed as `r << 16 | g << 8 | b`
    PackedRgb,
    /// Single-band grayscale TIFF with integer or float samples
    Tiff,
}

/// Configuration for a [`ScalarDataset`]
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ScalarDatasetConfig {
    /// Candidate URLs per tile, tried in order
    pub urls: Vec<UrlTemplate>,
    pub format: ScalarFormat,
    /// Tile side in units of the dataset projection. Default: 256
    pub tile_size: f64,
    /// Samples per tile side. Default: 256
    pub resolution: usize,
    /// Zoom component of the tile keys
    pub zoom: i32,
    /// Applied as `raw * scale + offset`
    pub scale: f64,
    pub offset: f64,
    /// Raw value meaning "no data"
    pub no_data: Option<f64>,
    pub blend: BlendMode,
}

impl Default for ScalarDatasetConfig {
    fn default() -> Self {
        Self {
            urls: Vec::new(),
            format: ScalarFormat::default(),
            tile_size: 256.0,
            resolution: 256,
            zoom: 0,
            scale: 1.0,
            offset: 0.0,
            no_data: None,
            blend: BlendMode::default(),
        }
    }
}

/// Format-specific decoding plus the value transform, run on a blocking thread
#[derive(Debug, Clone, Copy)]
struct Decoder {
    format: ScalarFormat,
    resolution: usize,
    scale: f64,
    offset: f64,
    no_data: Option<f64>,
}

fn decode_error(e: impl std::fmt::Display) -> DatasetError {
    DatasetError::Decode(e.to_string())
}

impl Decoder {
    fn decode(&self, data: &[u8]) -> Result<Vec<f64>, DatasetError> {
        let raw = match self.format {
            ScalarFormat::Tiff => self.decode_tiff(data)?,
            format => self.decode_image(format, data)?,
        };
        self.transform(raw)
    }

    /// Check the sample count and apply scale, offset and no-data
    fn transform(&self, raw: Vec<f64>) -> Result<Vec<f64>, DatasetError> {
        let expected = self.resolution * self.resolution;
        if raw.len() != expected {
            return Err(DatasetError::Decode(format!(
                "expected {expected} samples, got {}",
                raw.len()
            )));
        }
        Ok(raw
            .into_iter()
            .map(|v| {
                if v.is_nan() || self.no_data == Some(v) {
                    f64::NAN
                } else {
                    v * self.scale + self.offset
                }
            })
            .collect())
    }

    fn check_size(&self, width: usize, height: usize) -> Result<(), DatasetError> {
        if width != self.resolution || height != self.resolution {
            return Err(DatasetError::Decode(format!(
                "tile is {width}x{height}, expected {0}x{0}",
                self.resolution
            )));
        }
        Ok(())
    }

    fn decode_image(&self, format: ScalarFormat, data: &[u8]) -> Result<Vec<f64>, DatasetError> {
        let image = image::load_from_memory(data).map_err(decode_error)?.to_rgba8();
        self.check_size(image.width() as usize, image.height() as usize)?;

        if let ScalarFormat::Channel { channel } = format {
            if channel > 3 {
                return Err(DatasetError::Decode(format!("no channel {channel} in RGBA")));
            }
        }
        // Transparent pixels carry no data
        Ok(image
            .pixels()
            .map(|&image::Rgba([r, g, b, a])| match format {
                _ if a == 0 => f64::NAN,
                ScalarFormat::Terrarium => r as f64 * 256.0 + g as f64 + b as f64 / 256.0 - 32768.0,
                ScalarFormat::Channel { channel } => [r, g, b, a][channel] as f64,
                ScalarFormat::PackedRgb => ((r as u32) << 16 | (g as u32) << 8 | b as u32) as f64,
                ScalarFormat::Tiff => f64::NAN,
            })
            .collect())
    }

    fn decode_tiff(&self, data: &[u8]) -> Result<Vec<f64>, DatasetError> {
        use tiff::decoder::{Decoder as TiffDecoder, DecodingResult};

        let mut decoder = TiffDecoder::new(Cursor::new(data)).map_err(decode_error)?;
        let (width, height) = decoder.dimensions().map_err(decode_error)?;
        self.check_size(width as usize, height as usize)?;
        match decoder.colortype().map_err(decode_error)? {
            tiff::ColorType::Gray(_) => {}
            other => {
                return Err(DatasetError::Decode(format!("unsupported TIFF color type {other:?}")));
            }
        }

        Ok(match decoder.read_image().map_err(decode_error)? {
            DecodingResult::U8(v) => v.into_iter().map(f64::from).collect(),
            DecodingResult::U16(v) => v.into_iter().map(f64::from).collect(),
            DecodingResult::U32(v) => v.into_iter().map(f64::from).collect(),
            DecodingResult::U64(v) => v.into_iter().map(|x| x as f64).collect(),
            DecodingResult::I8(v) => v.into_iter().map(f64::from).collect(),
            DecodingResult::I16(v) => v.into_iter().map(f64::from).collect(),
            DecodingResult::I32(v) => v.into_iter().map(f64::from).collect(),
            DecodingResult::I64(v) => v.into_iter().map(|x| x as f64).collect(),
            DecodingResult::F32(v) => v.into_iter().map(f64::from).collect(),
            DecodingResult::F64(v) => v,
        })
    }
}

type ScalarTile = Option<Arc<[f64]>>;

struct Inner<C> {
    urls: Vec<UrlTemplate>,
    decoder: Decoder,
    grid: TileGrid,
    blend: BlendMode,
    projection: Arc<dyn GeographicProjection>,
    client: Arc<C>,
    cache: TileCache<TilePos, ScalarTile>,
}

/// Tiled raster sampled at arbitrary geographic points
pub struct ScalarDataset<C> {
    inner: Arc<Inner<C>>,
}

impl<C> Clone for ScalarDataset<C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<C: HttpClient> ScalarDataset<C> {
    pub fn new(
        config: ScalarDatasetConfig,
        projection: Arc<dyn GeographicProjection>,
        client: Arc<C>,
    ) -> Result<Self, DatasetError> {
        if config.urls.is_empty() {
            return Err(DatasetError::Config("scalar dataset needs at least one URL".into()));
        }
        if !(config.scale.is_finite() && config.offset.is_finite()) {
            return Err(DatasetError::Config("scale and offset must be finite".into()));
        }
        let grid = TileGrid::new(config.tile_size, config.resolution, config.zoom)?;
        info!(
            urls = config.urls.len(),
            format = ?config.format,
            resolution = config.resolution,
            blend = %config.blend,
            "scalar dataset created"
        );

        Ok(Self {
            inner: Arc::new(Inner {
                urls: config.urls,
                decoder: Decoder {
                    format: config.format,
                    resolution: config.resolution,
                    scale: config.scale,
                    offset: config.offset,
                    no_data: config.no_data,
                },
                grid,
                blend: config.blend,
                projection,
                client,
                cache: TileCache::new(),
            }),
        })
    }

    pub fn grid(&self) -> &TileGrid {
        &self.inner.grid
    }

    pub fn blend(&self) -> BlendMode {
        self.inner.blend
    }

    pub fn cache(&self) -> &TileCache<TilePos, ScalarTile> {
        &self.inner.cache
    }

    /// Decoded samples of one tile, `None` if no candidate URL has it
    pub async fn tile(&self, pos: TilePos) -> Result<ScalarTile, DatasetError> {
        let inner = self.inner.clone();
        self.inner
            .cache
            .get(pos, move || async move { inner.fetch_tile(pos).await })
            .await
    }

    /// Sample the field at one geographic point
    pub async fn get(&self, lon: f64, lat: f64) -> Result<f64, DatasetError> {
        let (x, y) = self.inner.projection.from_geo(lon, lat)?;
        let sample = self.inner.grid.sample_size();
        Ok(self.sample_points(&[Some((x / sample, y / sample))]).await[0])
    }

    /// Sample a `size_x × size_z` grid spread over a geographic quadrilateral.
    ///
    /// Sample `(i, j)` sits at `bounds.lerp((i + 0.5) / size_x, (j + 0.5) / size_z)`;
    /// the result is row-major in `j`. Every tile the samples touch is fetched
    /// concurrently, and sampling starts once all of them have settled.
    pub async fn get_bulk(&self, bounds: &CornerBoundingBox, size_x: usize, size_z: usize) -> Vec<f64> {
        let sample = self.inner.grid.sample_size();
        let projection = &self.inner.projection;
        let points: Vec<Option<(f64, f64)>> = (0..size_z)
            .flat_map(|j| (0..size_x).map(move |i| (i, j)))
            .map(|(i, j)| {
                let u = (i as f64 + 0.5) / size_x as f64;
                let v = (j as f64 + 0.5) / size_z as f64;
                let geo = bounds.lerp(u, v);
                projection
                    .from_geo(geo.x, geo.y)
                    .ok()
                    .map(|(x, y)| (x / sample, y / sample))
            })
            .collect();
        self.sample_points(&points).await
    }

    /// Blend at points given in sample units; `None` points read as NaN
    async fn sample_points(&self, points: &[Option<(f64, f64)>]) -> Vec<f64> {
        let blend = self.inner.blend;
        let res = self.inner.grid.resolution as i64;
        let zoom = self.inner.grid.zoom;

        // Sample index window touched by every point, halo included
        let mut lo = (i64::MAX, i64::MAX);
        let mut hi = (i64::MIN, i64::MIN);
        for &(x, z) in points.iter().flatten() {
            let sx = (x + blend.offset()).floor() as i64;
            let sz = (z + blend.offset()).floor() as i64;
            lo = (lo.0.min(sx), lo.1.min(sz));
            hi = (hi.0.max(sx), hi.1.max(sz));
        }
        if lo.0 > hi.0 {
            return vec![f64::NAN; points.len()];
        }
        let last = blend.size() as i64 - 1;
        let tiles: Vec<TilePos> = (lo.1.div_euclid(res)..=(hi.1 + last).div_euclid(res))
            .flat_map(|tz| {
                (lo.0.div_euclid(res)..=(hi.0 + last).div_euclid(res))
                    .map(move |tx| TilePos::new(tx as i32, tz as i32, zoom))
            })
            .collect();

        // Barrier: every tile settles before any sample is read
        let fetched = join_all(tiles.iter().map(|&pos| async move { (pos, self.tile(pos).await) })).await;
        let mut loaded: HashMap<(i32, i32), Arc<[f64]>> = HashMap::with_capacity(fetched.len());
        for (pos, result) in fetched {
            match result {
                Ok(Some(values)) => {
                    loaded.insert((pos.x, pos.z), values);
                }
                Ok(None) => {}
                Err(e) => warn!(tile = %pos, error = %e, "scalar tile unavailable, sampling as NaN"),
            }
        }
        debug!(tiles = tiles.len(), loaded = loaded.len(), points = points.len(), "sampling scalar tiles");

        points
            .iter()
            .map(|point| {
                let Some((x, z)) = *point else {
                    return f64::NAN;
                };
                blend.sample(x, z, |ix, iz| {
                    let key = (ix.div_euclid(res) as i32, iz.div_euclid(res) as i32);
                    loaded.get(&key).map_or(f64::NAN, |tile| {
                        tile[(iz.rem_euclid(res) * res + ix.rem_euclid(res)) as usize]
                    })
                })
            })
            .collect()
    }
}

impl<C: HttpClient> Inner<C> {
    async fn fetch_tile(&self, pos: TilePos) -> Result<ScalarTile, DatasetError> {
        let urls = match UrlTemplate::render_all(&self.urls, &self.grid, &*self.projection, pos) {
            Ok(urls) => urls,
            Err(DatasetError::OutOfBounds(_)) => return Ok(None),
            Err(e) => return Err(e),
        };
        let Some(bytes) = fetch_with_fallback(&*self.client, &urls).await? else {
            debug!(tile = %pos, "scalar tile absent");
            return Ok(None);
        };

        let decoder = self.decoder;
        let values = tokio::task::spawn_blocking(move || decoder.decode(&bytes))
            .await
            .map_err(|e| DatasetError::Task(e.to_string()))??;
        Ok(Some(values.into()))
    }
}

/// Several scalar sources blended by priority: each NaN left by one source is
/// filled from the next
pub struct MultiScalarDataset<C> {
    sources: Vec<ScalarDataset<C>>,
}

impl<C: HttpClient> MultiScalarDataset<C> {
    /// Sources in priority order, highest first
    pub fn new(sources: Vec<ScalarDataset<C>>) -> Self {
        Self { sources }
    }

    pub fn sources(&self) -> &[ScalarDataset<C>] {
        &self.sources
    }

    pub async fn get(&self, lon: f64, lat: f64) -> f64 {
        for source in &self.sources {
            match source.get(lon, lat).await {
                Ok(v) if !v.is_nan() => return v,
                Ok(_) | Err(DatasetError::OutOfBounds(_)) => {}
                Err(e) => warn!(lon, lat, error = %e, "scalar source failed"),
            }
        }
        f64::NAN
    }

    pub async fn get_bulk(&self, bounds: &CornerBoundingBox, size_x: usize, size_z: usize) -> Vec<f64> {
        let mut out = vec![f64::NAN; size_x * size_z];
        for source in &self.sources {
            if !out.iter().any(|v| v.is_nan()) {
                break;
            }
            let values = source.get_bulk(bounds, size_x, size_z).await;
            for (o, v) in out.iter_mut().zip(values) {
                if o.is_nan() {
                    *o = v;
                }
            }
        }
        out
    }
}
