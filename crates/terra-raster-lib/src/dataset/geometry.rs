//! Vector datasets of newline-delimited GeoJSON with cross-tile references
//!
//! Each line of a tile is a GeoJSON object or a reference placeholder:
//!
//! ```json
//! {"type":"Feature","id":"way/42","properties":{"highway":"primary"},"geometry":{...}}
//! {"type":"Reference","location":"../objects/1337.json"}
//! ```
//!
//! [`RawGeometryDataset`] fetches and decodes one location at a time.
//! [`ReferenceResolvingDataset`] follows references recursively, resolving them
//! relative to the location that contains them, and [`GeometryDataset`] maps a
//! geographic region onto tile locations.

use super::cache::TileCache;
use super::http::{HttpClient, fetch_with_fallback};
use super::{DatasetError, TileGrid, UrlTemplate, planar_bounds};
use crate::bounds::CornerBoundingBox;
use crate::collection::features_of;
use crate::projection::GeographicProjection;
use futures::FutureExt;
use futures::future::{BoxFuture, try_join_all};
use geojson::{Feature, GeoJson};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Reference chains longer than this fail with [`DatasetError::ReferenceDepth`]
pub const DEFAULT_MAX_REFERENCE_DEPTH: usize = 16;

/// One decoded line of a geometry tile
#[derive(Debug, Clone)]
pub enum GeoObject {
    Feature(Arc<Feature>),
    /// Location of another tile whose objects belong here
    Reference(String),
}

/// Decode newline-delimited GeoJSON. Blank lines are skipped; a feature
/// collection line contributes all of its features.
pub fn parse_objects(data: &[u8]) -> Result<Vec<GeoObject>, DatasetError> {
    let text = std::str::from_utf8(data).map_err(|e| DatasetError::Decode(e.to_string()))?;
    let mut objects = Vec::new();

    for (n, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let line_error = |e: &dyn std::fmt::Display| DatasetError::Decode(format!("line {}: {e}", n + 1));
        let value: Value = serde_json::from_str(line).map_err(|e| line_error(&e))?;

        if value.get("type").and_then(Value::as_str) == Some("Reference") {
            let location = value
                .get("location")
                .and_then(Value::as_str)
                .ok_or_else(|| line_error(&"reference without a location"))?;
            objects.push(GeoObject::Reference(location.to_string()));
        } else {
            let document = GeoJson::from_json_value(value).map_err(|e| line_error(&e))?;
            objects.extend(
                features_of(document)
                    .into_iter()
                    .map(|f| GeoObject::Feature(Arc::new(f))),
            );
        }
    }
    Ok(objects)
}

/// Resolve `reference` against the directory of `base`.
///
/// A leading `/` makes the reference relative to the dataset root instead;
/// `.` and `..` segments are collapsed.
pub fn resolve_location(base: &str, reference: &str) -> String {
    let joined = match reference.strip_prefix('/') {
        Some(rooted) => rooted.to_string(),
        None => match base.rfind('/') {
            Some(i) => format!("{}{reference}", &base[..=i]),
            None => reference.to_string(),
        },
    };

    let mut segments: Vec<&str> = Vec::new();
    for segment in joined.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    segments.join("/")
}

struct RawInner<C> {
    base_urls: Vec<String>,
    client: Arc<C>,
    cache: TileCache<String, Arc<[GeoObject]>>,
}

/// Fetches and decodes geometry tiles by location, without following references
pub struct RawGeometryDataset<C> {
    inner: Arc<RawInner<C>>,
}

impl<C> Clone for RawGeometryDataset<C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<C: HttpClient> RawGeometryDataset<C> {
    /// `base_urls` are alternative roots (primary first) that locations are appended to
    pub fn new(base_urls: Vec<String>, client: Arc<C>) -> Result<Self, DatasetError> {
        if base_urls.is_empty() {
            return Err(DatasetError::Config("geometry dataset needs at least one base URL".into()));
        }
        Ok(Self {
            inner: Arc::new(RawInner {
                base_urls,
                client,
                cache: TileCache::new(),
            }),
        })
    }

    pub fn cache(&self) -> &TileCache<String, Arc<[GeoObject]>> {
        &self.inner.cache
    }

    /// Objects stored at `location`; a location no mirror has is empty
    pub async fn get(&self, location: &str) -> Result<Arc<[GeoObject]>, DatasetError> {
        let inner = self.inner.clone();
        let owned = location.to_string();
        self.inner
            .cache
            .get(owned.clone(), move || async move { inner.fetch(owned).await })
            .await
    }
}

impl<C: HttpClient> RawInner<C> {
    async fn fetch(&self, location: String) -> Result<Arc<[GeoObject]>, DatasetError> {
        let urls: Vec<String> = self
            .base_urls
            .iter()
            .map(|base| format!("{}/{}", base.trim_end_matches('/'), location))
            .collect();
        let Some(bytes) = fetch_with_fallback(&*self.client, &urls).await? else {
            debug!(location = location.as_str(), "geometry tile absent");
            return Ok(Arc::from(Vec::new()));
        };

        let objects = tokio::task::spawn_blocking(move || parse_objects(&bytes))
            .await
            .map_err(|e| DatasetError::Task(e.to_string()))??;
        debug!(location = location.as_str(), objects = objects.len(), "geometry tile decoded");
        Ok(objects.into())
    }
}

/// Follows reference objects until only features remain
pub struct ReferenceResolvingDataset<C> {
    raw: RawGeometryDataset<C>,
    max_depth: usize,
}

impl<C> Clone for ReferenceResolvingDataset<C> {
    fn clone(&self) -> Self {
        Self {
            raw: self.raw.clone(),
            max_depth: self.max_depth,
        }
    }
}

impl<C: HttpClient> ReferenceResolvingDataset<C> {
    pub fn new(raw: RawGeometryDataset<C>, max_depth: usize) -> Self {
        Self { raw, max_depth }
    }

    pub fn raw(&self) -> &RawGeometryDataset<C> {
        &self.raw
    }

    /// Every feature reachable from `location`, direct features first.
    ///
    /// Referenced locations are fetched in parallel. A feature reached through
    /// several paths appears once. Meeting a location already on the current
    /// chain fails with [`DatasetError::ReferenceCycle`].
    pub async fn resolve(&self, location: &str) -> Result<Vec<Arc<Feature>>, DatasetError> {
        let features = self.resolve_chain(location.to_string(), Vec::new()).await?;
        Ok(dedup_features(features))
    }

    fn resolve_chain(
        &self,
        location: String,
        chain: Vec<String>,
    ) -> BoxFuture<'_, Result<Vec<Arc<Feature>>, DatasetError>> {
        async move {
            if chain.contains(&location) {
                return Err(DatasetError::ReferenceCycle(location));
            }
            if chain.len() > self.max_depth {
                return Err(DatasetError::ReferenceDepth(self.max_depth));
            }

            let objects = self.raw.get(&location).await?;
            let mut features = Vec::new();
            let mut references = Vec::new();
            for object in objects.iter() {
                match object {
                    GeoObject::Feature(f) => features.push(f.clone()),
                    GeoObject::Reference(r) => references.push(resolve_location(&location, r)),
                }
            }
            if references.is_empty() {
                return Ok(features);
            }

            debug!(
                location = location.as_str(),
                references = references.len(),
                depth = chain.len(),
                "following references"
            );
            let mut chain = chain;
            chain.push(location);
            let nested = try_join_all(
                references
                    .into_iter()
                    .map(|r| self.resolve_chain(r, chain.clone())),
            )
            .await?;
            features.extend(nested.into_iter().flatten());
            Ok(features)
        }
        .boxed()
    }
}

/// Drop repeated features, keeping the first occurrence.
/// Features decoded from one cached tile share an allocation.
fn dedup_features(features: Vec<Arc<Feature>>) -> Vec<Arc<Feature>> {
    let mut seen = HashSet::with_capacity(features.len());
    features
        .into_iter()
        .filter(|f| seen.insert(Arc::as_ptr(f)))
        .collect()
}

/// Configuration for a [`GeometryDataset`]
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct GeometryDatasetConfig {
    /// Dataset roots, primary first
    pub base_urls: Vec<String>,
    /// Location of one tile below a root. Default: `tile/{x}/{z}.json`
    pub tile_path: UrlTemplate,
    /// Tile side in units of the dataset projection. Default: 0.25
    pub tile_size: f64,
    pub zoom: i32,
    /// Default: 16
    pub max_reference_depth: usize,
}

impl Default for GeometryDatasetConfig {
    fn default() -> Self {
        Self {
            base_urls: Vec::new(),
            tile_path: UrlTemplate::new("tile/{x}/{z}.json"),
            tile_size: 0.25,
            zoom: 0,
            max_reference_depth: DEFAULT_MAX_REFERENCE_DEPTH,
        }
    }
}

/// Tiled geometry dataset queried by geographic region
pub struct GeometryDataset<C> {
    resolver: ReferenceResolvingDataset<C>,
    tile_path: UrlTemplate,
    grid: TileGrid,
    projection: Arc<dyn GeographicProjection>,
}

impl<C: HttpClient> GeometryDataset<C> {
    pub fn new(
        config: GeometryDatasetConfig,
        projection: Arc<dyn GeographicProjection>,
        client: Arc<C>,
    ) -> Result<Self, DatasetError> {
        let grid = TileGrid::new(config.tile_size, 1, config.zoom)?;
        let raw = RawGeometryDataset::new(config.base_urls, client)?;
        info!(
            tile_path = %config.tile_path,
            tile_size = config.tile_size,
            max_reference_depth = config.max_reference_depth,
            "geometry dataset created"
        );

        Ok(Self {
            resolver: ReferenceResolvingDataset::new(raw, config.max_reference_depth),
            tile_path: config.tile_path,
            grid,
            projection,
        })
    }

    pub fn resolver(&self) -> &ReferenceResolvingDataset<C> {
        &self.resolver
    }

    pub fn grid(&self) -> &TileGrid {
        &self.grid
    }

    /// Features of every tile overlapping a geographic region.
    ///
    /// Tiles are resolved concurrently; the query fails if any of them fails.
    pub async fn query(&self, bounds: &CornerBoundingBox) -> Result<Vec<Arc<Feature>>, DatasetError> {
        let planar = planar_bounds(bounds, &*self.projection)?;
        let tiles = self.grid.tiles_covering(&planar);
        let locations = tiles
            .iter()
            .map(|&pos| {
                UrlTemplate::render_all(std::slice::from_ref(&self.tile_path), &self.grid, &*self.projection, pos)
                    .map(|rendered| rendered.into_iter().collect::<String>())
            })
            .collect::<Result<Vec<String>, DatasetError>>()?;

        let per_tile = try_join_all(locations.iter().map(|l| self.resolver.resolve(l))).await?;
        let features = dedup_features(per_tile.into_iter().flatten().collect());
        debug!(tiles = tiles.len(), features = features.len(), "geometry query resolved");
        Ok(features)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::http::tests::MockHttpClient;
    use crate::projection::Equirectangular;
    use geo::{Coord, Rect};

    fn feature(id: &str) -> String {
        format!(
            r#"{{"type":"Feature","id":"{id}","properties":{{}},"geometry":{{"type":"Point","coordinates":[0.5,0.5]}}}}"#
        )
    }

    fn reference(location: &str) -> String {
        format!(r#"{{"type":"Reference","location":"{location}"}}"#)
    }

    fn ids(features: &[Arc<Feature>]) -> Vec<String> {
        features.iter().map(|f| crate::mapper::feature_id(f)).collect()
    }

    fn resolver(mock: MockHttpClient, max_depth: usize) -> (Arc<MockHttpClient>, ReferenceResolvingDataset<MockHttpClient>) {
        let client = Arc::new(mock);
        let raw = RawGeometryDataset::new(vec!["mem://osm/".into()], client.clone()).unwrap();
        (client, ReferenceResolvingDataset::new(raw, max_depth))
    }

    #[test]
    fn test_parse_objects() {
        let collection = r#"{"type":"FeatureCollection","features":[]}"#;
        let text = format!("{}\n\n{}\n  {}\n", feature("a"), reference("b.json"), collection);
        let objects = parse_objects(text.as_bytes()).unwrap();
        assert_eq!(objects.len(), 2);
        assert!(matches!(&objects[0], GeoObject::Feature(f) if crate::mapper::feature_id(f) == "a"));
        assert!(matches!(&objects[1], GeoObject::Reference(r) if r == "b.json"));

        let err = parse_objects(format!("{}\n{{oops", feature("a")).as_bytes()).unwrap_err();
        assert!(err.to_string().contains("line 2"));
        assert!(parse_objects(br#"{"type":"Reference"}"#).is_err());
        assert!(parse_objects(&[0xff, 0xfe]).is_err());
    }

    #[test]
    fn test_resolve_location() {
        assert_eq!(resolve_location("tile/3/4.json", "5.json"), "tile/3/5.json");
        assert_eq!(resolve_location("tile/3/4.json", "../../objects/7.json"), "objects/7.json");
        assert_eq!(resolve_location("tile/3/4.json", "/objects/7.json"), "objects/7.json");
        assert_eq!(resolve_location("root.json", "./a/b.json"), "a/b.json");
    }

    #[tokio::test]
    async fn test_resolves_references_transitively() {
        let (_, ds) = resolver(
            MockHttpClient::new()
                .with_body("mem://osm/A", format!("{}\n{}", feature("F1"), reference("B")))
                .with_body("mem://osm/B", feature("F2")),
            DEFAULT_MAX_REFERENCE_DEPTH,
        );
        assert_eq!(ids(&ds.resolve("A").await.unwrap()), vec!["F1", "F2"]);
    }

    #[tokio::test]
    async fn test_missing_reference_is_empty() {
        let (_, ds) = resolver(
            MockHttpClient::new().with_body("mem://osm/A", format!("{}\n{}", feature("F1"), reference("gone"))),
            DEFAULT_MAX_REFERENCE_DEPTH,
        );
        assert_eq!(ids(&ds.resolve("A").await.unwrap()), vec!["F1"]);
        assert!(ds.resolve("nothing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_shared_targets_fetched_once_and_deduplicated() {
        let (client, ds) = resolver(
            MockHttpClient::new()
                .with_body("mem://osm/A", format!("{}\n{}", reference("B"), reference("C")))
                .with_body("mem://osm/B", format!("{}\n{}", feature("FB"), reference("D")))
                .with_body("mem://osm/C", reference("D"))
                .with_body("mem://osm/D", feature("FD")),
            DEFAULT_MAX_REFERENCE_DEPTH,
        );
        assert_eq!(ids(&ds.resolve("A").await.unwrap()), vec!["FB", "FD"]);
        assert_eq!(client.calls(), 4);
    }

    #[tokio::test]
    async fn test_cycle_fails() {
        let (_, ds) = resolver(
            MockHttpClient::new()
                .with_body("mem://osm/A", format!("{}\n{}", feature("F1"), reference("B")))
                .with_body("mem://osm/B", reference("A")),
            DEFAULT_MAX_REFERENCE_DEPTH,
        );
        assert_eq!(ds.resolve("A").await, Err(DatasetError::ReferenceCycle("A".into())));

        let (_, self_ref) = resolver(
            MockHttpClient::new().with_body("mem://osm/S", reference("S")),
            DEFAULT_MAX_REFERENCE_DEPTH,
        );
        assert!(matches!(self_ref.resolve("S").await, Err(DatasetError::ReferenceCycle(_))));
    }

    #[tokio::test]
    async fn test_depth_limit() {
        let chain = (0..5).fold(MockHttpClient::new(), |mock, i| {
            mock.with_body(&format!("mem://osm/{i}"), reference(&(i + 1).to_string()))
        });
        let (_, shallow) = resolver(chain.with_body("mem://osm/5", feature("end")), 2);
        assert_eq!(shallow.resolve("0").await, Err(DatasetError::ReferenceDepth(2)));

        let chain = (0..5).fold(MockHttpClient::new(), |mock, i| {
            mock.with_body(&format!("mem://osm/{i}"), reference(&(i + 1).to_string()))
        });
        let (_, deep) = resolver(chain.with_body("mem://osm/5", feature("end")), 5);
        assert_eq!(ids(&deep.resolve("0").await.unwrap()), vec!["end"]);
    }

    #[tokio::test]
    async fn test_transport_errors_propagate() {
        let (_, ds) = resolver(
            MockHttpClient::new()
                .with_body("mem://osm/A", reference("B"))
                .with("mem://osm/B", Err(DatasetError::Network("reset".into()))),
            DEFAULT_MAX_REFERENCE_DEPTH,
        );
        assert_eq!(ds.resolve("A").await, Err(DatasetError::Network("reset".into())));
    }

    #[tokio::test]
    async fn test_region_query() {
        let client = Arc::new(
            MockHttpClient::new()
                .with_body("mem://osm/tile/0/0.json", format!("{}\n{}", feature("a"), reference("../../shared.json")))
                .with_body("mem://osm/tile/1/0.json", format!("{}\n{}", feature("b"), reference("/shared.json")))
                .with_body("mem://osm/shared.json", feature("s")),
        );
        let config = GeometryDatasetConfig {
            base_urls: vec!["mem://osm".into()],
            tile_size: 1.0,
            ..Default::default()
        };
        let ds = GeometryDataset::new(config, Arc::new(Equirectangular), client.clone()).unwrap();

        let bounds = CornerBoundingBox::from_rect(Rect::new(Coord { x: 0.2, y: 0.2 }, Coord { x: 1.5, y: 0.8 }));
        assert_eq!(ids(&ds.query(&bounds).await.unwrap()), vec!["a", "s", "b"]);
        assert_eq!(client.calls(), 3);

        let outside = CornerBoundingBox::from_rect(Rect::new(Coord { x: 0.0, y: 91.0 }, Coord { x: 1.0, y: 92.0 }));
        assert!(matches!(ds.query(&outside).await, Err(DatasetError::OutOfBounds(_))));
    }
}
