//! ElementCollection - In-memory set of vector elements indexed for tile queries
//!
//! This module maps GeoJSON features into elements in parallel, indexes their
//! bounds, and answers per-tile queries in paint order.

use crate::bvh::{Bounded, Bvh};
use crate::draw::TileBuilder;
use crate::element::{ChunkPos, VectorElement, rasterize_tile};
use crate::mapper::FeatureMapper;
use crate::projection::GeographicProjection;
use crate::{Result, TerraError};

use geo::Rect;
use geojson::{Feature, GeoJson};
use rayon::prelude::*;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

/// Configuration for the element collection
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CollectionConfig {
    /// Below this many features, mapping runs on the calling thread.
    /// Default: 256
    pub parallel_threshold: usize,
    /// Drop all but the first element of each id from query results (default true).
    /// Features split across several source tiles arrive once per tile.
    pub dedup_ids: bool,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            parallel_threshold: 256,
            dedup_ids: true,
        }
    }
}

/// Information about the element collection
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CollectionInfo {
    /// Number of elements indexed
    pub element_count: usize,
    /// Line elements among them
    pub line_count: usize,
    /// Fill and distance polygons among them
    pub polygon_count: usize,
    /// Planar area in which elements can draw (None if empty)
    pub bounds: Option<Rect<f64>>,
}

/// Top-level owner of the elements drawn into tiles
#[derive(Debug, Clone)]
pub struct ElementCollection {
    index: Bvh<Arc<VectorElement>>,
    config: CollectionConfig,
    info: CollectionInfo,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl ElementCollection {
    /// Index already-built elements
    pub fn build(config: CollectionConfig, elements: Vec<VectorElement>) -> Self {
        #[cfg(feature = "profiling")]
        profiling::scope!("collection::build");

        let line_count = elements.iter().filter(|e| e.is_line()).count();
        let index = Bvh::new(elements.into_iter().map(Arc::new));
        let info = CollectionInfo {
            element_count: index.len(),
            line_count,
            polygon_count: index.len() - line_count,
            bounds: index.bounds(),
        };
        tracing::info!(
            elements = info.element_count,
            lines = info.line_count,
            polygons = info.polygon_count,
            "element collection built"
        );

        Self {
            index,
            config,
            info,
        }
    }

    /// Map features to elements in parallel and index the result
    pub fn from_features<F, P>(
        config: CollectionConfig,
        features: &[F],
        mapper: &FeatureMapper,
        projection: &P,
    ) -> Self
    where
        F: Borrow<Feature> + Sync,
        P: GeographicProjection + ?Sized,
    {
        #[cfg(feature = "profiling")]
        profiling::scope!("collection::from_features");

        let elements: Vec<VectorElement> = if features.len() < config.parallel_threshold {
            features
                .iter()
                .flat_map(|f| mapper.map(f.borrow(), projection))
                .collect()
        } else {
            features
                .par_iter()
                .flat_map_iter(|f| mapper.map(f.borrow(), projection))
                .collect()
        };
        tracing::debug!(
            features = features.len(),
            elements = elements.len(),
            "mapped features"
        );

        Self::build(config, elements)
    }

    /// Read GeoJSON files in parallel and map every feature they contain
    pub fn load_geojson_files<P, Q>(
        config: CollectionConfig,
        paths: Vec<Q>,
        mapper: &FeatureMapper,
        projection: &P,
    ) -> Result<Self>
    where
        P: GeographicProjection + ?Sized,
        Q: AsRef<Path> + Send + Sync,
    {
        #[cfg(feature = "profiling")]
        profiling::scope!("collection::load_geojson_files");

        let features: Result<Vec<Vec<Feature>>> = paths
            .into_par_iter()
            .map(|path| {
                let text = std::fs::read_to_string(path.as_ref())?;
                let document = text.parse::<GeoJson>().map_err(|e| {
                    TerraError::InvalidGeometry(format!("{}: {e}", path.as_ref().display()))
                })?;
                Ok(features_of(document))
            })
            .collect();
        let features: Vec<Feature> = features?.into_iter().flatten().collect();

        Ok(Self::from_features(config, &features, mapper, projection))
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn config(&self) -> &CollectionConfig {
        &self.config
    }

    pub fn info(&self) -> CollectionInfo {
        self.info.clone()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<VectorElement>> {
        self.index.iter()
    }

    /// Elements that can draw inside `area` at `zoom`, in paint order
    pub fn query(&self, area: &Rect<f64>, zoom: i32) -> Vec<Arc<VectorElement>> {
        let mut found = Vec::new();
        self.index.for_each_in(area, |element| {
            if element.applies_at(zoom) && crate::bounds::intersects(&element.bounds(), area) {
                found.push(element.clone());
            }
        });
        found.sort();
        if self.config.dedup_ids {
            let mut seen = HashSet::with_capacity(found.len());
            found.retain(|e| seen.insert(e.id.clone()));
        }
        found
    }

    pub fn query_tile(&self, chunk: ChunkPos, zoom: i32) -> Vec<Arc<VectorElement>> {
        self.query(&chunk.bounds(), zoom)
    }

    /// Draw every applicable element into `builder`
    pub fn rasterize(&self, chunk: ChunkPos, zoom: i32, builder: &mut dyn TileBuilder) {
        let elements = self.query_tile(chunk, zoom);
        tracing::trace!(tile = ?chunk, zoom, elements = elements.len(), "rasterizing tile");
        rasterize_tile(elements.iter().map(Arc::as_ref), chunk, builder);
    }
}

/// Features of any GeoJSON document; a bare geometry becomes one feature
pub(crate) fn features_of(document: GeoJson) -> Vec<Feature> {
    match document {
        GeoJson::FeatureCollection(fc) => fc.features,
        GeoJson::Feature(f) => vec![f],
        GeoJson::Geometry(g) => vec![Feature::from(g)],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::draw::{BlockState, DrawFunction, GridBuilder};
    use crate::element::ElementKind;
    use crate::mapper::{PolygonMode, RadiusExpr};
    use crate::projection::Equirectangular;
    use geo::{LineString, MultiLineString, MultiPolygon, coord, polygon};
    use serde_json::json;

    fn square(id: &str, layer: f64, x: f64, z: f64, size: f64) -> VectorElement {
        let poly = polygon![
            (x: x, y: z),
            (x: x + size, y: z),
            (x: x + size, y: z + size),
            (x: x, y: z + size),
        ];
        VectorElement::new(
            id,
            layer,
            Arc::new(DrawFunction::Block(BlockState::new(id))),
            ElementKind::fill_polygon(&MultiPolygon::new(vec![poly])).unwrap(),
        )
    }

    fn road(id: &str, z: f64) -> VectorElement {
        let line = LineString::new(vec![coord! { x: -100.0, y: z }, coord! { x: 100.0, y: z }]);
        VectorElement::new(
            id,
            5.0,
            Arc::new(DrawFunction::Water),
            ElementKind::line(&MultiLineString::new(vec![line]), 1.0).unwrap(),
        )
    }

    #[test]
    fn test_build_and_info() {
        let collection = ElementCollection::build(
            CollectionConfig::default(),
            vec![square("a", 0.0, 0.0, 0.0, 4.0), square("b", 1.0, 40.0, 40.0, 4.0), road("r", 8.0)],
        );
        let info = collection.info();
        assert_eq!(collection.len(), 3);
        assert_eq!(info.element_count, 3);
        assert_eq!(info.line_count, 1);
        assert_eq!(info.polygon_count, 2);
        let bounds = info.bounds.unwrap();
        assert_eq!(bounds.min().x, -101.0);
        assert_eq!(bounds.max().y, 44.0);
    }

    #[test]
    fn test_query_tile_sorted_and_filtered() {
        let collection = ElementCollection::build(
            CollectionConfig::default(),
            vec![
                road("r", 8.0),
                square("b", 1.0, 2.0, 2.0, 4.0),
                square("a", 1.0, 0.0, 0.0, 4.0),
                square("far", 0.0, 40.0, 40.0, 4.0),
                square("z", -1.0, 10.0, 10.0, 2.0).with_levels(Some(3..=5)),
            ],
        );

        let ids = |zoom| -> Vec<String> {
            collection
                .query_tile(ChunkPos::new(0, 0), zoom)
                .iter()
                .map(|e| e.id.to_string())
                .collect()
        };
        assert_eq!(ids(0), vec!["a", "b", "r"]);
        assert_eq!(ids(4), vec!["z", "a", "b", "r"]);
        assert!(collection.query_tile(ChunkPos::new(5, -5), 0).is_empty());
    }

    #[test]
    fn test_duplicate_ids_collapse() {
        let elements = vec![square("dup", 0.0, 0.0, 0.0, 4.0), square("dup", 0.0, 1.0, 1.0, 4.0)];
        let deduped = ElementCollection::build(CollectionConfig::default(), elements.clone());
        assert_eq!(deduped.query_tile(ChunkPos::new(0, 0), 0).len(), 1);

        let config = CollectionConfig {
            dedup_ids: false,
            ..Default::default()
        };
        let all = ElementCollection::build(config, elements);
        assert_eq!(all.query_tile(ChunkPos::new(0, 0), 0).len(), 2);
    }

    #[test]
    fn test_from_features_parallel_matches_sequential() {
        let features: Vec<Feature> = (0..300)
            .map(|i| {
                let x = (i % 30) as f64 * 6.0;
                let z = (i / 30) as f64 * 6.0;
                serde_json::from_value(json!({
                    "type": "Feature",
                    "id": format!("sq{i}"),
                    "properties": { "landuse": "farm" },
                    "geometry": { "type": "Polygon", "coordinates": [[
                        [x, z], [x + 4.0, z], [x + 4.0, z + 4.0], [x, z + 4.0], [x, z]
                    ]] }
                }))
                .unwrap()
            })
            .collect();
        let mapper = FeatureMapper::Polygon {
            draw: Arc::new(DrawFunction::Water),
            layer: 0.0,
            mode: PolygonMode::Fill,
            levels: None,
        };

        let parallel =
            ElementCollection::from_features(CollectionConfig::default(), &features, &mapper, &Equirectangular);
        let sequential = ElementCollection::from_features(
            CollectionConfig {
                parallel_threshold: usize::MAX,
                ..Default::default()
            },
            &features,
            &mapper,
            &Equirectangular,
        );
        assert_eq!(parallel.len(), 300);
        assert_eq!(sequential.len(), 300);

        let tile = ChunkPos::new(1, 1);
        let ids = |c: &ElementCollection| -> Vec<String> {
            c.query_tile(tile, 0).iter().map(|e| e.id.to_string()).collect()
        };
        assert_eq!(ids(&parallel), ids(&sequential));
        assert!(!ids(&parallel).is_empty());
    }

    #[test]
    fn test_rasterize_paints_in_layer_order() {
        let collection = ElementCollection::build(
            CollectionConfig::default(),
            vec![square("top", 2.0, 0.0, 0.0, 4.0), square("bottom", 1.0, 0.0, 0.0, 8.0)],
        );
        let mut builder = GridBuilder::new();
        collection.rasterize(ChunkPos::new(0, 0), 0, &mut builder);
        assert_eq!(builder.block(1, 1).map(|b| b.name()), Some("top"));
        assert_eq!(builder.block(6, 6).map(|b| b.name()), Some("bottom"));
        assert!(builder.block(9, 9).is_none());
    }

    #[test]
    fn test_load_geojson_files() {
        let dir = std::env::temp_dir().join(format!("terra-collection-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let good = dir.join("roads.geojson");
        std::fs::write(
            &good,
            json!({
                "type": "FeatureCollection",
                "features": [{
                    "type": "Feature", "id": 1, "properties": {},
                    "geometry": { "type": "LineString", "coordinates": [[0.0, 4.0], [12.0, 4.0]] }
                }]
            })
            .to_string(),
        )
        .unwrap();
        let bad = dir.join("broken.geojson");
        std::fs::write(&bad, "{ not json").unwrap();

        let mapper = FeatureMapper::Line {
            draw: Arc::new(DrawFunction::Water),
            layer: 0.0,
            radius: RadiusExpr::Constant(2.0),
            levels: None,
        };
        let loaded = ElementCollection::load_geojson_files(
            CollectionConfig::default(),
            vec![&good],
            &mapper,
            &Equirectangular,
        )
        .unwrap();
        assert_eq!(loaded.len(), 1);
        assert!(
            ElementCollection::load_geojson_files(
                CollectionConfig::default(),
                vec![&good, &bad],
                &mapper,
                &Equirectangular,
            )
            .is_err()
        );

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
