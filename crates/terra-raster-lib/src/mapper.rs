//! Turning GeoJSON features into drawable elements
//!
//! A [`FeatureMapper`] tree decides, per feature, which elements to build: leaf
//! mappers project the geometry and wrap it in a line or polygon element, while
//! the combinators select among them by tag.

use crate::draw::DrawFunction;
use crate::element::{ElementKind, VectorElement};
use crate::projection::{GeographicProjection, OutOfProjectionBounds};
use geo::{Coord, Geometry, LineString, MapCoords, MultiLineString, MultiPolygon, Polygon};
use geojson::{Feature, JsonObject, JsonValue};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::ops::RangeInclusive;
use std::sync::Arc;

/// Line radius, evaluated once per element
#[derive(Debug, Clone, PartialEq)]
pub enum RadiusExpr {
    Constant(f64),
    /// `tag * scale + offset`, or `default` when the tag is missing or not numeric
    Tag {
        key: String,
        scale: f64,
        offset: f64,
        default: f64,
    },
}

impl RadiusExpr {
    pub fn evaluate(&self, properties: Option<&JsonObject>) -> f64 {
        match self {
            Self::Constant(r) => *r,
            Self::Tag {
                key,
                scale,
                offset,
                default,
            } => properties
                .and_then(|p| p.get(key))
                .and_then(numeric_value)
                .map_or(*default, |v| v * scale + offset),
        }
    }
}

/// Read a number from a JSON value, accepting strings with a trailing unit ("7.5 m")
fn numeric_value(value: &JsonValue) -> Option<f64> {
    match value {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => {
            let s = s.trim();
            let end = s
                .find(|c: char| !(c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | 'e' | 'E')))
                .unwrap_or(s.len());
            s[..end].parse().ok()
        }
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolygonMode {
    Fill,
    Distance { max_dist: i32 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum FeatureMapper {
    /// Apply every child and keep all of their elements
    All(Vec<FeatureMapper>),
    /// Use the first child that produces anything
    First(Vec<FeatureMapper>),
    /// Apply `then` if the tag `key` exists and, when given, equals `value`
    Match {
        key: String,
        value: Option<String>,
        then: Box<FeatureMapper>,
    },
    /// Draw the feature's lines (and polygon outlines) with a radius
    Line {
        draw: Arc<DrawFunction>,
        layer: f64,
        radius: RadiusExpr,
        levels: Option<RangeInclusive<i32>>,
    },
    /// Draw the feature's polygons
    Polygon {
        draw: Arc<DrawFunction>,
        layer: f64,
        mode: PolygonMode,
        levels: Option<RangeInclusive<i32>>,
    },
}

/// A feature with its geometry already in planar coordinates
struct Projected<'a> {
    id: String,
    properties: Option<&'a JsonObject>,
    geometry: Geometry<f64>,
}

impl FeatureMapper {
    /// Build the elements for one feature.
    ///
    /// Features without geometry produce nothing; a feature with any vertex
    /// outside the projection domain is dropped with a warning.
    pub fn map<P: GeographicProjection + ?Sized>(&self, feature: &Feature, projection: &P) -> Vec<VectorElement> {
        let Some(geometry) = &feature.geometry else {
            return Vec::new();
        };
        let id = feature_id(feature);

        let geometry = match Geometry::<f64>::try_from(geometry.clone()) {
            Ok(g) => g,
            Err(e) => {
                tracing::warn!(id, error = %e, "unsupported feature geometry");
                return Vec::new();
            }
        };
        let projected = geometry.try_map_coords(|c| {
            projection
                .from_geo(c.x, c.y)
                .map(|(x, y)| Coord { x, y })
        });
        let geometry = match projected {
            Ok(g) => g,
            Err(OutOfProjectionBounds { x, y }) => {
                tracing::warn!(id, x, y, "feature outside projection domain, dropped");
                return Vec::new();
            }
        };

        let feature = Projected {
            id,
            properties: feature.properties.as_ref(),
            geometry,
        };
        let mut out = Vec::new();
        self.map_projected(&feature, &feature.id, &mut out);
        out
    }

    fn map_projected(&self, feature: &Projected<'_>, id: &str, out: &mut Vec<VectorElement>) {
        match self {
            Self::All(children) => {
                for (i, child) in children.iter().enumerate() {
                    if children.len() > 1 {
                        child.map_projected(feature, &format!("{id}#{i}"), out);
                    } else {
                        child.map_projected(feature, id, out);
                    }
                }
            }
            Self::First(children) => {
                for child in children {
                    let before = out.len();
                    child.map_projected(feature, id, out);
                    if out.len() > before {
                        return;
                    }
                }
            }
            Self::Match { key, value, then } => {
                let tag = feature.properties.and_then(|p| p.get(key));
                let matches = match (tag, value) {
                    (None, _) | (Some(JsonValue::Null), _) => false,
                    (Some(_), None) => true,
                    (Some(JsonValue::String(s)), Some(expected)) => s == expected,
                    (Some(other), Some(expected)) => other.to_string() == *expected,
                };
                if matches {
                    then.map_projected(feature, id, out);
                }
            }
            Self::Line {
                draw,
                layer,
                radius,
                levels,
            } => {
                let lines = MultiLineString::new(collect_lines(&feature.geometry));
                let r = radius.evaluate(feature.properties);
                if let Some(kind) = ElementKind::line(&lines, r) {
                    out.push(
                        VectorElement::new(id, *layer, draw.clone(), kind).with_levels(levels.clone()),
                    );
                }
            }
            Self::Polygon {
                draw,
                layer,
                mode,
                levels,
            } => {
                let polygons = MultiPolygon::new(collect_polygons(&feature.geometry));
                let kind = match mode {
                    PolygonMode::Fill => ElementKind::fill_polygon(&polygons),
                    PolygonMode::Distance { max_dist } => {
                        ElementKind::distance_polygon(&polygons, *max_dist)
                    }
                };
                if let Some(kind) = kind {
                    out.push(
                        VectorElement::new(id, *layer, draw.clone(), kind).with_levels(levels.clone()),
                    );
                }
            }
        }
    }
}

/// Stable element id: the feature id, an `id` property, or a hash of the geometry
pub fn feature_id(feature: &Feature) -> String {
    match &feature.id {
        Some(geojson::feature::Id::String(s)) => return s.clone(),
        Some(geojson::feature::Id::Number(n)) => return n.to_string(),
        None => {}
    }
    match feature.property("id") {
        Some(JsonValue::String(s)) => return s.clone(),
        Some(JsonValue::Number(n)) => return n.to_string(),
        _ => {}
    }
    let mut hasher = DefaultHasher::new();
    serde_json::to_string(&feature.geometry)
        .unwrap_or_default()
        .hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

fn collect_lines(geometry: &Geometry<f64>) -> Vec<LineString<f64>> {
    match geometry {
        Geometry::Line(line) => vec![LineString::from(vec![line.start, line.end])],
        Geometry::LineString(ls) => vec![ls.clone()],
        Geometry::MultiLineString(mls) => mls.0.clone(),
        Geometry::Polygon(p) => rings(p).cloned().collect(),
        Geometry::MultiPolygon(mp) => mp.iter().flat_map(rings).cloned().collect(),
        Geometry::Rect(r) => rings(&r.to_polygon()).cloned().collect(),
        Geometry::Triangle(t) => rings(&t.to_polygon()).cloned().collect(),
        Geometry::GeometryCollection(gc) => gc.iter().flat_map(collect_lines).collect(),
        Geometry::Point(_) | Geometry::MultiPoint(_) => Vec::new(),
    }
}

fn collect_polygons(geometry: &Geometry<f64>) -> Vec<Polygon<f64>> {
    match geometry {
        Geometry::Polygon(p) => vec![p.clone()],
        Geometry::MultiPolygon(mp) => mp.0.clone(),
        Geometry::Rect(r) => vec![r.to_polygon()],
        Geometry::Triangle(t) => vec![t.to_polygon()],
        Geometry::GeometryCollection(gc) => gc.iter().flat_map(collect_polygons).collect(),
        _ => Vec::new(),
    }
}

fn rings(polygon: &Polygon<f64>) -> impl Iterator<Item = &LineString<f64>> {
    std::iter::once(polygon.exterior()).chain(polygon.interiors())
}
