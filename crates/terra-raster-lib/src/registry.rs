//! Tag-dispatched parsing of draw functions, conditions, mappers and projections
//!
//! Every configurable family is written as a JSON object with exactly one key, the
//! variant tag, whose value holds the variant's arguments:
//!
//! ```json
//! { "conditional": { "condition": { "greater_than": 0 }, "delegate": "water" } }
//! ```
//!
//! A bare string is shorthand for a tag without arguments (`"water"`). The
//! registry is a plain value: build it once with [`ParseRegistry::new`], extend it
//! with the `with_*` methods, then share it by reference.

use crate::draw::{BlockState, DoubleCondition, DrawFunction};
use crate::element::MAX_DISTANCE;
use crate::mapper::{FeatureMapper, PolygonMode, RadiusExpr};
use crate::projection::{
    CenteredMercator, Clamp, Equirectangular, FlipHorizontal, FlipVertical, GeographicProjection,
    Offset, Scale, Sinusoidal, SwapAxes, TransverseMercator, Utm, WebMercator,
};
use crate::{Result, TerraError};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::ops::RangeInclusive;
use std::sync::Arc;

/// Constructor for one variant, given its arguments
pub type Parser<T> = fn(&Value, &ParseRegistry) -> Result<T>;

type Table<T> = HashMap<&'static str, Parser<T>>;

pub struct ParseRegistry {
    draws: Table<DrawFunction>,
    conditions: Table<DoubleCondition>,
    mappers: Table<FeatureMapper>,
    projections: Table<Arc<dyn GeographicProjection>>,
}

impl ParseRegistry {
    /// Registry holding every built-in variant
    pub fn new() -> Self {
        let draws: [(&'static str, Parser<DrawFunction>); 7] = [
            ("all", draw_all),
            ("block", draw_block),
            ("water", |_, _| Ok(DrawFunction::Water)),
            ("no_trees", |_, _| Ok(DrawFunction::NoTrees)),
            ("add", draw_add),
            ("clamp", draw_clamp),
            ("conditional", draw_conditional),
        ];
        let conditions: [(&'static str, Parser<DoubleCondition>); 7] = [
            ("equal", |v, _| Ok(DoubleCondition::Equal(scalar_arg(v)?))),
            ("greater_than", |v, _| Ok(DoubleCondition::GreaterThan(scalar_arg(v)?))),
            ("less_than", |v, _| Ok(DoubleCondition::LessThan(scalar_arg(v)?))),
            ("in_range", condition_in_range),
            ("not", |v, r| Ok(DoubleCondition::Not(Box::new(r.parse_condition(v)?)))),
            ("and", |v, r| Ok(DoubleCondition::And(parse_list(v, |c| r.parse_condition(c))?))),
            ("or", |v, r| Ok(DoubleCondition::Or(parse_list(v, |c| r.parse_condition(c))?))),
        ];
        let mappers: [(&'static str, Parser<FeatureMapper>); 5] = [
            ("all", |v, r| Ok(FeatureMapper::All(parse_list(v, |m| r.parse_mapper(m))?))),
            ("first", |v, r| Ok(FeatureMapper::First(parse_list(v, |m| r.parse_mapper(m))?))),
            ("match", mapper_match),
            ("line", mapper_line),
            ("polygon", mapper_polygon),
        ];
        let projections: [(&'static str, Parser<Arc<dyn GeographicProjection>>); 12] = [
            ("equirectangular", |_, _| shared(Equirectangular)),
            ("sinusoidal", |_, _| shared(Sinusoidal)),
            ("web_mercator", projection_web_mercator),
            ("centered_mercator", |_, _| shared(CenteredMercator)),
            ("transverse_mercator", projection_transverse_mercator),
            ("utm", projection_utm),
            ("flip_horizontal", |v, r| shared(FlipHorizontal::new(delegate_projection(v, r)?))),
            ("flip_vertical", |v, r| shared(FlipVertical::new(delegate_projection(v, r)?))),
            ("swap_axes", |v, r| shared(SwapAxes::new(delegate_projection(v, r)?))),
            ("scale", projection_scale),
            ("offset", projection_offset),
            ("clamp", projection_clamp),
        ];

        Self {
            draws: draws.into_iter().collect(),
            conditions: conditions.into_iter().collect(),
            mappers: mappers.into_iter().collect(),
            projections: projections.into_iter().collect(),
        }
    }

    pub fn with_draw(mut self, tag: &'static str, parser: Parser<DrawFunction>) -> Self {
        self.draws.insert(tag, parser);
        self
    }

    pub fn with_condition(mut self, tag: &'static str, parser: Parser<DoubleCondition>) -> Self {
        self.conditions.insert(tag, parser);
        self
    }

    pub fn with_mapper(mut self, tag: &'static str, parser: Parser<FeatureMapper>) -> Self {
        self.mappers.insert(tag, parser);
        self
    }

    pub fn with_projection(
        mut self,
        tag: &'static str,
        parser: Parser<Arc<dyn GeographicProjection>>,
    ) -> Self {
        self.projections.insert(tag, parser);
        self
    }

    pub fn parse_draw(&self, value: &Value) -> Result<DrawFunction> {
        self.dispatch("draw function", &self.draws, value)
    }

    pub fn parse_condition(&self, value: &Value) -> Result<DoubleCondition> {
        self.dispatch("condition", &self.conditions, value)
    }

    pub fn parse_mapper(&self, value: &Value) -> Result<FeatureMapper> {
        self.dispatch("mapper", &self.mappers, value)
    }

    pub fn parse_projection(&self, value: &Value) -> Result<Arc<dyn GeographicProjection>> {
        self.dispatch("projection", &self.projections, value)
    }

    fn dispatch<T>(&self, family: &str, table: &Table<T>, value: &Value) -> Result<T> {
        static NO_ARGS: Value = Value::Null;
        let entry = match value {
            Value::String(tag) => Some((tag.as_str(), &NO_ARGS)),
            Value::Object(map) if map.len() == 1 => map.iter().next().map(|(k, v)| (k.as_str(), v)),
            _ => None,
        };
        let Some((tag, args)) = entry else {
            return Err(config_error(format!(
                "{family} must be a tag string or an object with exactly one key, got {value}"
            )));
        };
        let parser = table
            .get(tag)
            .ok_or_else(|| config_error(format!("unknown {family} '{tag}'")))?;
        parser(args, self).map_err(|e| match e {
            TerraError::Config(msg) => config_error(format!("{tag}: {msg}")),
            other => other,
        })
    }
}

impl Default for ParseRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ParseRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn tags<T>(table: &Table<T>) -> Vec<&'static str> {
            let mut keys: Vec<_> = table.keys().copied().collect();
            keys.sort_unstable();
            keys
        }
        f.debug_struct("ParseRegistry")
            .field("draws", &tags(&self.draws))
            .field("conditions", &tags(&self.conditions))
            .field("mappers", &tags(&self.mappers))
            .field("projections", &tags(&self.projections))
            .finish()
    }
}

fn config_error(msg: impl Into<String>) -> TerraError {
    TerraError::Config(msg.into())
}

fn object(value: &Value) -> Result<&Map<String, Value>> {
    value
        .as_object()
        .ok_or_else(|| config_error(format!("expected an object, got {value}")))
}

fn field<'a>(value: &'a Value, key: &str) -> Result<&'a Value> {
    object(value)?
        .get(key)
        .ok_or_else(|| config_error(format!("missing field '{key}'")))
}

fn as_f64(value: &Value, what: &str) -> Result<f64> {
    value
        .as_f64()
        .ok_or_else(|| config_error(format!("'{what}' must be a number, got {value}")))
}

fn as_i32(value: &Value, what: &str) -> Result<i32> {
    value
        .as_i64()
        .and_then(|v| i32::try_from(v).ok())
        .ok_or_else(|| config_error(format!("'{what}' must be a 32-bit integer, got {value}")))
}

fn f64_field(value: &Value, key: &str) -> Result<f64> {
    as_f64(field(value, key)?, key)
}

fn f64_or(value: &Value, key: &str, default: f64) -> Result<f64> {
    match value.get(key) {
        Some(v) => as_f64(v, key),
        None => Ok(default),
    }
}

fn i32_or(value: &Value, key: &str, default: i32) -> Result<i32> {
    match value.get(key) {
        Some(v) => as_i32(v, key),
        None => Ok(default),
    }
}

fn str_field<'a>(value: &'a Value, key: &str) -> Result<&'a str> {
    field(value, key)?
        .as_str()
        .ok_or_else(|| config_error(format!("'{key}' must be a string")))
}

/// A bare number, or `{"value": n}`
fn scalar_arg(value: &Value) -> Result<f64> {
    match value {
        Value::Number(_) => as_f64(value, "value"),
        _ => f64_field(value, "value"),
    }
}

fn parse_list<T>(value: &Value, mut parse: impl FnMut(&Value) -> Result<T>) -> Result<Vec<T>> {
    value
        .as_array()
        .ok_or_else(|| config_error(format!("expected a list, got {value}")))?
        .iter()
        .map(&mut parse)
        .collect()
}

/// Optional `[min, max]` zoom range
fn levels(value: &Value) -> Result<Option<RangeInclusive<i32>>> {
    let Some(levels) = value.get("levels") else {
        return Ok(None);
    };
    match levels.as_array().map(Vec::as_slice) {
        Some([min, max]) => Ok(Some(as_i32(min, "levels")?..=as_i32(max, "levels")?)),
        _ => Err(config_error(format!("'levels' must be [min, max], got {levels}"))),
    }
}

fn delegate_draw(value: &Value, registry: &ParseRegistry) -> Result<Box<DrawFunction>> {
    Ok(Box::new(registry.parse_draw(field(value, "delegate")?)?))
}

fn draw_all(value: &Value, registry: &ParseRegistry) -> Result<DrawFunction> {
    Ok(DrawFunction::All(parse_list(value, |v| registry.parse_draw(v))?))
}

fn draw_block(value: &Value, _: &ParseRegistry) -> Result<DrawFunction> {
    let name = match value {
        Value::String(s) => s.as_str(),
        _ => str_field(value, "state")?,
    };
    Ok(DrawFunction::Block(BlockState::new(name)))
}

fn draw_add(value: &Value, registry: &ParseRegistry) -> Result<DrawFunction> {
    Ok(DrawFunction::AddConstant {
        value: as_i32(field(value, "value")?, "value")?,
        delegate: delegate_draw(value, registry)?,
    })
}

fn draw_clamp(value: &Value, registry: &ParseRegistry) -> Result<DrawFunction> {
    let min = i32_or(value, "min", i32::MIN)?;
    let max = i32_or(value, "max", i32::MAX)?;
    if min > max {
        return Err(config_error(format!("min {min} is greater than max {max}")));
    }
    Ok(DrawFunction::Clamp {
        min,
        max,
        delegate: delegate_draw(value, registry)?,
    })
}

fn draw_conditional(value: &Value, registry: &ParseRegistry) -> Result<DrawFunction> {
    Ok(DrawFunction::Conditional {
        condition: registry.parse_condition(field(value, "condition")?)?,
        delegate: delegate_draw(value, registry)?,
    })
}

fn condition_in_range(value: &Value, _: &ParseRegistry) -> Result<DoubleCondition> {
    Ok(DoubleCondition::InRange {
        min: f64_or(value, "min", f64::NEG_INFINITY)?,
        max: f64_or(value, "max", f64::INFINITY)?,
    })
}

fn mapper_match(value: &Value, registry: &ParseRegistry) -> Result<FeatureMapper> {
    let expected = match value.get("value") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(other) => Some(other.to_string()),
    };
    Ok(FeatureMapper::Match {
        key: str_field(value, "key")?.to_string(),
        value: expected,
        then: Box::new(registry.parse_mapper(field(value, "then")?)?),
    })
}

/// A number, or `{"tag": key, "scale": s, "offset": o, "default": d}`
fn radius(value: &Value) -> Result<RadiusExpr> {
    match value.get("radius") {
        None => Ok(RadiusExpr::Constant(1.0)),
        Some(Value::Number(_)) => Ok(RadiusExpr::Constant(f64_field(value, "radius")?)),
        Some(expr) => Ok(RadiusExpr::Tag {
            key: str_field(expr, "tag")?.to_string(),
            scale: f64_or(expr, "scale", 1.0)?,
            offset: f64_or(expr, "offset", 0.0)?,
            default: f64_or(expr, "default", 1.0)?,
        }),
    }
}

fn mapper_line(value: &Value, registry: &ParseRegistry) -> Result<FeatureMapper> {
    Ok(FeatureMapper::Line {
        draw: Arc::new(registry.parse_draw(field(value, "draw")?)?),
        layer: f64_or(value, "layer", 0.0)?,
        radius: radius(value)?,
        levels: levels(value)?,
    })
}

fn mapper_polygon(value: &Value, registry: &ParseRegistry) -> Result<FeatureMapper> {
    let mode = match value.get("distance") {
        Some(d) => {
            let max_dist = as_i32(d, "distance")?;
            if !(0..=MAX_DISTANCE).contains(&max_dist) {
                return Err(config_error(format!(
                    "'distance' must be between 0 and {MAX_DISTANCE}, got {max_dist}"
                )));
            }
            PolygonMode::Distance { max_dist }
        }
        None => PolygonMode::Fill,
    };
    Ok(FeatureMapper::Polygon {
        draw: Arc::new(registry.parse_draw(field(value, "draw")?)?),
        layer: f64_or(value, "layer", 0.0)?,
        mode,
        levels: levels(value)?,
    })
}

fn shared(projection: impl GeographicProjection + 'static) -> Result<Arc<dyn GeographicProjection>> {
    Ok(Arc::new(projection))
}

fn delegate_projection(
    value: &Value,
    registry: &ParseRegistry,
) -> Result<Arc<dyn GeographicProjection>> {
    registry.parse_projection(field(value, "delegate")?)
}

fn projection_web_mercator(value: &Value, _: &ParseRegistry) -> Result<Arc<dyn GeographicProjection>> {
    let zoom = i32_or(value, "zoom", 0)?;
    let zoom = u32::try_from(zoom)
        .ok()
        .filter(|z| *z <= 30)
        .ok_or_else(|| config_error(format!("zoom {zoom} out of range 0..=30")))?;
    shared(WebMercator::new(zoom))
}

fn projection_transverse_mercator(
    value: &Value,
    _: &ParseRegistry,
) -> Result<Arc<dyn GeographicProjection>> {
    shared(TransverseMercator::new(f64_or(value, "central_meridian", 0.0)?))
}

fn projection_utm(value: &Value, _: &ParseRegistry) -> Result<Arc<dyn GeographicProjection>> {
    let zone = as_i32(field(value, "zone")?, "zone")?;
    let north = match value.get("north") {
        None => true,
        Some(v) => v
            .as_bool()
            .ok_or_else(|| config_error("'north' must be a boolean"))?,
    };
    let utm = u8::try_from(zone)
        .ok()
        .and_then(|zone| Utm::new(zone, north))
        .ok_or_else(|| config_error(format!("invalid UTM zone {zone}")))?;
    shared(utm)
}

fn projection_scale(value: &Value, registry: &ParseRegistry) -> Result<Arc<dyn GeographicProjection>> {
    let uniform = value.get("factor").map(|f| as_f64(f, "factor")).transpose()?;
    let x = f64_or(value, "x", uniform.unwrap_or(1.0))?;
    let y = f64_or(value, "y", uniform.unwrap_or(1.0))?;
    let scale = Scale::new(delegate_projection(value, registry)?, x, y)
        .ok_or_else(|| config_error(format!("scale factors must be finite and nonzero, got ({x}, {y})")))?;
    shared(scale)
}

fn projection_offset(value: &Value, registry: &ParseRegistry) -> Result<Arc<dyn GeographicProjection>> {
    shared(Offset::new(
        delegate_projection(value, registry)?,
        f64_or(value, "dx", 0.0)?,
        f64_or(value, "dy", 0.0)?,
    ))
}

fn projection_clamp(value: &Value, registry: &ParseRegistry) -> Result<Arc<dyn GeographicProjection>> {
    let (min_x, max_x) = (
        f64_or(value, "min_x", f64::NEG_INFINITY)?,
        f64_or(value, "max_x", f64::INFINITY)?,
    );
    let (min_y, max_y) = (
        f64_or(value, "min_y", f64::NEG_INFINITY)?,
        f64_or(value, "max_y", f64::INFINITY)?,
    );
    let clamp = Clamp::new(delegate_projection(value, registry)?, min_x, max_x, min_y, max_y)
        .ok_or_else(|| config_error("clamp bounds must satisfy min <= max"))?;
    shared(clamp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::draw::{GridBuilder, TileBuilder};
    use serde_json::json;

    #[test]
    fn test_parse_draw_functions() {
        let registry = ParseRegistry::new();
        let draw = registry
            .parse_draw(&json!({
                "all": [
                    { "block": { "state": "minecraft:sand" } },
                    { "conditional": {
                        "condition": { "greater_than": 1 },
                        "delegate": { "add": { "value": -1, "delegate": "water" } }
                    } }
                ]
            }))
            .unwrap();

        let mut builder = GridBuilder::new();
        draw.draw(&mut builder, 0, 0, 3);
        draw.draw(&mut builder, 1, 0, 1);
        assert_eq!(builder.block(0, 0).map(|b| b.name()), Some("minecraft:sand"));
        assert_eq!(builder.water_depth(0, 0), Some(2));
        assert_eq!(builder.water_depth(1, 0), None);

        assert_eq!(
            registry.parse_draw(&json!({ "block": "minecraft:stone" })).unwrap(),
            DrawFunction::Block(BlockState::new("minecraft:stone"))
        );
    }

    #[test]
    fn test_parse_conditions() {
        let registry = ParseRegistry::new();
        let condition = registry
            .parse_condition(&json!({
                "and": [
                    { "in_range": { "min": 0, "max": 10 } },
                    { "not": { "equal": { "value": 5 } } },
                    { "or": [ { "less_than": 3 }, { "greater_than": 7 } ] }
                ]
            }))
            .unwrap();
        assert!(condition.test(2.0));
        assert!(condition.test(8.0));
        assert!(!condition.test(5.0));
        assert!(!condition.test(11.0));
    }

    #[test]
    fn test_parse_mappers() {
        let registry = ParseRegistry::new();
        let mapper = registry
            .parse_mapper(&json!({
                "first": [
                    { "match": { "key": "highway", "then": { "line": {
                        "draw": "water",
                        "layer": 2,
                        "radius": { "tag": "width", "scale": 0.5 },
                        "levels": [0, 4]
                    } } } },
                    { "polygon": { "draw": "no_trees", "distance": 4 } }
                ]
            }))
            .unwrap();

        let FeatureMapper::First(children) = &mapper else {
            panic!("expected first, got {mapper:?}");
        };
        let FeatureMapper::Match { key, value, then } = &children[0] else {
            panic!("expected match");
        };
        assert_eq!(key, "highway");
        assert_eq!(*value, None);
        assert!(matches!(
            then.as_ref(),
            FeatureMapper::Line { layer, levels: Some(l), radius: RadiusExpr::Tag { scale, default, .. }, .. }
                if *layer == 2.0 && *l == (0..=4) && *scale == 0.5 && *default == 1.0
        ));
        assert!(matches!(
            children[1],
            FeatureMapper::Polygon { mode: PolygonMode::Distance { max_dist: 4 }, .. }
        ));
    }

    #[test]
    fn test_parse_projections() {
        let registry = ParseRegistry::new();
        let projection = registry
            .parse_projection(&json!({
                "offset": { "dx": 10, "dy": -5, "delegate": {
                    "scale": { "factor": 2, "delegate": "equirectangular" }
                } }
            }))
            .unwrap();
        let (x, y) = projection.from_geo(1.0, 2.0).unwrap();
        assert_eq!((x, y), (12.0, -1.0));

        let utm = registry.parse_projection(&json!({ "utm": { "zone": 33 } })).unwrap();
        assert!(utm.from_geo(15.0, 45.0).is_ok());
        assert!(registry.parse_projection(&json!({ "utm": { "zone": 61 } })).is_err());
        assert!(registry.parse_projection(&json!({ "web_mercator": { "zoom": 3 } })).is_ok());
    }

    #[test]
    fn test_errors_name_the_problem() {
        let registry = ParseRegistry::new();
        let err = |v: Value| registry.parse_draw(&v).unwrap_err().to_string();

        assert!(err(json!({ "lava": {} })).contains("unknown draw function 'lava'"));
        assert!(err(json!({ "water": {}, "no_trees": {} })).contains("exactly one key"));
        assert!(err(json!({ "add": { "delegate": "water" } })).contains("add: missing field 'value'"));
        assert!(err(json!({ "clamp": { "min": 3, "max": 1, "delegate": "water" } })).contains("greater than"));
        assert!(
            registry
                .parse_projection(&json!({ "scale": { "x": 0, "delegate": "sinusoidal" } }))
                .is_err()
        );

        let polygon = |d: Value| registry.parse_mapper(&json!({ "polygon": { "draw": "water", "distance": d } }));
        assert!(polygon(json!(1024)).is_ok());
        let too_far = polygon(json!(2_000_000_000)).unwrap_err().to_string();
        assert!(too_far.contains("between 0 and 1024"), "{too_far}");
        assert!(polygon(json!(-1)).is_err());
    }

    #[test]
    fn test_registry_is_extensible() {
        let registry = ParseRegistry::new().with_draw("swamp", |_, r| r.parse_draw(&json!("water")));
        let mut builder = GridBuilder::new();
        registry.parse_draw(&json!("swamp")).unwrap().draw(&mut builder, 3, 3, 4);
        builder.update_water_depth(3, 3, 1);
        assert_eq!(builder.water_depth(3, 3), Some(4));
    }
}
