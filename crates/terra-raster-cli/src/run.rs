//! Command implementations. Results are written to `out`; progress goes to the log.

use crate::error::CliError;
use crate::settings::{Command, Settings};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use terra_raster_lib::dataset::{
    GeometryDataset, GeometryDatasetConfig, ReqwestClient, ScalarDataset, ScalarDatasetConfig, ScalarFormat,
    UrlTemplate,
};
use terra_raster_lib::projection::WebMercator;
use terra_raster_lib::{
    BlendMode, ChunkPos, CollectionConfig, CornerBoundingBox, ElementCollection, GeographicProjection, GridBuilder,
    ParseRegistry, TILE_SIZE,
};
use tracing::info;

pub async fn run(settings: Settings, out: &mut dyn Write) -> Result<(), CliError> {
    match settings.command {
        Command::Project {
            projection,
            inverse,
            x,
            y,
        } => project(&projection, inverse, x, y, out),
        Command::Sample {
            config,
            urls,
            format,
            zoom,
            blend,
            projection,
            bbox,
            size,
            points,
        } => {
            let dataset = SampleDataset {
                config,
                urls,
                format,
                zoom,
                blend,
                projection,
            };
            sample(dataset, bbox, size, &points, out).await
        }
        Command::Rasterize {
            mapper,
            projection,
            geojson,
            dataset,
            dataset_projection,
            tile,
            level,
        } => {
            let source = match dataset {
                Some(config) => FeatureSource::Dataset {
                    config,
                    projection: dataset_projection,
                },
                None => FeatureSource::Files(geojson),
            };
            rasterize(&mapper, &projection, source, tile, level, out).await
        }
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, CliError> {
    let text = std::fs::read_to_string(path).map_err(|source| CliError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| CliError::Json {
        what: path.display().to_string(),
        source,
    })
}

fn parse_json(what: &str, text: &str) -> Result<Value, CliError> {
    serde_json::from_str(text).map_err(|source| CliError::Json {
        what: what.to_string(),
        source,
    })
}

fn project(projection: &str, inverse: bool, x: f64, y: f64, out: &mut dyn Write) -> Result<(), CliError> {
    let projection = ParseRegistry::new().parse_projection(&parse_json("--projection", projection)?)?;
    let (a, b) = if inverse {
        projection.to_geo(x, y)?
    } else {
        projection.from_geo(x, y)?
    };
    info!(
        meters_per_unit = projection.meters_per_unit(),
        upright = projection.upright(),
        "projected"
    );
    writeln!(out, "{a} {b}")?;
    Ok(())
}

/// Scalar dataset as described on the command line
struct SampleDataset {
    config: Option<PathBuf>,
    urls: Vec<String>,
    format: ScalarFormat,
    zoom: u32,
    blend: BlendMode,
    projection: Option<String>,
}

impl SampleDataset {
    fn open(self) -> Result<ScalarDataset<ReqwestClient>, CliError> {
        let config = match &self.config {
            Some(path) => read_json::<ScalarDatasetConfig>(path)?,
            None => ScalarDatasetConfig {
                urls: self.urls.into_iter().map(UrlTemplate::new).collect(),
                format: self.format,
                zoom: self.zoom as i32,
                blend: self.blend,
                ..Default::default()
            },
        };
        let projection: Arc<dyn GeographicProjection> = match &self.projection {
            Some(p) => ParseRegistry::new().parse_projection(&parse_json("--projection", p)?)?,
            None => Arc::new(WebMercator::new(self.zoom)),
        };
        Ok(ScalarDataset::new(config, projection, Arc::new(ReqwestClient::new()?))?)
    }
}

async fn sample(
    dataset: SampleDataset,
    bbox: Option<[f64; 4]>,
    size: usize,
    points: &[(f64, f64)],
    out: &mut dyn Write,
) -> Result<(), CliError> {
    #[cfg(feature = "profiling")]
    profiling::scope!("cli::sample");

    let dataset = dataset.open()?;

    if let Some([min_lon, min_lat, max_lon, max_lat]) = bbox {
        let area = geo::Rect::new(
            geo::Coord {
                x: min_lon,
                y: min_lat,
            },
            geo::Coord {
                x: max_lon,
                y: max_lat,
            },
        );
        let values = dataset
            .get_bulk(&CornerBoundingBox::from_rect(area), size, size)
            .await;
        for row in values.chunks(size.max(1)) {
            let line: Vec<String> = row.iter().map(|v| format!("{v:.2}")).collect();
            writeln!(out, "{}", line.join(" "))?;
        }
    }

    for &(lon, lat) in points {
        let value = dataset.get(lon, lat).await?;
        writeln!(out, "{lon} {lat} {value}")?;
    }

    let stats = dataset.cache().stats();
    info!(
        requests = stats.requests,
        coalesced = stats.coalesced,
        fetches = stats.fetches,
        coalescing_ratio = stats.coalescing_ratio(),
        "tile cache"
    );
    Ok(())
}

enum FeatureSource {
    Files(Vec<PathBuf>),
    Dataset { config: PathBuf, projection: String },
}

async fn rasterize(
    mapper: &Path,
    projection: &str,
    source: FeatureSource,
    tile: ChunkPos,
    level: i32,
    out: &mut dyn Write,
) -> Result<(), CliError> {
    #[cfg(feature = "profiling")]
    profiling::scope!("cli::rasterize");

    let registry = ParseRegistry::new();
    let mapper = registry.parse_mapper(&read_json::<Value>(mapper)?)?;
    let projection = registry.parse_projection(&parse_json("--projection", projection)?)?;
    let config = CollectionConfig::default();

    let collection = match source {
        FeatureSource::Files(paths) => {
            ElementCollection::load_geojson_files(config, paths, &mapper, &*projection)?
        }
        FeatureSource::Dataset {
            config: dataset_config,
            projection: dataset_projection,
        } => {
            let dataset_projection =
                registry.parse_projection(&parse_json("--dataset-projection", &dataset_projection)?)?;
            let dataset = GeometryDataset::new(
                read_json::<GeometryDatasetConfig>(&dataset_config)?,
                dataset_projection,
                Arc::new(ReqwestClient::new()?),
            )?;
            let area = CornerBoundingBox::from_planar(tile.bounds(), &*projection)?;
            let features = dataset.query(&area).await?;
            ElementCollection::from_features(config, &features, &mapper, &*projection)
        }
    };

    let info = collection.info();
    info!(
        tile = ?tile,
        elements = info.element_count,
        lines = info.line_count,
        polygons = info.polygon_count,
        "collection ready"
    );

    let mut builder = GridBuilder::new();
    collection.rasterize(tile, level, &mut builder);
    write_tile(&builder, out)?;
    Ok(())
}

/// One character per block, rows of constant z: `~` water, `.` untouched, else
/// the first letter of the surface block, followed by a legend
fn write_tile(builder: &GridBuilder, out: &mut dyn Write) -> std::io::Result<()> {
    let mut legend = BTreeMap::new();
    for z in 0..TILE_SIZE {
        let row: String = (0..TILE_SIZE)
            .map(|x| {
                if builder.water_depth(x, z).is_some_and(|d| d > 0) {
                    return '~';
                }
                match builder.block(x, z) {
                    Some(block) => {
                        let symbol = block
                            .name()
                            .rsplit(':')
                            .next()
                            .and_then(|n| n.chars().next())
                            .unwrap_or('#');
                        legend.entry(symbol).or_insert_with(|| block.name().to_string());
                        symbol
                    }
                    None => '.',
                }
            })
            .collect();
        writeln!(out, "{row}")?;
    }
    for (symbol, name) in legend {
        writeln!(out, "{symbol} {name}")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("terra-cli-{name}-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    async fn run_args(args: &[&str]) -> Result<String, CliError> {
        let settings = Settings::try_parse_from(std::iter::once("terra-raster").chain(args.iter().copied())).unwrap();
        let mut out = Vec::new();
        run(settings, &mut out).await?;
        Ok(String::from_utf8(out).unwrap())
    }

    const LAKE: &str = r#"{"type":"Feature","id":"lake","properties":{"natural":"water"},
        "geometry":{"type":"Polygon","coordinates":[[[0,0],[8,0],[8,8],[0,8],[0,0]]]}}"#;

    const ROAD: &str = r#"{"type":"Feature","id":"road","properties":{"highway":"path"},
        "geometry":{"type":"LineString","coordinates":[[0,12.5],[16,12.5]]}}"#;

    const MAPPER: &str = r#"{"first": [
        {"match": {"key": "natural", "value": "water", "then": {"polygon": {"draw": "water"}}}},
        {"match": {"key": "highway", "then": {"line": {"draw": {"block": "minecraft:gravel"}, "radius": 2}}}}
    ]}"#;

    fn expected_tile() -> String {
        let mut rows = Vec::new();
        for z in 0..TILE_SIZE {
            rows.push(match z {
                0..8 => format!("{}{}", "~".repeat(8), ".".repeat(8)),
                11..=13 => "g".repeat(16),
                _ => ".".repeat(16),
            });
        }
        rows.push("g minecraft:gravel".into());
        rows.join("\n") + "\n"
    }

    #[tokio::test]
    async fn test_project() {
        let out = run_args(&["project", "-p", r#"{"web_mercator":{"zoom":0}}"#, "0", "0"])
            .await
            .unwrap();
        assert_eq!(out, "128 128\n");

        let out = run_args(&["project", "-i", "--", "-12.5", "40"]).await.unwrap();
        assert_eq!(out, "-12.5 40\n");

        let err = run_args(&["project", "--", "0", "95"]).await.unwrap_err();
        assert!(matches!(err, CliError::OutOfBounds(_)));

        let err = run_args(&["project", "-p", "{nope", "0", "0"]).await.unwrap_err();
        assert!(matches!(err, CliError::Json { .. }));
    }

    #[tokio::test]
    async fn test_rasterize_geojson_files() {
        let dir = temp_dir("files");
        let mapper = dir.join("mapper.json");
        let features = dir.join("features.geojson");
        std::fs::write(&mapper, MAPPER).unwrap();
        std::fs::write(
            &features,
            format!(r#"{{"type":"FeatureCollection","features":[{LAKE},{ROAD}]}}"#),
        )
        .unwrap();

        let out = run_args(&[
            "rasterize",
            "-m",
            mapper.to_str().unwrap(),
            "-p",
            "\"equirectangular\"",
            "-g",
            features.to_str().unwrap(),
            "-t",
            "0,0",
        ])
        .await
        .unwrap();
        assert_eq!(out, expected_tile());

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_rasterize_geometry_dataset() {
        let dir = temp_dir("dataset");
        std::fs::create_dir_all(dir.join("tile/0")).unwrap();
        std::fs::create_dir_all(dir.join("objects")).unwrap();
        let compact = |s: &str| s.split_whitespace().collect::<Vec<_>>().join(" ");
        std::fs::write(
            dir.join("tile/0/0.json"),
            format!("{}\n{{\"type\":\"Reference\",\"location\":\"../../objects/road.json\"}}\n", compact(LAKE)),
        )
        .unwrap();
        std::fs::write(dir.join("objects/road.json"), compact(ROAD)).unwrap();

        let mapper = dir.join("mapper.json");
        std::fs::write(&mapper, MAPPER).unwrap();
        let config = dir.join("dataset.json");
        std::fs::write(
            &config,
            serde_json::json!({
                "base_urls": [format!("file://{}", dir.display())],
                "tile_size": 10.0,
            })
            .to_string(),
        )
        .unwrap();

        let out = run_args(&[
            "rasterize",
            "-m",
            mapper.to_str().unwrap(),
            "-p",
            "\"equirectangular\"",
            "-d",
            config.to_str().unwrap(),
            "-t",
            "0,0",
        ])
        .await
        .unwrap();
        assert_eq!(out, expected_tile());

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_missing_config_file() {
        let err = run_args(&["sample", "-c", "/nonexistent/terra-dataset.json", "1,1"])
            .await
            .unwrap_err();
        assert!(matches!(err, CliError::Read { .. }));
    }

    #[test]
    fn test_write_tile_empty() {
        let mut out = Vec::new();
        write_tile(&GridBuilder::new(), &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.lines().count(), TILE_SIZE);
        assert!(text.lines().all(|l| l == ".".repeat(TILE_SIZE)));
    }
}
