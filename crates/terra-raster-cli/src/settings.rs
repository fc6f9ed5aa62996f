use clap::{Parser, Subcommand};
use std::path::PathBuf;
use terra_raster_lib::ChunkPos;
use terra_raster_lib::BlendMode;
use terra_raster_lib::dataset::ScalarFormat;

/// Lon/lat to block coordinates at roughly 1.2 m per block near the equator
pub const DEFAULT_BLOCK_PROJECTION: &str = r#"{"web_mercator":{"zoom":17}}"#;

#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
/// Terra Raster - Rasterize geographic datasets into voxel terrain tiles
pub struct Settings {
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Convert a point between geographic and projected coordinates
    Project {
        /// Projection definition as JSON, e.g. '{"web_mercator":{"zoom":3}}'
        #[clap(short, long, default_value = "\"equirectangular\"")]
        projection: String,

        /// Read projected x/y and print lon/lat instead
        #[clap(short, long, default_value = "false")]
        inverse: bool,

        #[clap(allow_hyphen_values = true)]
        x: f64,

        #[clap(allow_hyphen_values = true)]
        y: f64,
    },

    /// Sample a tiled scalar dataset (elevation, land cover, ...)
    Sample {
        /// Dataset configuration (JSON); replaces the URL, format, zoom and blend flags
        #[clap(short, long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Tile URL template, repeat for mirrors tried in order
        #[clap(short, long = "url", value_name = "TEMPLATE")]
        urls: Vec<String>,

        /// terrarium, packed-rgb, tiff or channel:N
        #[clap(short, long, default_value = "terrarium", value_parser = parse_format)]
        format: ScalarFormat,

        /// Web Mercator zoom level of the tiles
        #[clap(short, long, default_value = "10")]
        zoom: u32,

        /// nearest, linear, smooth or cubic
        #[clap(short, long, default_value = "linear")]
        blend: BlendMode,

        /// Dataset projection as JSON. Default: 256-pixel Web Mercator tiles at --zoom
        #[clap(short, long)]
        projection: Option<String>,

        /// Sample a size×size grid over min_lon,min_lat,max_lon,max_lat
        #[clap(long, value_parser = parse_bbox, allow_hyphen_values = true)]
        bbox: Option<[f64; 4]>,

        /// Samples per side of the --bbox grid
        #[clap(long, default_value = "16")]
        size: usize,

        /// Points to sample, each as lon,lat
        #[clap(value_parser = parse_pair, allow_hyphen_values = true)]
        points: Vec<(f64, f64)>,
    },

    /// Rasterize one 16×16 tile from vector features
    Rasterize {
        /// Feature mapper definition (JSON)
        #[clap(short, long, value_name = "FILE")]
        mapper: PathBuf,

        /// Projection from lon/lat to block coordinates (JSON)
        #[clap(short, long, default_value = DEFAULT_BLOCK_PROJECTION)]
        projection: String,

        /// GeoJSON files to read features from
        #[clap(short, long = "geojson", value_name = "FILE", conflicts_with = "dataset")]
        geojson: Vec<PathBuf>,

        /// Geometry dataset configuration (JSON) queried for the tile area
        #[clap(short, long, value_name = "FILE")]
        dataset: Option<PathBuf>,

        /// Projection the geometry dataset is tiled in (JSON)
        #[clap(long, default_value = "\"equirectangular\"")]
        dataset_projection: String,

        /// Tile to rasterize, as x,z
        #[clap(short, long, value_parser = parse_tile, allow_hyphen_values = true)]
        tile: ChunkPos,

        /// Level elements are filtered by
        #[clap(short, long, default_value = "0")]
        level: i32,
    },
}

impl Settings {
    pub fn from_cli() -> Self {
        match Settings::try_parse() {
            Ok(args) => args,
            Err(e) => e.exit(),
        }
    }
}

fn parse_numbers<const N: usize>(s: &str) -> Result<[f64; N], String> {
    let values = s
        .split(',')
        .map(|part| part.trim().parse::<f64>().map_err(|e| format!("'{part}': {e}")))
        .collect::<Result<Vec<_>, _>>()?;
    <[f64; N]>::try_from(values).map_err(|v| format!("expected {N} comma-separated numbers, got {}", v.len()))
}

fn parse_pair(s: &str) -> Result<(f64, f64), String> {
    let [a, b] = parse_numbers::<2>(s)?;
    Ok((a, b))
}

fn parse_bbox(s: &str) -> Result<[f64; 4], String> {
    let bbox = parse_numbers::<4>(s)?;
    if bbox[0] > bbox[2] || bbox[1] > bbox[3] {
        return Err("bbox minimum exceeds maximum".into());
    }
    Ok(bbox)
}

fn parse_tile(s: &str) -> Result<ChunkPos, String> {
    let (x, z) = s
        .split_once(',')
        .ok_or_else(|| format!("expected x,z, got '{s}'"))?;
    let parse = |v: &str| v.trim().parse::<i32>().map_err(|e| format!("'{v}': {e}"));
    Ok(ChunkPos::new(parse(x)?, parse(z)?))
}

fn parse_format(s: &str) -> Result<ScalarFormat, String> {
    match s {
        "terrarium" => Ok(ScalarFormat::Terrarium),
        "packed-rgb" => Ok(ScalarFormat::PackedRgb),
        "tiff" => Ok(ScalarFormat::Tiff),
        _ => match s.strip_prefix("channel:").map(str::parse::<usize>) {
            Some(Ok(channel)) if channel < 4 => Ok(ScalarFormat::Channel { channel }),
            _ => Err(format!("unknown format '{s}'")),
        },
    }
}
