//! Terra Raster Library - Core Data Structures for Geographic Terrain Rasterization
//!
//! This library converts geographic vector and raster data (coastlines, roads, buildings,
//! elevation grids) into per-block terrain instructions for a voxel world, one 16×16
//! column tile at a time.
//!
//! # Architecture
//!
//! - **[`projection`]**: Geographic projections and composable transforms with strict domain checks
//! - **[`IntervalTree`]**: 1-D segment tree answering "which segments cross this scanline"
//! - **[`Bvh`]**: Bulk-built 2-D bounding volume hierarchy for line segments and elements
//! - **[`VectorElement`]**: Line and polygon rasterizers emitting per-block weights
//! - **[`BlendMode`]**: Nearest/bilinear/cubic sampling of sparse scalar grids
//! - **[`dataset`]**: Asynchronous tiled dataset pipeline with per-key memoized fetches
//!   and recursive reference resolution
//! - **[`ElementCollection`]**: Parallel-built in-memory element index queried per tile
//!
//! # Performance Characteristics
//!
//! - **Interval tree build**: O(N log N), queries O(log N + K)
//! - **Polygon fill**: one tree stab per block column
//! - **Tile fetches**: at most one in-flight fetch+decode per tile key

pub mod blend;
pub mod bounds;
pub mod bvh;
mod collection;
pub mod dataset;
pub mod draw;
pub mod element;
pub mod interval_tree;
pub mod mapper;
pub mod projection;
pub mod registry;
mod segment;

// Public API exports
pub use blend::BlendMode;
pub use bounds::CornerBoundingBox;
pub use bvh::{Bounded, Bvh};
pub use collection::{CollectionConfig, CollectionInfo, ElementCollection};
pub use draw::{BlockState, DoubleCondition, DrawFunction, GridBuilder, TileBuilder};
pub use element::{ChunkPos, TILE_SIZE, VectorElement, rasterize_tile};
pub use interval_tree::{Interval, IntervalTree};
pub use mapper::FeatureMapper;
pub use projection::{GeographicProjection, OutOfProjectionBounds};
pub use registry::ParseRegistry;
pub use segment::Segment;

/// Error types for the library
#[derive(Debug, thiserror::Error)]
pub enum TerraError {
    #[error(transparent)]
    OutOfBounds(#[from] OutOfProjectionBounds),

    #[error("Dataset error: {0}")]
    Dataset(#[from] dataset::DatasetError),

    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TerraError>;
