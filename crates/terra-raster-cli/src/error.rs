use std::path::PathBuf;
use terra_raster_lib::dataset::DatasetError;
use terra_raster_lib::{OutOfProjectionBounds, TerraError};

/// Everything a command can fail with
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error(transparent)]
    Terra(#[from] TerraError),

    #[error(transparent)]
    Dataset(#[from] DatasetError),

    #[error(transparent)]
    OutOfBounds(#[from] OutOfProjectionBounds),

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid JSON in {what}: {source}")]
    Json {
        what: String,
        source: serde_json::Error,
    },

    #[error("failed to write output: {0}")]
    Output(#[from] std::io::Error),
}
