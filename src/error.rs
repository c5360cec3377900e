use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum OptimizeError {
    /// The source bytes are not a raster image the decoder understands.
    #[error("Failed to decode image: {0}")]
    Decode(String),

    #[error("Failed to encode image: {0}")]
    Encode(String),

    /// Pre-flight failure. Raised before any file is touched.
    #[error("Invalid batch: {0}")]
    InvalidBatch(String),

    /// The temp-write/rename sequence failed. The destination keeps its previous content.
    #[error("Failed to commit {}: {source}", path.display())]
    Commit {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Worker pool error: {0}")]
    WorkerPool(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl OptimizeError {
    pub fn commit(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        OptimizeError::Commit {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, OptimizeError>;
