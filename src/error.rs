//! Error types for virtual_hasher

use crate::model::Path;
use thiserror::Error;

/// Result type alias for virtual_hasher operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while hashing a virtual tree
#[derive(Error, Debug)]
pub enum Error {
    /// The caller handed the engine something it cannot work with.
    /// Raised before any hashing work or listener notification when possible.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("No hash available for clean path {path}")]
    MissingHash { path: Path },

    #[error("Hash source error: {0}")]
    Source(String),

    #[error("Hashing worker failed: {0}")]
    Worker(String),

    #[error("Scheduler invariant violated: {0}")]
    Scheduler(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
