//! Error types. Only [`StoreError`] ever reaches callers of the public pipeline;
//! source and model errors are recorded or logged and turned into empty results.

use thiserror::Error;

/// Time-series store failure. A failed write rolls back the whole cycle.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("store lock poisoned")]
    LockPoisoned,
}

/// Why a single acquisition source produced nothing.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("not found")]
    NotFound,

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("timed out after {0}s")]
    Timeout(u64),

    #[error("exited unsuccessfully: {0}")]
    Failed(String),

    #[error("no output")]
    Empty,

    #[error("output contained no valid records")]
    NoRecords,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl SourceError {
    /// Classify an io error from spawning a tool or opening a pseudo-file.
    pub fn from_io(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => SourceError::NotFound,
            std::io::ErrorKind::PermissionDenied => SourceError::PermissionDenied(err.to_string()),
            _ => SourceError::Io(err),
        }
    }

    pub fn is_permission_denied(&self) -> bool {
        matches!(self, SourceError::PermissionDenied(_))
    }
}

/// Feature extraction / outlier model failure.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("empty batch")]
    EmptyBatch,

    #[error("non-finite feature value")]
    NonFinite,

    #[error("shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("model not fitted")]
    NotFitted,

    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;
