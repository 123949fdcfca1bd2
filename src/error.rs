/// Error types for the preprocessing pipeline
///
/// Three families:
/// - `ConfigError` - invalid construction parameters, fatal before any record runs
/// - `MetadataError` - the metadata table could not be loaded
/// - `PreprocessError` - a single record failed; counted by the batch, never fatal

use serde::Serialize;
use std::any::Any;
use std::path::PathBuf;
use thiserror::Error;

/// Invalid configuration, raised immediately by `Preprocessor::new`
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("output_format must be 'png' or 'jpg'/'jpeg', got '{0}'")]
    UnsupportedOutputFormat(String),

    #[error("target size must be non-zero, got {height}x{width}")]
    InvalidTargetSize { height: u32, width: u32 },

    #[error("thumbnail size must be non-zero")]
    InvalidThumbnailSize,

    #[error("base_path must not be empty")]
    EmptyBasePath,

    #[error("jpeg_quality must be between 1 and 100, got {0}")]
    InvalidJpegQuality(u8),

    #[error("record_timeout_secs must be at least 1")]
    InvalidTimeout,

    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// The metadata table is unusable (missing columns, bad values, unreadable file)
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("failed to read metadata table: {0}")]
    Csv(#[from] csv::Error),

    #[error("metadata table is missing required column '{0}'")]
    MissingColumn(&'static str),

    #[error("invalid {field} value '{value}'")]
    InvalidField { field: &'static str, value: String },
}

/// Per-record failure. The batch catches all of these.
#[derive(Debug, Error)]
pub enum PreprocessError {
    #[error("file not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("all decode backends failed for {} (last: {backend}: {message})", path.display())]
    Decode {
        path: PathBuf,
        backend: &'static str,
        message: String,
    },

    #[error("normalization failed: {0}")]
    Normalization(String),

    #[error("failed to write {}: {message}", path.display())]
    Write { path: PathBuf, message: String },

    #[error("record timed out after {millis}ms")]
    Timeout { millis: u64 },

    #[error("record cancelled before writing")]
    Cancelled,

    #[error("record processing panicked: {0}")]
    Panicked(String),
}

/// Fieldless classification of a `PreprocessError`, used for counting and reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    NotFound,
    Decode,
    Normalization,
    Write,
    Timeout,
    Panic,
}

impl PreprocessError {
    pub fn kind(&self) -> FailureKind {
        match self {
            PreprocessError::NotFound { .. } => FailureKind::NotFound,
            PreprocessError::Decode { .. } => FailureKind::Decode,
            PreprocessError::Normalization(_) => FailureKind::Normalization,
            PreprocessError::Write { .. } => FailureKind::Write,
            // A cancelled record is always one whose timeout already fired
            PreprocessError::Timeout { .. } | PreprocessError::Cancelled => FailureKind::Timeout,
            PreprocessError::Panicked(_) => FailureKind::Panic,
        }
    }

    /// Wrap a caught panic payload
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_string()
        };
        PreprocessError::Panicked(message)
    }
}
