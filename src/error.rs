use std::path::PathBuf;
use thiserror::Error;

use crate::embedding::{EmbeddingError, VectorIndexError};
use crate::generation::GenerationError;

/// Main error type for Lector
#[derive(Error, Debug)]
pub enum LectorError {
    /// Configuration related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration validation errors
    #[error("Configuration validation failed: {errors:?}")]
    ConfigValidation { errors: Vec<ValidationError> },

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    /// Invalid configuration value
    #[error("Invalid configuration value at {path}: {message}")]
    InvalidConfigValue { path: String, message: String },

    /// Chunk window that would never advance
    #[error("Invalid chunking window: size {size}, overlap {overlap} (need size > overlap >= 0)")]
    InvalidChunking { size: usize, overlap: usize },

    /// No built index where one was expected
    #[error("Index not found: {path} (run `lector build` first)")]
    IndexNotFound { path: PathBuf },

    /// Vector dimension disagrees with the index or the embedding model
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Persisted index failed its integrity checks
    #[error("Corrupt index at {path}: {reason}")]
    CorruptIndex { path: PathBuf, reason: String },

    /// Vector index and metadata store disagree on row count
    #[error("Index/metadata alignment broken: {index_len} vectors vs {store_len} metadata rows")]
    Alignment { index_len: usize, store_len: usize },

    /// Retrieval exceeded its deadline
    #[error("Retrieval timed out after {after_ms}ms")]
    RetrievalTimeout { after_ms: u64 },

    /// Embedding errors
    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    /// Vector index errors
    #[error("Vector index error: {0}")]
    VectorIndex(#[from] VectorIndexError),

    /// Answer generation errors
    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),

    /// IO errors
    #[error("IO error: {context}: {source}")]
    Io {
        source: std::io::Error,
        context: String,
    },

    /// TOML deserialization errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization errors
    #[error("TOML serialization error: {0}")]
    TomlSerialization(#[from] toml::ser::Error),

    /// JSON errors
    #[error("JSON error: {context}: {source}")]
    Json {
        source: serde_json::Error,
        context: String,
    },

    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Connection pool errors
    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// Generic errors
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl LectorError {
    /// Shorthand for an I/O error with context
    pub fn io(source: std::io::Error, context: impl Into<String>) -> Self {
        Self::Io {
            source,
            context: context.into(),
        }
    }

    /// Whether the caller may reasonably try the same request again.
    ///
    /// Configuration, alignment and corruption problems are never retryable:
    /// the process must be reconfigured or the index rebuilt.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RetrievalTimeout { .. } | Self::Pool(_) | Self::Io { .. } => true,
            Self::Embedding(e) => matches!(e, EmbeddingError::GenerationError(_)),
            Self::Generation(_) => true,
            Self::Database(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }
}

/// Configuration validation error
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// Path to the configuration key that failed validation
    pub path: String,
    /// Error message describing the validation failure
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Result type for Lector operations
pub type Result<T> = std::result::Result<T, LectorError>;
