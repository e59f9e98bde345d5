//! Error taxonomy for the retrieval engine.
//!
//! Structural problems (dimensions, corrupted or misaligned state) abort the
//! operation with a typed variant. Translation failures never show up here:
//! they are recovered inside [`crate::translate`].

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::embedding::EmbeddingError;

#[derive(Debug, Error)]
pub enum Error {
    /// A vector's length disagrees with the index dimension.
    #[error("Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// A zero-length vector cannot establish or match an index dimension.
    #[error("Vectors must have at least one component")]
    EmptyVector,

    /// A build was attempted with no documents.
    #[error("Cannot build an index from an empty corpus")]
    EmptyCorpus,

    #[error("Vector index not found at '{}'", path.display())]
    IndexNotFound { path: PathBuf },

    #[error("Metadata not found at '{}'", path.display())]
    MetadataNotFound { path: PathBuf },

    #[error("Vector index at '{}' is corrupt: {reason}", path.display())]
    CorruptIndex { path: PathBuf, reason: String },

    #[error("Metadata at '{}' is corrupt: {source}", path.display())]
    CorruptMetadata {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The index and the metadata store no longer describe the same rows.
    #[error("Index and metadata are out of sync: {0}")]
    CorruptState(String),

    #[error("Malformed record on line {line}: {source}")]
    MalformedRecord {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
