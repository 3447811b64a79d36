//! Error types for the ingestion crate.

use std::path::PathBuf;

use pointcast_common::CommonError;
use thiserror::Error;

/// Fatal errors that abort a collection run.
#[derive(Error, Debug)]
pub enum IngestionError {
    #[error("Failed to read directory: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Scratch workspace {path} unusable: {source}")]
    Workspace {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to build worker pool: {0}")]
    WorkerPool(String),

    #[error("Collection cancelled")]
    Cancelled,

    #[error("Table assembly failed: {0}")]
    Table(#[from] CommonError),
}

/// Per-file failures reported by a point extractor.
///
/// These are counted by the collector and never abort a run.
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("Failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to decode {path}: {message}")]
    Decode { path: PathBuf, message: String },

    #[error("Unrecognized forecast filename: {0}")]
    UnrecognizedName(PathBuf),

    #[error("Extractor panicked on {0}")]
    Panicked(PathBuf),
}

/// Result type for ingestion operations.
pub type Result<T> = std::result::Result<T, IngestionError>;
