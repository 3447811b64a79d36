//! Store error types.

use std::path::PathBuf;

use pointcast_common::CommonError;
use thiserror::Error;

use crate::schema::ValidationReport;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Failed to prepare store location {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid write mode '{0}': expected 'append' or 'replace'")]
    InvalidMode(String),

    #[error("Cannot write empty table '{0}'")]
    EmptyTable(String),

    #[error("Invalid table name '{0}'")]
    InvalidTableName(String),

    #[error("Table '{0}' not found. Create it by writing data first.")]
    TableNotFound(String),

    #[error("No schema registered for table '{0}'")]
    SchemaNotRegistered(String),

    #[error("Schema mismatch: {}", .0.join("; "))]
    SchemaMismatch(Vec<String>),

    #[error("Deep validation failed: {0}")]
    Validation(ValidationReport),

    #[error("Column '{column}' has unsupported declared type '{declared}'")]
    UnsupportedColumn { column: String, declared: String },

    #[error("Table error: {0}")]
    Table(#[from] CommonError),
}

pub type StoreResult<T> = Result<T, StoreError>;
