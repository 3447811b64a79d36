//! Persistence for pointcast wide tables.
//!
//! Provides:
//! - Column-level schema specifications with shallow (structure) and deep
//!   (value) validation
//! - A SQLite-backed table store with append/replace writes
//! - The named tables produced by the collector

pub mod error;
pub mod schema;
pub mod store;
pub mod tables;

pub use error::{StoreError, StoreResult};
pub use schema::{
    ColumnSpec, ColumnType, DeepValidation, SchemaSpec, ValidationReport, ValueRange, Violation,
    ViolationKind,
};
pub use store::{TableStore, WriteMode, WriteOptions, WriteSummary};
pub use tables::DWD_WEATHER;
