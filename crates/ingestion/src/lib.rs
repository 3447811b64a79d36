//! Forecast archive ingestion library.
//!
//! Turns a directory tree of per-run gridded forecast files into
//! per-location wide timeseries tables.
//!
//! # Architecture
//!
//! - [`filename`]: filename grammar parsing
//! - [`discovery`]: variable catalog sampling and the single-pass file index
//! - [`extractor`]: the point extraction seam, plus a GRIB2 implementation
//! - [`collector`]: bounded worker pool fan-out/fan-in over file lists
//! - [`timeseries`]: last-write-wins dedup and wide-table assembly
//! - [`workspace`]: per-run scratch directory for staged decode inputs
//! - [`cancel`]: stop flag checked between runs, variables and files

pub mod cancel;
pub mod collector;
pub mod discovery;
pub mod error;
pub mod extractor;
pub mod filename;
mod grib2;
pub mod timeseries;
pub mod workspace;

// Re-exports
pub use cancel::CancelFlag;
pub use collector::{
    default_workers, CollectionReport, CollectorOptions, ParallelCollector, VariableSamples,
};
pub use discovery::{
    discover_variables, find_all_files, find_all_files_with_cancel, find_variable_files,
    list_run_directories, FileIndex, VariableCatalog, IN_PROGRESS_RUN,
};
pub use error::{ExtractError, IngestionError, Result};
pub use extractor::{PointExtractor, PointValues};
pub use filename::{is_ensemble_file, parse_filename, FileDescriptor};
pub use grib2::GribPointExtractor;
pub use timeseries::{dedup_last_write_wins, Timeseries, TimeseriesBuilder};
pub use workspace::{ScratchWorkspace, StagedFile};
