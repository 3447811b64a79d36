//! Bounded worker pool that extracts point samples from many files.
//!
//! A variable's file list is split into chunks (about four per worker) and
//! handed to a rayon pool. Workers share nothing: each returns its chunk's
//! samples and counters over a channel, and the coordinator merges results
//! in whatever order they complete.

use std::collections::{BTreeMap, HashMap};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use crossbeam_channel::unbounded;
use pointcast_common::{Location, VariableKey};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::cancel::CancelFlag;
use crate::discovery::{FileIndex, VariableCatalog};
use crate::error::{ExtractError, IngestionError, Result};
use crate::extractor::PointExtractor;
use crate::timeseries::TimeseriesBuilder;

/// Chunks handed to each worker; smooths out slow files.
pub const DEFAULT_CHUNKS_PER_WORKER: usize = 4;

/// Detailed per-file errors kept per variable.
pub const MAX_SAMPLE_ERRORS: usize = 5;

/// Log progress every this many processed files.
const PROGRESS_INTERVAL: usize = 1000;

/// `max(4, 75% of available hardware threads)`.
pub fn default_workers() -> usize {
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4);
    ((cpus as f64 * 0.75) as usize).max(4)
}

/// Worker pool sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorOptions {
    pub workers: usize,
    pub chunks_per_worker: usize,
}

impl Default for CollectorOptions {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            chunks_per_worker: DEFAULT_CHUNKS_PER_WORKER,
        }
    }
}

impl CollectorOptions {
    /// Files per chunk for a list of `n_files`.
    pub fn chunk_size(&self, n_files: usize) -> usize {
        (n_files / (self.workers.max(1) * self.chunks_per_worker.max(1))).max(1)
    }
}

/// Outcome counters for one variable.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectionReport {
    pub key: VariableKey,
    pub files: usize,
    pub processed: usize,
    pub failed: usize,
    /// Files left unread because the run was cancelled.
    pub skipped: usize,
    /// Up to [`MAX_SAMPLE_ERRORS`] failure messages.
    pub sample_errors: Vec<String>,
}

impl CollectionReport {
    /// Percentage of files that were extracted successfully.
    pub fn success_rate(&self) -> f64 {
        if self.files == 0 {
            return 100.0;
        }
        100.0 * self.processed as f64 / self.files as f64
    }
}

/// Raw samples for one variable, per location, in discovery order.
#[derive(Debug, Clone)]
pub struct VariableSamples {
    pub key: VariableKey,
    pub per_location: BTreeMap<usize, Vec<(DateTime<Utc>, f64)>>,
    pub report: CollectionReport,
}

/// Samples tagged with the position of their source file in the input list.
type OrderedSamples = HashMap<usize, Vec<(usize, DateTime<Utc>, f64)>>;

struct ChunkResult {
    samples: OrderedSamples,
    processed: usize,
    failed: usize,
    skipped: usize,
    errors: Vec<String>,
}

/// Fans file lists out over a fixed-size thread pool.
pub struct ParallelCollector {
    pool: rayon::ThreadPool,
    options: CollectorOptions,
    cancel: CancelFlag,
}

impl ParallelCollector {
    pub fn new(options: CollectorOptions) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(options.workers.max(1))
            .thread_name(|i| format!("extract-{i}"))
            .build()
            .map_err(|e| IngestionError::WorkerPool(e.to_string()))?;
        Ok(Self {
            pool,
            options,
            cancel: CancelFlag::new(),
        })
    }

    /// Stop between files once `cancel` is set.
    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn options(&self) -> CollectorOptions {
        self.options
    }

    /// Extract every file of one variable for all locations.
    ///
    /// Per-file failures are counted in the report; this never fails. After
    /// cancellation the remaining files are counted as skipped.
    pub fn collect(
        &self,
        key: &VariableKey,
        files: &[PathBuf],
        locations: &[Location],
        extractor: Arc<dyn PointExtractor>,
    ) -> VariableSamples {
        let chunk_size = self.options.chunk_size(files.len());
        let chunks: Vec<(usize, Vec<PathBuf>)> = files
            .chunks(chunk_size)
            .enumerate()
            .map(|(i, chunk)| (i * chunk_size, chunk.to_vec()))
            .collect();

        info!(
            key = %key,
            files = files.len(),
            chunks = chunks.len(),
            chunk_size,
            workers = self.options.workers,
            "Processing variable"
        );

        let locations: Arc<[Location]> = Arc::from(locations);
        let expected = chunks.len();
        let (tx, rx) = unbounded::<ChunkResult>();
        for (offset, chunk) in chunks {
            let tx = tx.clone();
            let extractor = Arc::clone(&extractor);
            let locations = Arc::clone(&locations);
            let cancel = self.cancel.clone();
            self.pool.spawn(move || {
                let result =
                    process_chunk(offset, &chunk, &locations, extractor.as_ref(), &cancel);
                // receiver outlives every worker
                let _ = tx.send(result);
            });
        }
        drop(tx);

        let mut merged: OrderedSamples = HashMap::new();
        let mut processed = 0usize;
        let mut failed = 0usize;
        let mut skipped = 0usize;
        let mut sample_errors = Vec::new();
        let mut received = 0usize;

        for chunk in rx.iter() {
            received += 1;
            let before = (processed + failed) / PROGRESS_INTERVAL;
            processed += chunk.processed;
            failed += chunk.failed;
            skipped += chunk.skipped;
            for (loc, samples) in chunk.samples {
                merged.entry(loc).or_default().extend(samples);
            }
            for err in chunk.errors {
                if sample_errors.len() < MAX_SAMPLE_ERRORS {
                    sample_errors.push(err);
                }
            }
            if (processed + failed) / PROGRESS_INTERVAL > before {
                info!(key = %key, done = processed + failed, total = files.len(), "Progress");
            }
        }

        if received != expected {
            warn!(key = %key, expected, received, "Some chunks never reported back");
            failed += files.len().saturating_sub(processed + failed + skipped);
        }

        // completion order is arbitrary; restore discovery order
        let per_location = merged
            .into_iter()
            .map(|(loc, mut samples)| {
                samples.sort_by_key(|(ordinal, _, _)| *ordinal);
                let series = samples.into_iter().map(|(_, t, v)| (t, v)).collect();
                (loc, series)
            })
            .collect();

        let report = CollectionReport {
            key: key.clone(),
            files: files.len(),
            processed,
            failed,
            skipped,
            sample_errors,
        };
        log_report(&report);

        VariableSamples {
            key: key.clone(),
            per_location,
            report,
        }
    }

    /// Collect every catalog key and feed the results into a builder.
    ///
    /// Keys without files keep their (all-null) column in the output.
    /// Returns [`IngestionError::Cancelled`] instead of a partial result
    /// once the cancel flag is set.
    pub fn collect_catalog(
        &self,
        catalog: &VariableCatalog,
        index: &FileIndex,
        locations: &[Location],
        extractor: Arc<dyn PointExtractor>,
    ) -> Result<(TimeseriesBuilder, Vec<CollectionReport>)> {
        let keys = catalog.keys();
        let mut builder = TimeseriesBuilder::new();
        let mut reports = Vec::with_capacity(keys.len());

        let unsampled = index.keys().filter(|k| !keys.contains(k)).count();
        if unsampled > 0 {
            debug!(
                unsampled,
                "Indexed variables missing from the sampled run are not collected"
            );
        }

        for (i, key) in keys.iter().enumerate() {
            if self.cancel.is_cancelled() {
                info!(collected = i, total = keys.len(), "Collection cancelled");
                return Err(IngestionError::Cancelled);
            }
            let column = key.column_name();
            info!(current = i + 1, total = keys.len(), column = %column, "Collecting variable");
            builder.expect_column(&column);

            let Some(files) = index.get(key) else {
                warn!(column = %column, "No files found for variable");
                continue;
            };

            let samples = self.collect(key, files, locations, Arc::clone(&extractor));
            for (loc, series) in &samples.per_location {
                builder.add_series(*loc, &column, series);
            }
            reports.push(samples.report);
        }

        // the last variable may have been cut short
        if self.cancel.is_cancelled() {
            return Err(IngestionError::Cancelled);
        }
        Ok((builder, reports))
    }
}

/// Sequentially extract one chunk; never panics past this boundary.
fn process_chunk(
    offset: usize,
    files: &[PathBuf],
    locations: &[Location],
    extractor: &dyn PointExtractor,
    cancel: &CancelFlag,
) -> ChunkResult {
    let mut result = ChunkResult {
        samples: HashMap::new(),
        processed: 0,
        failed: 0,
        skipped: 0,
        errors: Vec::new(),
    };

    for (i, path) in files.iter().enumerate() {
        if cancel.is_cancelled() {
            result.skipped = files.len() - i;
            break;
        }
        let outcome = catch_unwind(AssertUnwindSafe(|| extractor.extract(path, locations)))
            .unwrap_or_else(|_| Err(ExtractError::Panicked(path.clone())));

        match outcome {
            Ok(values) => {
                for (loc, (time, value)) in values {
                    result
                        .samples
                        .entry(loc)
                        .or_default()
                        .push((offset + i, time, value));
                }
                result.processed += 1;
            }
            Err(e) => {
                result.failed += 1;
                if result.errors.len() < MAX_SAMPLE_ERRORS {
                    result.errors.push(e.to_string());
                }
            }
        }
    }
    result
}

fn log_report(report: &CollectionReport) {
    if report.failed > 0 {
        warn!(
            key = %report.key,
            failed = report.failed,
            files = report.files,
            "Failed to process some files"
        );
        for err in &report.sample_errors {
            warn!(key = %report.key, error = %err, "Sample extraction failure");
        }
    }
    if report.skipped > 0 {
        info!(key = %report.key, skipped = report.skipped, "Files skipped after cancellation");
    }
    info!(
        key = %report.key,
        processed = report.processed,
        files = report.files,
        success_rate = format!("{:.1}%", report.success_rate()),
        "Variable collected"
    );
}
