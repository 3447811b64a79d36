//! Collection pipeline: archive → wide table → store.

use std::future::Future;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use pointcast_common::WideTable;
use pointcast_ingestion::{
    discover_variables, find_all_files_with_cancel, CancelFlag, CollectionReport,
    GribPointExtractor, ParallelCollector, PointExtractor, ScratchWorkspace,
};
use pointcast_store::{SchemaSpec, TableStore, WriteOptions, WriteSummary, DWD_WEATHER};
use tracing::{info, warn};

use crate::config::CollectorConfig;

/// What a finished run produced.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub rows: usize,
    pub columns: usize,
    pub time_range: Option<(DateTime<Utc>, DateTime<Utc>)>,
    pub missing_values: usize,
    pub reports: Vec<CollectionReport>,
    pub write: WriteSummary,
}

impl RunSummary {
    /// `(files, processed, failed)` summed over every collected variable.
    pub fn file_totals(&self) -> (usize, usize, usize) {
        self.reports.iter().fold((0, 0, 0), |(files, ok, failed), r| {
            (files + r.files, ok + r.processed, failed + r.failed)
        })
    }
}

pub struct Pipeline {
    config: CollectorConfig,
    schema: SchemaSpec,
}

impl Pipeline {
    /// Pipeline writing [`DWD_WEATHER`] under its standard schema.
    pub fn new(config: CollectorConfig) -> Self {
        Self {
            config,
            schema: SchemaSpec::dwd_weather(),
        }
    }

    /// Replace the schema the output table is validated against.
    pub fn with_schema(mut self, schema: SchemaSpec) -> Self {
        self.schema = SchemaSpec::new(DWD_WEATHER, schema.columns);
        self
    }

    /// Run against the configured archive with the GRIB2 extractor.
    ///
    /// The scratch workspace is released on every exit path, including
    /// Ctrl-C.
    pub async fn run(&self) -> Result<RunSummary> {
        let workspace = Arc::new(
            ScratchWorkspace::create(&self.config.scratch_dir)
                .context("Failed to prepare scratch workspace")?,
        );
        let extractor: Arc<dyn PointExtractor> =
            Arc::new(GribPointExtractor::new(Arc::clone(&workspace)));

        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Failed to listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        };
        let result = self.run_until(extractor, ctrl_c).await;

        info!("Cleaning up temporary files");
        workspace.cleanup();
        info!("Cleanup complete");
        result
    }

    /// Run with an explicit extractor.
    pub async fn run_with(&self, extractor: Arc<dyn PointExtractor>) -> Result<RunSummary> {
        self.run_until(extractor, std::future::pending::<()>()).await
    }

    /// Run until done or until `interrupt` resolves.
    ///
    /// An interrupt cancels collection and waits for the blocking task to
    /// wind down, so no worker is still reading once this returns. An
    /// interrupted write is rolled back.
    pub async fn run_until<F>(
        &self,
        extractor: Arc<dyn PointExtractor>,
        interrupt: F,
    ) -> Result<RunSummary>
    where
        F: Future,
    {
        tokio::pin!(interrupt);
        for (i, loc) in self.config.locations.iter().enumerate() {
            info!(location = i, latitude = loc.latitude, longitude = loc.longitude, "Configured location");
        }

        let cancel = CancelFlag::new();
        let config = self.config.clone();
        let task_cancel = cancel.clone();
        let mut collection = tokio::task::spawn_blocking(move || {
            collect_dataset(&config, extractor, &task_cancel)
        });

        let joined = tokio::select! {
            joined = &mut collection => joined,
            _ = &mut interrupt => {
                warn!("Interrupted; stopping collection");
                cancel.cancel();
                // workers finish the file in hand, then drain
                if let Err(e) = collection.await {
                    warn!(error = %e, "Collection task failed while stopping");
                }
                bail!("Collection interrupted");
            }
        };
        let (table, reports) = joined.context("Collection task failed")??;

        let time_range = table.time_range();
        let missing_values = table.null_count();
        info!("Step 5: Writing to database");
        info!(rows = table.num_rows(), columns = table.num_columns(), "Combined dataset shape");
        match time_range {
            Some((start, end)) => info!(start = %start, end = %end, "Time range"),
            None => warn!("Dataset has no timestamps"),
        }
        info!(missing_values, "Missing values");

        let write = tokio::select! {
            write = self.write(&table) => write?,
            _ = &mut interrupt => {
                warn!("Interrupted; database write rolled back");
                bail!("Collection interrupted");
            }
        };
        info!(table = DWD_WEATHER, rows = write.rows_in_table, "Data successfully written to database");

        Ok(RunSummary {
            rows: table.num_rows(),
            columns: table.num_columns(),
            time_range,
            missing_values,
            reports,
            write,
        })
    }

    async fn write(&self, table: &WideTable) -> Result<WriteSummary> {
        let store = TableStore::open(&self.config.db_path)
            .await
            .with_context(|| format!("Failed to open store at {:?}", self.config.db_path))?
            .with_schema(self.schema.clone());
        let options = WriteOptions {
            mode: self.config.write_mode,
            deep_validate: self.config.deep_validation,
        };
        store
            .write(DWD_WEATHER, table, options)
            .await
            .with_context(|| format!("Failed to write table {DWD_WEATHER}"))
    }
}

/// Discovery, collection and assembly; blocking.
fn collect_dataset(
    config: &CollectorConfig,
    extractor: Arc<dyn PointExtractor>,
    cancel: &CancelFlag,
) -> Result<(WideTable, Vec<CollectionReport>)> {
    info!(root = %config.data_path.display(), "Step 1: Discovering variables");
    let catalog = discover_variables(&config.data_path)?;

    info!("Step 2: Finding files");
    let index = find_all_files_with_cancel(&config.data_path, config.max_forecast_hours, cancel)?;

    info!(
        combinations = catalog.len(),
        workers = config.collector.workers,
        "Step 3: Collecting variables"
    );
    let collector = ParallelCollector::new(config.collector)?.with_cancel(cancel.clone());
    let (builder, reports) =
        collector.collect_catalog(&catalog, &index, &config.locations, extractor)?;

    info!("Step 4: Building dataset");
    let table = builder.build(&config.locations)?;
    Ok((table, reports))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pointcast_common::Location;
    use pointcast_ingestion::{CollectorOptions, ExtractError, PointValues};
    use pointcast_store::{ColumnSpec, WriteMode};
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};
    use test_utils::{
        forecast_payload, parse_forecast_payload, temp_test_dir_with_prefix, ArchiveBuilder,
    };

    /// Reads the text payloads written by `forecast_payload`.
    struct PayloadExtractor;

    impl PointExtractor for PayloadExtractor {
        fn extract(
            &self,
            path: &Path,
            locations: &[Location],
        ) -> std::result::Result<PointValues, ExtractError> {
            let body = std::fs::read_to_string(path).map_err(|source| ExtractError::Open {
                path: path.to_path_buf(),
                source,
            })?;
            let (time, values) = parse_forecast_payload(&body, locations.len())
                .map_err(|message| ExtractError::Decode {
                    path: path.to_path_buf(),
                    message,
                })?;
            Ok(values.into_iter().map(|(i, v)| (i, (time, v))).collect())
        }
    }

    /// Takes 250ms per file.
    #[derive(Default)]
    struct SlowExtractor {
        calls: AtomicUsize,
    }

    impl PointExtractor for SlowExtractor {
        fn extract(
            &self,
            path: &Path,
            locations: &[Location],
        ) -> std::result::Result<PointValues, ExtractError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(250));
            PayloadExtractor.extract(path, locations)
        }
    }

    fn hour(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2021, 1, 1, h, 0, 0).unwrap()
    }

    fn config(archive: &ArchiveBuilder, out: &tempfile::TempDir) -> CollectorConfig {
        CollectorConfig {
            data_path: archive.root().to_path_buf(),
            db_path: out.path().join("pointcast.sqlite"),
            scratch_dir: out.path().join("scratch"),
            locations: vec![Location::new(53.9, 9.19)],
            collector: CollectorOptions {
                workers: 2,
                chunks_per_worker: 4,
            },
            ..CollectorConfig::default()
        }
    }

    /// Columns produced by the small test archives.
    fn schema() -> SchemaSpec {
        SchemaSpec::new(
            DWD_WEATHER,
            vec![
                ColumnSpec::timestamp("time"),
                ColumnSpec::float("t_2m").between(200.0, 350.0),
                ColumnSpec::float("latitude").between(-90.0, 90.0),
                ColumnSpec::float("longitude").between(-180.0, 180.0),
            ],
        )
    }

    #[tokio::test]
    async fn test_run_writes_joined_table() {
        let archive = ArchiveBuilder::new();
        let run = "2021010100";
        archive.single_level(run, 0, "t_2m", &forecast_payload(hour(0), &[Some(280.5)]));
        archive.single_level(run, 1, "t_2m", &forecast_payload(hour(1), &[Some(281.5)]));
        archive.model_level(run, 0, "61", "u", &forecast_payload(hour(0), &[Some(4.0)]));
        let out = temp_test_dir_with_prefix("pointcast_pipeline_");

        let pipeline = Pipeline::new(config(&archive, &out)).with_schema(schema());
        let summary = pipeline.run_with(Arc::new(PayloadExtractor)).await.unwrap();
        assert_eq!((summary.rows, summary.columns), (2, 5));
        assert_eq!(summary.missing_values, 1);
        assert_eq!(summary.time_range, Some((hour(0), hour(1))));
        assert_eq!(summary.write.rows_in_table, 2);
        assert_eq!(summary.reports.len(), 2);
        assert_eq!(summary.file_totals(), (3, 3, 0));

        let store = TableStore::open(out.path().join("pointcast.sqlite")).await.unwrap();
        let table = store.read(DWD_WEATHER).await.unwrap();
        assert_eq!(
            table.column_names(),
            vec!["time", "t_2m", "u_level61", "latitude", "longitude"]
        );
        assert_eq!(table.float_column("u_level61").unwrap(), &[Some(4.0), None]);

        // a second replace run leaves the same row count
        let summary = pipeline.run_with(Arc::new(PayloadExtractor)).await.unwrap();
        assert_eq!(summary.write.rows_in_table, 2);
    }

    #[tokio::test]
    async fn test_append_mode_accumulates() {
        let archive = ArchiveBuilder::new();
        archive.single_level("2021010100", 0, "t_2m", &forecast_payload(hour(0), &[Some(280.5)]));
        let out = temp_test_dir_with_prefix("pointcast_pipeline_");
        let pipeline = Pipeline::new(CollectorConfig {
            write_mode: WriteMode::Append,
            ..config(&archive, &out)
        })
        .with_schema(schema());

        pipeline.run_with(Arc::new(PayloadExtractor)).await.unwrap();
        let summary = pipeline.run_with(Arc::new(PayloadExtractor)).await.unwrap();
        assert_eq!(summary.write.rows_in_table, 2);
    }

    #[tokio::test]
    async fn test_schema_mismatch_aborts_write() {
        let archive = ArchiveBuilder::new();
        archive.single_level("2021010100", 0, "t_2m", &forecast_payload(hour(0), &[Some(280.5)]));
        let out = temp_test_dir_with_prefix("pointcast_pipeline_");
        // the standard schema wants wind and radiation columns too
        let pipeline = Pipeline::new(config(&archive, &out));

        assert!(pipeline.run_with(Arc::new(PayloadExtractor)).await.is_err());
        let store = TableStore::open(out.path().join("pointcast.sqlite")).await.unwrap();
        assert!(!store.exists(DWD_WEATHER).await.unwrap());
    }

    #[tokio::test]
    async fn test_all_files_failing_is_an_error() {
        let archive = ArchiveBuilder::new();
        archive.single_level("2021010100", 0, "t_2m", "corrupt");
        let out = temp_test_dir_with_prefix("pointcast_pipeline_");
        let pipeline = Pipeline::new(config(&archive, &out)).with_schema(schema());

        let err = pipeline.run_with(Arc::new(PayloadExtractor)).await.unwrap_err();
        assert!(format!("{err:#}").contains("empty"));

        // one good file next to the corrupt one is written, with the failure counted
        archive.single_level("2021010100", 1, "t_2m", &forecast_payload(hour(1), &[Some(281.0)]));
        let summary = pipeline.run_with(Arc::new(PayloadExtractor)).await.unwrap();
        assert_eq!(summary.file_totals(), (2, 1, 1));
    }

    #[tokio::test]
    async fn test_run_releases_workspace() {
        let archive = ArchiveBuilder::new();
        archive.run_dir("2021010100");
        let out = temp_test_dir_with_prefix("pointcast_pipeline_");
        let config = config(&archive, &out);
        let scratch = config.scratch_dir.clone();

        // no variables: the run fails, the workspace is still removed
        assert!(Pipeline::new(config).run().await.is_err());
        assert!(!scratch.exists());
    }

    #[tokio::test]
    async fn test_interrupt_stops_collection_promptly() {
        let archive = ArchiveBuilder::new();
        for h in 0..16 {
            archive.single_level("2021010100", h, "t_2m", &forecast_payload(hour(h), &[Some(280.0)]));
        }
        let out = temp_test_dir_with_prefix("pointcast_pipeline_");
        let pipeline = Pipeline::new(CollectorConfig {
            max_forecast_hours: 48,
            collector: CollectorOptions {
                workers: 1,
                chunks_per_worker: 4,
            },
            ..config(&archive, &out)
        })
        .with_schema(schema());

        let extractor = Arc::new(SlowExtractor::default());
        let started = Instant::now();
        let err = pipeline
            .run_until(extractor.clone(), tokio::time::sleep(Duration::from_millis(50)))
            .await
            .unwrap_err();

        // sixteen files would take four seconds; only the file in hand finishes
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(format!("{err:#}").contains("interrupted"));
        assert!(extractor.calls.load(Ordering::SeqCst) < 4);

        let store = TableStore::open(out.path().join("pointcast.sqlite")).await.unwrap();
        assert!(!store.exists(DWD_WEATHER).await.unwrap());
    }

    #[tokio::test]
    async fn test_interrupt_after_completion_is_ignored() {
        let archive = ArchiveBuilder::new();
        archive.single_level("2021010100", 0, "t_2m", &forecast_payload(hour(0), &[Some(280.5)]));
        let out = temp_test_dir_with_prefix("pointcast_pipeline_");
        let pipeline = Pipeline::new(config(&archive, &out)).with_schema(schema());

        let summary = pipeline
            .run_until(Arc::new(PayloadExtractor), tokio::time::sleep(Duration::from_secs(30)))
            .await
            .unwrap();
        assert_eq!(summary.write.rows_in_table, 1);
    }
}
