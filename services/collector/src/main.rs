//! Forecast timeseries collector.
//!
//! Scans a DWD ICON-D2 archive, extracts point values for the configured
//! locations and writes one wide table to the local store.

mod config;
mod pipeline;

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use pointcast_store::{DeepValidation, WriteMode};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use config::CollectorConfig;
use pipeline::Pipeline;

#[derive(Parser, Debug)]
#[command(name = "pointcast-collector")]
#[command(about = "Collect per-location forecast timeseries from a GRIB2 archive")]
struct Args {
    /// Configuration file path (defaults come from the environment)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Archive root override
    #[arg(long)]
    data_path: Option<PathBuf>,

    /// Database file override
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Maximum forecast hour to include
    #[arg(long)]
    max_forecast_hours: Option<u32>,

    /// Worker threads
    #[arg(short, long)]
    workers: Option<usize>,

    /// Write mode: append or replace
    #[arg(long)]
    mode: Option<WriteMode>,

    /// Deep validation: skip, warn or enforce
    #[arg(long, value_parser = parse_deep_validation)]
    deep_validation: Option<DeepValidation>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(true)
        .json()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting forecast timeseries collector");

    let mut config = match &args.config {
        Some(path) => CollectorConfig::from_yaml(path)?,
        None => CollectorConfig::from_env()?,
    };
    apply_overrides(&mut config, &args);
    config.validate()?;

    info!(
        data_path = %config.data_path.display(),
        db_path = %config.db_path.display(),
        locations = config.locations.len(),
        max_forecast_hours = config.max_forecast_hours,
        workers = config.collector.workers,
        mode = %config.write_mode,
        "Loaded configuration"
    );

    let summary = Pipeline::new(config).run().await?;

    let (files, processed, failed) = summary.file_totals();
    info!(
        variables = summary.reports.len(),
        files,
        processed,
        failed,
        "Collection totals"
    );

    info!(
        rows = summary.rows,
        columns = summary.columns,
        rows_in_table = summary.write.rows_in_table,
        "Pipeline completed successfully"
    );
    Ok(())
}

fn apply_overrides(config: &mut CollectorConfig, args: &Args) {
    if let Some(path) = &args.data_path {
        config.data_path = path.clone();
    }
    if let Some(path) = &args.db_path {
        config.db_path = path.clone();
    }
    if let Some(hours) = args.max_forecast_hours {
        config.max_forecast_hours = hours;
    }
    if let Some(workers) = args.workers {
        config.collector.workers = workers;
    }
    if let Some(mode) = args.mode {
        config.write_mode = mode;
    }
    if let Some(deep) = args.deep_validation {
        config.deep_validation = deep;
    }
}

fn parse_deep_validation(s: &str) -> Result<DeepValidation, String> {
    match s {
        "skip" => Ok(DeepValidation::Skip),
        "warn" => Ok(DeepValidation::Warn),
        "enforce" => Ok(DeepValidation::Enforce),
        other => Err(format!("expected skip, warn or enforce, got '{other}'")),
    }
}
