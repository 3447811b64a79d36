//! Collector configuration.

use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use pointcast_common::Location;
use pointcast_ingestion::CollectorOptions;
use pointcast_store::{DeepValidation, WriteMode};
use serde::{Deserialize, Serialize};

/// Forecast hours kept per run. Only the freshest hours of each run are
/// used; the next run supersedes the rest.
pub const DEFAULT_MAX_FORECAST_HOURS: u32 = 2;

/// Top-level collector configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorConfig {
    /// Archive root holding one directory per forecast run
    #[serde(default = "default_data_path")]
    pub data_path: PathBuf,

    /// SQLite database file the dataset is written to
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Per-run scratch directory; wiped at start and on exit
    #[serde(default = "default_scratch_dir")]
    pub scratch_dir: PathBuf,

    /// Files with a larger forecast hour are ignored
    #[serde(default = "default_max_forecast_hours")]
    pub max_forecast_hours: u32,

    /// Points to sample, in output order
    #[serde(default = "default_locations")]
    pub locations: Vec<Location>,

    /// Worker pool sizing
    #[serde(default)]
    pub collector: CollectorOptions,

    #[serde(default = "default_write_mode")]
    pub write_mode: WriteMode,

    #[serde(default)]
    pub deep_validation: DeepValidation,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            data_path: default_data_path(),
            db_path: default_db_path(),
            scratch_dir: default_scratch_dir(),
            max_forecast_hours: default_max_forecast_hours(),
            locations: default_locations(),
            collector: CollectorOptions::default(),
            write_mode: default_write_mode(),
            deep_validation: DeepValidation::default(),
        }
    }
}

impl CollectorConfig {
    /// Load configuration from a YAML file.
    ///
    /// `$VAR` and `${VAR}` references are expanded from the environment
    /// before parsing; a leading `~` in paths is expanded too.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {:?}", path))?;
        Self::from_yaml_str(&content)
            .with_context(|| format!("Failed to load config from {:?}", path))
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let expanded = shellexpand::env(content).context("Environment variable expansion failed")?;
        let mut config: Self =
            serde_yaml::from_str(&expanded).context("Failed to parse config YAML")?;
        config.data_path = expand_tilde(&config.data_path);
        config.db_path = expand_tilde(&config.db_path);
        config.scratch_dir = expand_tilde(&config.scratch_dir);
        Ok(config)
    }

    /// Load configuration from environment variables, falling back to
    /// built-in defaults.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(path) = env::var("POINTCAST_DATA_PATH") {
            config.data_path = expand_tilde(Path::new(&path));
        }
        if let Ok(path) = env::var("POINTCAST_DB_PATH") {
            config.db_path = expand_tilde(Path::new(&path));
        }
        if let Ok(path) = env::var("POINTCAST_SCRATCH_DIR") {
            config.scratch_dir = expand_tilde(Path::new(&path));
        }
        if let Ok(hours) = env::var("POINTCAST_MAX_FORECAST_HOURS") {
            config.max_forecast_hours = hours
                .parse()
                .with_context(|| format!("Invalid POINTCAST_MAX_FORECAST_HOURS '{hours}'"))?;
        }
        if let Ok(workers) = env::var("POINTCAST_WORKERS") {
            config.collector.workers = workers
                .parse()
                .with_context(|| format!("Invalid POINTCAST_WORKERS '{workers}'"))?;
        }

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.locations.is_empty() {
            anyhow::bail!("At least one location must be configured");
        }
        for (i, loc) in self.locations.iter().enumerate() {
            if !(-90.0..=90.0).contains(&loc.latitude) || !loc.longitude.is_finite() {
                anyhow::bail!("Location {} has invalid coordinates ({})", i, loc);
            }
        }
        if self.collector.workers == 0 {
            anyhow::bail!("collector.workers must be at least 1");
        }
        if self.collector.chunks_per_worker == 0 {
            anyhow::bail!("collector.chunks_per_worker must be at least 1");
        }
        if self.scratch_dir == self.data_path {
            anyhow::bail!("scratch_dir must differ from data_path; it is wiped on start");
        }
        Ok(())
    }
}

fn expand_tilde(path: &Path) -> PathBuf {
    match path.to_str() {
        Some(s) => PathBuf::from(shellexpand::tilde(s).into_owned()),
        None => path.to_path_buf(),
    }
}

fn default_data_path() -> PathBuf {
    PathBuf::from("data/historical_data")
}

fn default_db_path() -> PathBuf {
    PathBuf::from("data/pointcast.sqlite")
}

fn default_scratch_dir() -> PathBuf {
    env::temp_dir().join("pointcast_scratch")
}

fn default_max_forecast_hours() -> u32 {
    DEFAULT_MAX_FORECAST_HOURS
}

fn default_write_mode() -> WriteMode {
    WriteMode::Replace
}

fn default_locations() -> Vec<Location> {
    vec![
        Location::new(53.908585, 9.193248),
        Location::new(53.518114, 9.918907),
        // Neubrunn
        Location::new(49.735281, 9.703521),
        // Energiepark
        Location::new(51.160670, 12.410260),
    ]
}
