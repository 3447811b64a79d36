//! Variable catalog sampling and archive-wide file indexing.
//!
//! The archive root holds one directory per forecast run, named so that
//! lexicographic order is chronological. The directory called
//! [`IN_PROGRESS_RUN`] is still being written and is never scanned.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use pointcast_common::VariableKey;
use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

use crate::cancel::CancelFlag;
use crate::error::{IngestionError, Result};
use crate::filename::{is_ensemble_file, parse_filename, FileDescriptor};

/// Reserved run directory name for the run currently being downloaded.
pub const IN_PROGRESS_RUN: &str = "today";

/// Log scan progress every this many run directories.
const PROGRESS_INTERVAL: usize = 1000;

/// Variables and their levels, as sampled from one run.
///
/// Single-level variables map to `[None]`; model-level variables map to
/// their sorted level tokens.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariableCatalog {
    variables: BTreeMap<String, Vec<Option<String>>>,
}

impl VariableCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a (variable, level) pair. Duplicates are ignored.
    pub fn insert(&mut self, variable: &str, level: Option<&str>) {
        let levels = self.variables.entry(variable.to_string()).or_default();
        let level = level.map(str::to_string);
        if !levels.contains(&level) {
            levels.push(level);
            levels.sort();
        }
    }

    pub fn levels(&self, variable: &str) -> Option<&[Option<String>]> {
        self.variables.get(variable).map(Vec::as_slice)
    }

    pub fn variables(&self) -> impl Iterator<Item = &str> {
        self.variables.keys().map(String::as_str)
    }

    /// Every (variable, level) key in catalog order.
    pub fn keys(&self) -> Vec<VariableKey> {
        self.variables
            .iter()
            .flat_map(|(var, levels)| {
                levels
                    .iter()
                    .map(move |level| VariableKey::new(var.clone(), level.clone()))
            })
            .collect()
    }

    /// Number of (variable, level) combinations.
    pub fn len(&self) -> usize {
        self.variables.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }
}

/// Files per (variable, level), in discovery order.
#[derive(Debug, Clone, Default)]
pub struct FileIndex {
    files: BTreeMap<VariableKey, Vec<PathBuf>>,
}

impl FileIndex {
    pub fn get(&self, key: &VariableKey) -> Option<&[PathBuf]> {
        self.files.get(key).map(Vec::as_slice)
    }

    pub fn keys(&self) -> impl Iterator<Item = &VariableKey> {
        self.files.keys()
    }

    /// Number of (variable, level) combinations with at least one file.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn total_files(&self) -> usize {
        self.files.values().map(Vec::len).sum()
    }

    fn push(&mut self, key: VariableKey, path: PathBuf) {
        self.files.entry(key).or_default().push(path);
    }
}

/// Sorted run directories under `root`, excluding the in-progress run.
pub fn list_run_directories(root: &Path) -> Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    for entry in std::fs::read_dir(root)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() && entry.file_name() != IN_PROGRESS_RUN {
            dirs.push(entry.path());
        }
    }
    dirs.sort();
    Ok(dirs)
}

/// Discover the variable catalog by scanning the first run directory.
///
/// Only one run is read, so a variable that first appears in a later run
/// is not part of the catalog.
pub fn discover_variables(root: &Path) -> Result<VariableCatalog> {
    let sample_dir = list_run_directories(root)?
        .into_iter()
        .next()
        .ok_or_else(|| {
            IngestionError::NotFound(format!(
                "No valid run directories found in {}",
                root.display()
            ))
        })?;

    info!(run = %sample_dir.display(), "Scanning run to discover variables");

    let mut catalog = VariableCatalog::new();
    for entry in WalkDir::new(&sample_dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        if let Some(descriptor) = deterministic_descriptor(&entry) {
            catalog.insert(&descriptor.variable, descriptor.level.as_deref());
        }
    }

    info!(
        variables = ?catalog.variables().collect::<Vec<_>>(),
        combinations = catalog.len(),
        "Discovered variables"
    );
    Ok(catalog)
}

/// Build the (variable, level) → files index in one pass over every run.
///
/// Files whose forecast hour exceeds `max_forecast_hours` and ensemble
/// variants are skipped. Lists are ordered by run directory, then file
/// name, so later runs come after earlier ones.
pub fn find_all_files(root: &Path, max_forecast_hours: u32) -> Result<FileIndex> {
    find_all_files_with_cancel(root, max_forecast_hours, &CancelFlag::new())
}

/// [`find_all_files`] that stops with [`IngestionError::Cancelled`] at the
/// next run directory once `cancel` is set.
pub fn find_all_files_with_cancel(
    root: &Path,
    max_forecast_hours: u32,
    cancel: &CancelFlag,
) -> Result<FileIndex> {
    info!(
        root = %root.display(),
        max_forecast_hours,
        "Scanning all run directories once for all variables"
    );

    let mut index = FileIndex::default();
    let mut skipped_hours = 0usize;
    scan_archive(root, cancel, |descriptor, path| {
        if descriptor.forecast_hour > max_forecast_hours {
            skipped_hours += 1;
            return;
        }
        index.push(descriptor.key(), path);
    })?;

    info!(
        files = index.total_files(),
        combinations = index.len(),
        skipped_beyond_cutoff = skipped_hours,
        "File discovery complete"
    );
    Ok(index)
}

/// Files for a single (variable, level), with their forecast hours.
///
/// Walks the whole archive; prefer [`find_all_files`] when more than one
/// key is needed.
pub fn find_variable_files(
    root: &Path,
    key: &VariableKey,
    max_forecast_hours: u32,
) -> Result<Vec<(PathBuf, u32)>> {
    let mut files = Vec::new();
    scan_archive(root, &CancelFlag::new(), |descriptor, path| {
        if descriptor.forecast_hour <= max_forecast_hours && descriptor.key() == *key {
            files.push((path, descriptor.forecast_hour));
        }
    })?;
    info!(key = %key, files = files.len(), "Selected files for variable");
    Ok(files)
}

/// Walk `root/<run>/<file>` in sorted order, calling `visit` for every
/// deterministic forecast file. `cancel` is checked before each run.
fn scan_archive<F>(root: &Path, cancel: &CancelFlag, mut visit: F) -> Result<()>
where
    F: FnMut(FileDescriptor, PathBuf),
{
    let walker = WalkDir::new(root)
        .min_depth(1)
        .max_depth(2)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() != 1 || is_run_directory(e));

    let mut runs = 0usize;
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() > 1 => {
                warn!(error = %e, "Skipping unreadable archive entry");
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        if entry.depth() == 1 {
            if cancel.is_cancelled() {
                info!(runs, "Archive scan cancelled");
                return Err(IngestionError::Cancelled);
            }
            runs += 1;
            if runs % PROGRESS_INTERVAL == 0 {
                info!(runs, "Scanned run directories");
            }
            continue;
        }

        if !entry.file_type().is_file() {
            continue;
        }
        if let Some(descriptor) = deterministic_descriptor(&entry) {
            visit(descriptor, entry.into_path());
        }
    }

    debug!(runs, "Archive scan finished");
    Ok(())
}

fn is_run_directory(entry: &DirEntry) -> bool {
    entry.file_type().is_dir() && entry.file_name() != IN_PROGRESS_RUN
}

fn deterministic_descriptor(entry: &DirEntry) -> Option<FileDescriptor> {
    let name = entry.file_name().to_str()?;
    if is_ensemble_file(name) {
        return None;
    }
    parse_filename(name)
}
