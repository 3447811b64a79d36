//! Synthetic forecast archive trees.
//!
//! Builds `root/<run>/<file>` layouts with ICON-D2 style filenames. File
//! bodies are plain text payloads understood by the fake extractors used in
//! tests (see [`forecast_payload`]).

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tempfile::TempDir;

/// Run stamp used when a run directory name is not itself a timestamp.
const FALLBACK_STAMP: &str = "2000010100";

/// A temporary archive root, removed on drop.
pub struct ArchiveBuilder {
    dir: TempDir,
}

impl Default for ArchiveBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ArchiveBuilder {
    pub fn new() -> Self {
        Self {
            dir: tempfile::Builder::new()
                .prefix("pointcast_archive_")
                .tempdir()
                .expect("Failed to create archive directory"),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Create (if needed) and return a run directory.
    pub fn run_dir(&self, run: &str) -> PathBuf {
        let path = self.root().join(run);
        fs::create_dir_all(&path).expect("Failed to create run directory");
        path
    }

    /// Write a stray file directly under the root.
    pub fn root_file(&self, name: &str) -> PathBuf {
        let path = self.root().join(name);
        fs::write(&path, b"").expect("Failed to write root file");
        path
    }

    /// Write an arbitrary file into a run directory.
    pub fn file(&self, run: &str, name: &str, contents: &str) -> PathBuf {
        let path = self.run_dir(run).join(name);
        fs::write(&path, contents).expect("Failed to write archive file");
        path
    }

    pub fn model_level(&self, run: &str, hour: u32, level: &str, variable: &str, contents: &str) -> PathBuf {
        let name = icon_filename("model-level", stamp_for(run), hour, level, variable);
        self.file(run, &name, contents)
    }

    pub fn single_level(&self, run: &str, hour: u32, variable: &str, contents: &str) -> PathBuf {
        let name = icon_filename("single-level", stamp_for(run), hour, "2d", variable);
        self.file(run, &name, contents)
    }

    /// An ensemble-variant file that discovery must ignore.
    pub fn ensemble(&self, run: &str, hour: u32, variable: &str, contents: &str) -> PathBuf {
        let name = format!(
            "icon-d2-eps_germany_icosahedral_single-level_{}_{:03}_2d_{}.grb2",
            stamp_for(run),
            hour,
            variable
        );
        self.file(run, &name, contents)
    }
}

/// `icon-d2_de_lat-lon_{kind}_{stamp}_{hour:03}_{level}_{variable}.grb2`
pub fn icon_filename(kind: &str, stamp: &str, hour: u32, level: &str, variable: &str) -> String {
    format!("icon-d2_de_lat-lon_{kind}_{stamp}_{hour:03}_{level}_{variable}.grb2")
}

/// Text payload: valid time followed by one value per location.
///
/// `None` marks a location whose lookup should fail.
pub fn forecast_payload(valid_time: DateTime<Utc>, values: &[Option<f64>]) -> String {
    let mut out = valid_time.to_rfc3339();
    for value in values {
        out.push(' ');
        match value {
            Some(v) => out.push_str(&v.to_string()),
            None => out.push('-'),
        }
    }
    out
}

/// Decode a [`forecast_payload`] body for `n_locations` locations.
///
/// Returns the valid time and the `(location index, value)` pairs that are
/// present; `-` and missing trailing values are omitted. Any token that does
/// not parse fails the whole payload.
pub fn parse_forecast_payload(
    body: &str,
    n_locations: usize,
) -> Result<(DateTime<Utc>, Vec<(usize, f64)>), String> {
    let mut tokens = body.split_whitespace();
    let time = tokens
        .next()
        .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
        .map(|t| t.with_timezone(&Utc))
        .ok_or_else(|| "bad valid time".to_string())?;

    let mut values = Vec::new();
    for (idx, token) in tokens.take(n_locations).enumerate() {
        if token == "-" {
            continue;
        }
        let value: f64 = token.parse().map_err(|_| format!("bad value {token:?}"))?;
        values.push((idx, value));
    }
    Ok((time, values))
}

fn stamp_for(run: &str) -> &str {
    if run.len() == 10 && run.bytes().all(|b| b.is_ascii_digit()) {
        run
    } else {
        FALLBACK_STAMP
    }
}
