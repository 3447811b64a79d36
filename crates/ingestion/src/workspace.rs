//! Scratch workspace for staged decode inputs.
//!
//! One workspace belongs to one pipeline run. It is wiped when created and
//! removed again when dropped, so leftovers from a crashed run never leak
//! into the next one.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tracing::{debug, info, warn};

use crate::error::{IngestionError, Result};

/// Exclusive per-run scratch directory.
#[derive(Debug)]
pub struct ScratchWorkspace {
    root: PathBuf,
    counter: AtomicU64,
    released: AtomicBool,
}

impl ScratchWorkspace {
    /// Reset `root` (remove whatever is there) and recreate it empty.
    pub fn create(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if root.exists() {
            fs::remove_dir_all(&root).map_err(|source| IngestionError::Workspace {
                path: root.clone(),
                source,
            })?;
        }
        fs::create_dir_all(&root).map_err(|source| IngestionError::Workspace {
            path: root.clone(),
            source,
        })?;

        info!(path = %root.display(), "Created scratch workspace");
        Ok(Self {
            root,
            counter: AtomicU64::new(0),
            released: AtomicBool::new(false),
        })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Copy `source` into the workspace under a name unique to this run.
    ///
    /// The copy is deleted when the returned guard drops.
    pub fn stage(&self, source: &Path) -> std::io::Result<StagedFile> {
        let seq = self.counter.fetch_add(1, Ordering::Relaxed);
        let name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let path = self.root.join(format!("{seq:08}_{name}"));
        fs::copy(source, &path)?;
        Ok(StagedFile { path })
    }

    /// Remove the workspace directory. Safe to call more than once.
    pub fn cleanup(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        match fs::remove_dir_all(&self.root) {
            Ok(()) => info!(path = %self.root.display(), "Removed scratch workspace"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.root.display(), error = %e, "Failed to remove scratch workspace"),
        }
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

impl Drop for ScratchWorkspace {
    fn drop(&mut self) {
        self.cleanup();
    }
}

/// A file copied into a [`ScratchWorkspace`]; deleted on drop.
#[derive(Debug)]
pub struct StagedFile {
    path: PathBuf,
}

impl StagedFile {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            debug!(path = %self.path.display(), error = %e, "Staged file already gone");
        }
    }
}
