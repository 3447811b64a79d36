//! Point extraction seam.
//!
//! Decoding gridded files is delegated to a [`PointExtractor`]. The
//! collector only relies on this trait, so the pipeline can run against
//! canned samples in tests and against [`crate::GribPointExtractor`] in
//! production.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use pointcast_common::Location;

use crate::error::ExtractError;

/// Location index → (valid time, value) for the locations that succeeded.
pub type PointValues = HashMap<usize, (DateTime<Utc>, f64)>;

/// Extracts scalar values at a set of locations from one forecast file.
///
/// Implementations must be callable from many worker threads at once.
/// A location whose lookup fails is left out of the result; only a file
/// that cannot be opened or decoded at all is an `Err`.
pub trait PointExtractor: Send + Sync {
    fn extract(&self, path: &Path, locations: &[Location]) -> Result<PointValues, ExtractError>;
}

impl<T: PointExtractor + ?Sized> PointExtractor for Arc<T> {
    fn extract(&self, path: &Path, locations: &[Location]) -> Result<PointValues, ExtractError> {
        (**self).extract(path, locations)
    }
}

impl<T: PointExtractor + ?Sized> PointExtractor for &T {
    fn extract(&self, path: &Path, locations: &[Location]) -> Result<PointValues, ExtractError> {
        (**self).extract(path, locations)
    }
}
