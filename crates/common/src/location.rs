//! Geographic point locations.

use serde::{Deserialize, Serialize};

/// A point of interest for timeseries extraction.
///
/// A location's identity is its index in the configured location list; the
/// coordinates are only used for grid lookup and as row metadata.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    #[serde(alias = "lat")]
    pub latitude: f64,
    #[serde(alias = "lon")]
    pub longitude: f64,
}

impl Location {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Longitude normalised into [-180, 180).
    pub fn normalized_longitude(&self) -> f64 {
        wrap_longitude(self.longitude)
    }
}

/// Wrap any longitude (or longitude difference) into [-180, 180).
pub fn wrap_longitude(lon: f64) -> f64 {
    let wrapped = (lon + 180.0).rem_euclid(360.0) - 180.0;
    if wrapped == 180.0 {
        -180.0
    } else {
        wrapped
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "lat={}, lon={}", self.latitude, self.longitude)
    }
}
