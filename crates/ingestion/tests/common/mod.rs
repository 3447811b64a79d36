//! Common test utilities for ingestion integration tests.
//!
//! Archive files written by `test_utils::ArchiveBuilder` carry plain-text
//! payloads instead of GRIB2 messages; [`PayloadExtractor`] reads them back.

use std::path::Path;

use chrono::{DateTime, Utc};
use pointcast_common::Location;
use pointcast_ingestion::{ExtractError, PointExtractor, PointValues};
use test_utils::parse_forecast_payload;

/// Extractor over `test_utils::forecast_payload` files.
pub struct PayloadExtractor;

impl PointExtractor for PayloadExtractor {
    fn extract(&self, path: &Path, locations: &[Location]) -> Result<PointValues, ExtractError> {
        let body = std::fs::read_to_string(path).map_err(|source| ExtractError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let (time, values) =
            parse_forecast_payload(&body, locations.len()).map_err(|message| {
                ExtractError::Decode {
                    path: path.to_path_buf(),
                    message,
                }
            })?;
        Ok(values.into_iter().map(|(idx, v)| (idx, (time, v))).collect())
    }
}

pub fn utc(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
    use chrono::TimeZone;
    Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
}
