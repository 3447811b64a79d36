//! GRIB2 point extraction backed by the `grib` crate.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use pointcast_common::{wrap_longitude, Location};
use tracing::debug;

use crate::error::ExtractError;
use crate::extractor::{PointExtractor, PointValues};
use crate::filename::parse_path;
use crate::workspace::ScratchWorkspace;

/// Nearest-neighbour extractor for regular lat/lon GRIB2 grids.
///
/// Each file is copied into the scratch workspace before decoding so the
/// archive itself is only ever read sequentially. The valid time comes from
/// the filename (run time + forecast hour); a file holds one snapshot.
pub struct GribPointExtractor {
    workspace: Arc<ScratchWorkspace>,
}

impl GribPointExtractor {
    pub fn new(workspace: Arc<ScratchWorkspace>) -> Self {
        Self { workspace }
    }
}

impl PointExtractor for GribPointExtractor {
    fn extract(&self, path: &Path, locations: &[Location]) -> Result<PointValues, ExtractError> {
        let descriptor =
            parse_path(path).ok_or_else(|| ExtractError::UnrecognizedName(path.to_path_buf()))?;
        let valid_time = descriptor.valid_time().valid_datetime();

        let staged = self
            .workspace
            .stage(path)
            .map_err(|source| ExtractError::Open {
                path: path.to_path_buf(),
                source,
            })?;
        let file = File::open(staged.path()).map_err(|source| ExtractError::Open {
            path: path.to_path_buf(),
            source,
        })?;

        let decode_err = |message: String| ExtractError::Decode {
            path: path.to_path_buf(),
            message,
        };

        let grib2 = grib::from_reader(BufReader::new(file)).map_err(|e| decode_err(e.to_string()))?;
        let (_, submessage) = grib2
            .iter()
            .next()
            .ok_or_else(|| decode_err("no GRIB2 submessages".to_string()))?;

        let latlons = submessage
            .latlons()
            .map_err(|e| decode_err(format!("grid coordinates: {e}")))?;
        let nearest = nearest_grid_points(latlons, locations);

        let decoder = grib::Grib2SubmessageDecoder::from(submessage)
            .map_err(|e| decode_err(format!("decoder: {e}")))?;
        let values: Vec<f32> = decoder
            .dispatch()
            .map_err(|e| decode_err(format!("unpack: {e}")))?
            .collect();

        let mut results = PointValues::with_capacity(locations.len());
        for (idx, grid_index) in nearest.into_iter().enumerate() {
            let value = grid_index.and_then(|i| values.get(i)).copied();
            match value {
                Some(v) if v.is_finite() => {
                    results.insert(idx, (valid_time, v as f64));
                }
                _ => debug!(
                    location = idx,
                    file = %path.display(),
                    "No value at nearest grid point"
                ),
            }
        }
        Ok(results)
    }
}

/// Index of the closest grid point for every location, in one pass over
/// the grid coordinates.
fn nearest_grid_points<I>(latlons: I, locations: &[Location]) -> Vec<Option<usize>>
where
    I: IntoIterator<Item = (f32, f32)>,
{
    let mut best: Vec<Option<(usize, f64)>> = vec![None; locations.len()];
    for (i, (lat, lon)) in latlons.into_iter().enumerate() {
        for (slot, loc) in best.iter_mut().zip(locations) {
            let d = squared_distance(loc, lat as f64, lon as f64);
            if slot.map_or(true, |(_, current)| d < current) {
                *slot = Some((i, d));
            }
        }
    }
    best.into_iter().map(|b| b.map(|(i, _)| i)).collect()
}

fn squared_distance(loc: &Location, lat: f64, lon: f64) -> f64 {
    let dlat = lat - loc.latitude;
    let dlon = wrap_longitude(lon - loc.longitude);
    dlat * dlat + dlon * dlon
}
