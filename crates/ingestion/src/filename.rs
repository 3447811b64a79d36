//! Forecast filename grammar.
//!
//! Deterministic ICON-D2 files are named
//!
//! ```text
//! icon-d2_de_lat-lon_{model-level|single-level}_{YYYYMMDDHH}_{FFF}_{LEVEL|2d}_{VARIABLE}.grb2
//! ```
//!
//! e.g. `icon-d2_de_lat-lon_model-level_2021010100_001_61_u.grb2` or
//! `icon-d2_de_lat-lon_single-level_2021010100_000_2d_t_2m.grb2`. The
//! variable is everything after the level token and may contain underscores.

use std::path::Path;

use chrono::{DateTime, Utc};
use pointcast_common::{ForecastKind, ValidTime, VariableKey};

/// Fixed filename prefix shared by all deterministic files.
pub const FILENAME_PREFIX: &str = "icon-d2_de_lat-lon_";

/// Marker carried by ensemble-variant files.
pub const ENSEMBLE_MARKER: &str = "icon-d2-eps";

/// GRIB2 file extension.
pub const GRIB_EXTENSION: &str = ".grb2";

/// Level token used by single-level files.
const SINGLE_LEVEL_TOKEN: &str = "2d";

/// Metadata parsed from a forecast filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDescriptor {
    pub kind: ForecastKind,
    pub run_time: DateTime<Utc>,
    pub forecast_hour: u32,
    /// Model level token; `None` for single-level files.
    pub level: Option<String>,
    pub variable: String,
}

impl FileDescriptor {
    pub fn key(&self) -> VariableKey {
        VariableKey::new(self.variable.clone(), self.level.clone())
    }

    pub fn valid_time(&self) -> ValidTime {
        ValidTime::new(self.run_time, self.forecast_hour)
    }

    /// Render the canonical filename for this descriptor.
    pub fn filename(&self) -> String {
        format!(
            "{}{}_{}_{:03}_{}_{}{}",
            FILENAME_PREFIX,
            self.kind.as_str(),
            self.run_time.format("%Y%m%d%H"),
            self.forecast_hour,
            self.level.as_deref().unwrap_or(SINGLE_LEVEL_TOKEN),
            self.variable,
            GRIB_EXTENSION
        )
    }
}

/// True when the name carries the ensemble-variant marker.
pub fn is_ensemble_file(name: &str) -> bool {
    name.contains(ENSEMBLE_MARKER)
}

/// Parse a bare filename. Returns `None` for anything outside the grammar.
pub fn parse_filename(name: &str) -> Option<FileDescriptor> {
    let stem = name.strip_suffix(GRIB_EXTENSION)?;
    let rest = stem.strip_prefix(FILENAME_PREFIX)?;

    let mut parts = rest.splitn(5, '_');
    let kind = match parts.next()? {
        "model-level" => ForecastKind::ModelLevel,
        "single-level" => ForecastKind::SingleLevel,
        _ => return None,
    };
    let run_time = ValidTime::parse_run_stamp(parts.next()?)?;

    let hour = parts.next()?;
    if hour.len() != 3 || !hour.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let forecast_hour: u32 = hour.parse().ok()?;

    let level_token = parts.next()?;
    let level = match kind {
        ForecastKind::ModelLevel => {
            if level_token.is_empty() || !level_token.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            Some(level_token.to_string())
        }
        ForecastKind::SingleLevel => {
            if level_token != SINGLE_LEVEL_TOKEN {
                return None;
            }
            None
        }
    };

    let variable = parts.next()?;
    if variable.is_empty() {
        return None;
    }

    Some(FileDescriptor {
        kind,
        run_time,
        forecast_hour,
        level,
        variable: variable.to_string(),
    })
}

/// Parse the file-name component of a path.
pub fn parse_path(path: &Path) -> Option<FileDescriptor> {
    path.file_name()
        .and_then(|s| s.to_str())
        .and_then(parse_filename)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_model_level() {
        let d = parse_filename("icon-d2_de_lat-lon_model-level_2021010103_002_61_u.grb2").unwrap();
        assert_eq!(d.kind, ForecastKind::ModelLevel);
        assert_eq!(d.run_time, Utc.with_ymd_and_hms(2021, 1, 1, 3, 0, 0).unwrap());
        assert_eq!(d.forecast_hour, 2);
        assert_eq!(d.level.as_deref(), Some("61"));
        assert_eq!(d.variable, "u");
        assert_eq!(d.key().column_name(), "u_level61");
    }

    #[test]
    fn test_parse_single_level_with_underscores() {
        let d = parse_filename("icon-d2_de_lat-lon_single-level_2021010100_000_2d_t_2m.grb2").unwrap();
        assert_eq!(d.kind, ForecastKind::SingleLevel);
        assert_eq!(d.level, None);
        assert_eq!(d.variable, "t_2m");

        let d = parse_filename("icon-d2_de_lat-lon_single-level_2021010100_048_2d_a_b_c_d.grb2")
            .unwrap();
        assert_eq!(d.variable, "a_b_c_d");
        assert_eq!(d.forecast_hour, 48);
    }

    #[test]
    fn test_parse_model_level_with_underscores() {
        let name = "icon-d2_de_lat-lon_model-level_2021010100_000_61_qv_s.grb2";
        let d = parse_filename(name).unwrap();
        assert_eq!(d.kind, ForecastKind::ModelLevel);
        assert_eq!(d.level.as_deref(), Some("61"));
        assert_eq!(d.variable, "qv_s");
        assert_eq!(d.key().column_name(), "qv_s_level61");
        assert_eq!(d.filename(), name);
    }

    #[test]
    fn test_round_trip_through_filename() {
        let name = "icon-d2_de_lat-lon_single-level_2021123118_012_2d_aswdifd_s.grb2";
        assert_eq!(parse_filename(name).unwrap().filename(), name);
    }

    #[test]
    fn test_rejects_non_matching() {
        let bad = [
            "",
            "readme.txt",
            "icon-d2_de_lat-lon_model-level_2021010100_001_61_u.grb2.idx",
            "icon-d2_de_lat-lon_model-level_2021010100_001_61_u",
            "icon-d2_de_lat-lon_model-level_2021010100_01_61_u.grb2",
            "icon-d2_de_lat-lon_model-level_202101010_001_61_u.grb2",
            "icon-d2_de_lat-lon_model-level_2021010100_001_2d_u.grb2",
            "icon-d2_de_lat-lon_single-level_2021010100_001_61_t_2m.grb2",
            "icon-d2_de_lat-lon_single-level_2021010100_001_2d_.grb2",
            "icon-d2_de_lat-lon_pressure-level_2021010100_001_500_t.grb2",
            "icon-d2-eps_germany_icosahedral_single-level_2021010100_001_2d_t_2m.grb2",
        ];
        for name in bad {
            assert!(parse_filename(name).is_none(), "should reject {name}");
        }
    }

    #[test]
    fn test_ensemble_marker() {
        assert!(is_ensemble_file(
            "icon-d2-eps_germany_icosahedral_single-level_2021010100_001_2d_t_2m.grb2"
        ));
        assert!(!is_ensemble_file(
            "icon-d2_de_lat-lon_single-level_2021010100_001_2d_t_2m.grb2"
        ));
    }

    #[test]
    fn test_parse_path_uses_file_name() {
        let path = Path::new("/archive/2021010100/icon-d2_de_lat-lon_model-level_2021010100_000_64_v.grb2");
        assert_eq!(parse_path(path).unwrap().key().column_name(), "v_level64");
    }
}
