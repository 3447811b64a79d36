//! Forecast valid-time handling.

use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// A forecast instant: model run time plus forecast offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ValidTime {
    /// Model run (issue) time
    pub run_time: DateTime<Utc>,
    /// Forecast hour offset from the run time
    pub forecast_hour: u32,
}

impl ValidTime {
    pub fn new(run_time: DateTime<Utc>, forecast_hour: u32) -> Self {
        Self {
            run_time,
            forecast_hour,
        }
    }

    /// The real-world instant the forecast applies to.
    pub fn valid_datetime(&self) -> DateTime<Utc> {
        self.run_time + Duration::hours(self.forecast_hour as i64)
    }

    /// Parse a 10-digit `YYYYMMDDHH` run stamp.
    pub fn parse_run_stamp(stamp: &str) -> Option<DateTime<Utc>> {
        if stamp.len() != 10 || !stamp.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let naive = NaiveDateTime::parse_from_str(&format!("{stamp}0000"), "%Y%m%d%H%M%S").ok()?;
        Some(Utc.from_utc_datetime(&naive))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_datetime_adds_hours() {
        let run = Utc.with_ymd_and_hms(2021, 1, 1, 21, 0, 0).unwrap();
        let vt = ValidTime::new(run, 5);
        assert_eq!(
            vt.valid_datetime(),
            Utc.with_ymd_and_hms(2021, 1, 2, 2, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_parse_run_stamp() {
        assert_eq!(
            ValidTime::parse_run_stamp("2021010103"),
            Some(Utc.with_ymd_and_hms(2021, 1, 1, 3, 0, 0).unwrap())
        );
        assert_eq!(ValidTime::parse_run_stamp("202101010"), None);
        assert_eq!(ValidTime::parse_run_stamp("2021013103x"), None);
        assert_eq!(ValidTime::parse_run_stamp("2021130100"), None);
    }
}
