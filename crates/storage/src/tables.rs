//! Named tables written by the collector.

use crate::schema::{ColumnSpec, SchemaSpec};

/// Level-0 DWD ICON-D2 point forecasts.
pub const DWD_WEATHER: &str = "L0_DwdWeather";

impl SchemaSpec {
    /// Schema of [`DWD_WEATHER`].
    pub fn dwd_weather() -> Self {
        let mut columns = vec![
            ColumnSpec::timestamp("time").describe("Valid forecast time"),
            ColumnSpec::float("v_10m").describe("Northward wind at 10m (m/s)"),
            ColumnSpec::float("u_10m").describe("Eastward wind at 10m (m/s)"),
        ];
        for (level, height) in [(61, 184), (62, 127), (63, 78), (64, 38)] {
            columns.push(
                ColumnSpec::float(format!("v_level{level}"))
                    .describe(format!("Northward wind at ~{height}m")),
            );
        }
        for (level, height) in [(61, 184), (62, 127), (63, 78), (64, 38)] {
            columns.push(
                ColumnSpec::float(format!("u_level{level}"))
                    .describe(format!("Eastward wind at ~{height}m")),
            );
        }
        columns.extend([
            ColumnSpec::float("aswdir_s")
                .ge(0.0)
                .describe("Direct shortwave radiation (W/m²)"),
            ColumnSpec::float("aswdifd_s")
                .ge(0.0)
                .describe("Diffuse shortwave radiation (W/m²)"),
            ColumnSpec::float("t_2m")
                .between(200.0, 350.0)
                .describe("Temperature at 2m (K)"),
            ColumnSpec::float("latitude").between(-90.0, 90.0).describe("Latitude"),
            ColumnSpec::float("longitude")
                .between(-180.0, 180.0)
                .describe("Longitude"),
        ]);
        SchemaSpec::new(DWD_WEATHER, columns)
    }
}
