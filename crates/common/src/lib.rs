//! Common types shared across the pointcast crates.
//!
//! Locations, variable keys, forecast valid times and the wide table that
//! flows from the timeseries builder into the store.

pub mod error;
pub mod location;
pub mod table;
pub mod time;
pub mod variable;

pub use error::{CommonError, CommonResult};
pub use location::{wrap_longitude, Location};
pub use table::{Column, ColumnData, WideTable, LATITUDE_COLUMN, LONGITUDE_COLUMN, TIME_COLUMN};
pub use time::ValidTime;
pub use variable::{ForecastKind, VariableKey};
