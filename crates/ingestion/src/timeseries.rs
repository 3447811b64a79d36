//! Deduplication and wide-table assembly.
//!
//! Samples for one (location, variable) may repeat a valid time when
//! forecast windows of consecutive runs overlap. The sample seen last in
//! discovery order wins, so newer runs replace older forecasts.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use pointcast_common::{
    Column, ColumnData, Location, WideTable, LATITUDE_COLUMN, LONGITUDE_COLUMN, TIME_COLUMN,
};
use tracing::{info, warn};

use crate::error::Result;

/// Unique, ascending (valid time, value) pairs.
pub type Timeseries = Vec<(DateTime<Utc>, f64)>;

/// Keep the last value per timestamp, then sort ascending by time.
pub fn dedup_last_write_wins(samples: &[(DateTime<Utc>, f64)]) -> Timeseries {
    let mut by_time = BTreeMap::new();
    for (time, value) in samples {
        by_time.insert(*time, *value);
    }
    by_time.into_iter().collect()
}

/// Accumulates deduplicated series and assembles the combined wide table.
#[derive(Debug, Default)]
pub struct TimeseriesBuilder {
    /// Output columns in insertion order.
    columns: Vec<String>,
    series: BTreeMap<usize, HashMap<String, Timeseries>>,
}

impl TimeseriesBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a column that must appear in the output even without data.
    pub fn expect_column(&mut self, column: &str) {
        if !self.columns.iter().any(|c| c == column) {
            self.columns.push(column.to_string());
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Deduplicate `samples` (in discovery order) and store them.
    ///
    /// Adding the same (location, column) twice appends the new samples
    /// after the existing ones before deduplicating again.
    pub fn add_series(&mut self, location: usize, column: &str, samples: &[(DateTime<Utc>, f64)]) {
        self.expect_column(column);
        let slot = self
            .series
            .entry(location)
            .or_default()
            .entry(column.to_string())
            .or_default();
        if slot.is_empty() {
            *slot = dedup_last_write_wins(samples);
        } else {
            let mut combined = std::mem::take(slot);
            combined.extend_from_slice(samples);
            *slot = dedup_last_write_wins(&combined);
        }
    }

    pub fn series(&self, location: usize, column: &str) -> Option<&Timeseries> {
        self.series.get(&location)?.get(column)
    }

    /// Outer-join every column for one location on time.
    pub fn build_location_table(&self, index: usize, location: &Location) -> Result<WideTable> {
        let empty = HashMap::new();
        let series = self.series.get(&index).unwrap_or(&empty);

        let times: Vec<DateTime<Utc>> = series
            .values()
            .flat_map(|s| s.iter().map(|(t, _)| *t))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let n = times.len();

        let mut table = WideTable::new();
        table.push_column(
            TIME_COLUMN,
            ColumnData::Timestamp(times.iter().copied().map(Some).collect()),
        )?;
        for column in &self.columns {
            let values: Vec<Option<f64>> = match series.get(column) {
                Some(s) => {
                    let lookup: BTreeMap<_, _> = s.iter().copied().collect();
                    times.iter().map(|t| lookup.get(t).copied()).collect()
                }
                None => vec![None; n],
            };
            table.push_column(column.clone(), ColumnData::Float(values))?;
        }
        table.push_column(LATITUDE_COLUMN, ColumnData::Float(vec![Some(location.latitude); n]))?;
        table.push_column(LONGITUDE_COLUMN, ColumnData::Float(vec![Some(location.longitude); n]))?;
        Ok(table)
    }

    /// Build every location's table and stack them in location order.
    ///
    /// Locations without any samples contribute no rows. When nothing was
    /// collected at all the result is an empty table with the expected
    /// columns.
    pub fn build(&self, locations: &[Location]) -> Result<WideTable> {
        for index in self.series.keys().filter(|i| **i >= locations.len()) {
            warn!(location = *index, "Samples for unknown location index ignored");
        }

        let mut tables = Vec::new();
        for (index, location) in locations.iter().enumerate() {
            let table = self.build_location_table(index, location)?;
            if table.is_empty() {
                warn!(location = index, "No data collected for location");
                continue;
            }
            match table.time_range() {
                Some((start, end)) => info!(
                    location = index,
                    rows = table.num_rows(),
                    columns = table.num_columns(),
                    start = %start,
                    end = %end,
                    "Built location table"
                ),
                None => info!(location = index, rows = table.num_rows(), "Built location table"),
            }
            tables.push(table);
        }

        if tables.is_empty() {
            return self.empty_table();
        }
        Ok(WideTable::concat(&tables)?)
    }

    fn empty_table(&self) -> Result<WideTable> {
        let mut columns = vec![Column {
            name: TIME_COLUMN.to_string(),
            data: ColumnData::Timestamp(Vec::new()),
        }];
        columns.extend(
            self.columns
                .iter()
                .chain([LATITUDE_COLUMN.to_string(), LONGITUDE_COLUMN.to_string()].iter())
                .map(|name| Column {
                    name: name.clone(),
                    data: ColumnData::Float(Vec::new()),
                }),
        );
        Ok(WideTable::from_columns(columns)?)
    }
}
