//! Columnar wide table: one row per time, one column per variable.

use chrono::{DateTime, Utc};

use crate::error::{CommonError, CommonResult};

pub const TIME_COLUMN: &str = "time";
pub const LATITUDE_COLUMN: &str = "latitude";
pub const LONGITUDE_COLUMN: &str = "longitude";

/// Typed, nullable column values.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Timestamp(Vec<Option<DateTime<Utc>>>),
    Float(Vec<Option<f64>>),
}

impl ColumnData {
    pub fn len(&self) -> usize {
        match self {
            ColumnData::Timestamp(v) => v.len(),
            ColumnData::Float(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            ColumnData::Timestamp(_) => "timestamp",
            ColumnData::Float(_) => "float",
        }
    }

    pub fn null_count(&self) -> usize {
        match self {
            ColumnData::Timestamp(v) => v.iter().filter(|x| x.is_none()).count(),
            ColumnData::Float(v) => v.iter().filter(|x| x.is_none()).count(),
        }
    }

    /// An all-null column of the same type.
    fn nulls_like(&self, len: usize) -> ColumnData {
        match self {
            ColumnData::Timestamp(_) => ColumnData::Timestamp(vec![None; len]),
            ColumnData::Float(_) => ColumnData::Float(vec![None; len]),
        }
    }

    fn extend_from(&mut self, other: &ColumnData) -> bool {
        match (self, other) {
            (ColumnData::Timestamp(a), ColumnData::Timestamp(b)) => a.extend_from_slice(b),
            (ColumnData::Float(a), ColumnData::Float(b)) => a.extend_from_slice(b),
            _ => return false,
        }
        true
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub data: ColumnData,
}

/// An ordered set of equally long named columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WideTable {
    columns: Vec<Column>,
    num_rows: usize,
}

impl WideTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from columns, checking lengths and name uniqueness.
    pub fn from_columns(columns: Vec<Column>) -> CommonResult<Self> {
        let mut table = Self::new();
        for column in columns {
            table.push_column(column.name, column.data)?;
        }
        Ok(table)
    }

    pub fn push_column(&mut self, name: impl Into<String>, data: ColumnData) -> CommonResult<()> {
        let name = name.into();
        if self.column(&name).is_some() {
            return Err(CommonError::DuplicateColumn(name));
        }
        if self.columns.is_empty() {
            self.num_rows = data.len();
        } else if data.len() != self.num_rows {
            return Err(CommonError::ColumnLength {
                column: name,
                expected: self.num_rows,
                actual: data.len(),
            });
        }
        self.columns.push(Column { name, data });
        Ok(())
    }

    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    /// True when the table holds no rows (it may still carry columns).
    pub fn is_empty(&self) -> bool {
        self.num_rows == 0
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.num_rows, self.columns.len())
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&ColumnData> {
        self.columns.iter().find(|c| c.name == name).map(|c| &c.data)
    }

    pub fn float_column(&self, name: &str) -> Option<&[Option<f64>]> {
        match self.column(name)? {
            ColumnData::Float(v) => Some(v),
            ColumnData::Timestamp(_) => None,
        }
    }

    pub fn timestamp_column(&self, name: &str) -> Option<&[Option<DateTime<Utc>>]> {
        match self.column(name)? {
            ColumnData::Timestamp(v) => Some(v),
            ColumnData::Float(_) => None,
        }
    }

    /// Total number of null cells.
    pub fn null_count(&self) -> usize {
        self.columns.iter().map(|c| c.data.null_count()).sum()
    }

    /// Earliest and latest non-null value of the `time` column.
    pub fn time_range(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let times = self.timestamp_column(TIME_COLUMN)?;
        let mut iter = times.iter().flatten();
        let first = *iter.next()?;
        Some(iter.fold((first, first), |(lo, hi), t| (lo.min(*t), hi.max(*t))))
    }

    /// Stack tables vertically.
    ///
    /// The result carries the union of all column names: `time` first,
    /// `latitude`/`longitude` last, everything else in first-seen order.
    /// Columns missing from a table are null-filled for that table's rows.
    pub fn concat(tables: &[WideTable]) -> CommonResult<WideTable> {
        let mut layout: Vec<(&str, &ColumnData)> = Vec::new();
        for table in tables {
            for column in &table.columns {
                match layout.iter().find(|(name, _)| *name == column.name) {
                    Some((_, existing)) if existing.type_name() != column.data.type_name() => {
                        return Err(CommonError::ColumnType {
                            column: column.name.clone(),
                            expected: existing.type_name(),
                            actual: column.data.type_name(),
                        });
                    }
                    Some(_) => {}
                    None => layout.push((column.name.as_str(), &column.data)),
                }
            }
        }

        let rank = |name: &str| match name {
            TIME_COLUMN => 0,
            LATITUDE_COLUMN => 2,
            LONGITUDE_COLUMN => 3,
            _ => 1,
        };
        // stable sort keeps first-seen order within each rank
        layout.sort_by_key(|(name, _)| rank(name));

        let mut columns: Vec<Column> = layout
            .iter()
            .map(|(name, template)| Column {
                name: name.to_string(),
                data: template.nulls_like(0),
            })
            .collect();

        for table in tables {
            for column in columns.iter_mut() {
                let chunk = match table.column(&column.name) {
                    Some(data) => data.clone(),
                    None => column.data.nulls_like(table.num_rows),
                };
                column.data.extend_from(&chunk);
            }
        }

        let num_rows = tables.iter().map(|t| t.num_rows).sum();
        Ok(WideTable { columns, num_rows })
    }
}
