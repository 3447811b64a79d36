//! Column-level table schemas.
//!
//! A [`SchemaSpec`] lists the columns a table must carry. Extra columns in
//! the data are allowed and ignored. Validation comes in two depths:
//!
//! - shallow: every schema column is present with a compatible type; no
//!   values are inspected
//! - deep: every value is checked against nullability and range

use std::collections::BTreeMap;
use std::fmt;

use pointcast_common::{ColumnData, WideTable};
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// Violations listed individually in a report's display form.
const DISPLAYED_VIOLATIONS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Timestamp,
    Float,
}

impl ColumnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Timestamp => "timestamp",
            ColumnType::Float => "float",
        }
    }

    /// SQLite declared type used when creating tables.
    pub fn sql_type(&self) -> &'static str {
        match self {
            ColumnType::Timestamp => "DATETIME",
            ColumnType::Float => "REAL",
        }
    }

    pub fn of(data: &ColumnData) -> Self {
        match data {
            ColumnData::Timestamp(_) => ColumnType::Timestamp,
            ColumnData::Float(_) => ColumnType::Float,
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inclusive bounds; either side may be open.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ValueRange {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl ValueRange {
    pub fn contains(&self, value: f64) -> bool {
        self.min.map_or(true, |min| value >= min) && self.max.map_or(true, |max| value <= max)
    }
}

impl fmt::Display for ValueRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.min, self.max) {
            (Some(min), Some(max)) => write!(f, "[{min}, {max}]"),
            (Some(min), None) => write!(f, ">= {min}"),
            (None, Some(max)) => write!(f, "<= {max}"),
            (None, None) => f.write_str("any"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub dtype: ColumnType,
    pub nullable: bool,
    pub range: Option<ValueRange>,
    pub description: String,
}

impl ColumnSpec {
    /// A required (non-nullable) timestamp column.
    pub fn timestamp(name: impl Into<String>) -> Self {
        Self::required(name, ColumnType::Timestamp)
    }

    /// A required (non-nullable) float column.
    pub fn float(name: impl Into<String>) -> Self {
        Self::required(name, ColumnType::Float)
    }

    fn required(name: impl Into<String>, dtype: ColumnType) -> Self {
        Self {
            name: name.into(),
            dtype,
            nullable: false,
            range: None,
            description: String::new(),
        }
    }

    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    pub fn ge(mut self, min: f64) -> Self {
        self.range.get_or_insert_with(ValueRange::default).min = Some(min);
        self
    }

    pub fn le(mut self, max: f64) -> Self {
        self.range.get_or_insert_with(ValueRange::default).max = Some(max);
        self
    }

    pub fn between(self, min: f64, max: f64) -> Self {
        self.ge(min).le(max)
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ViolationKind {
    MissingColumn,
    WrongType { expected: ColumnType, actual: ColumnType },
    Null,
    OutOfRange { value: f64, range: ValueRange },
}

/// One failed check. `row` is `None` for column-level problems.
#[derive(Debug, Clone, PartialEq)]
pub struct Violation {
    pub column: String,
    pub row: Option<usize>,
    pub kind: ViolationKind,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ViolationKind::MissingColumn => write!(f, "column '{}' is missing", self.column),
            ViolationKind::WrongType { expected, actual } => write!(
                f,
                "column '{}' has type {actual}, expected {expected}",
                self.column
            ),
            ViolationKind::Null => write!(
                f,
                "column '{}' row {} is null",
                self.column,
                self.row.unwrap_or_default()
            ),
            ViolationKind::OutOfRange { value, range } => write!(
                f,
                "column '{}' row {} value {value} outside {range}",
                self.column,
                self.row.unwrap_or_default()
            ),
        }
    }
}

/// Every violation found by a deep validation pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationReport {
    pub violations: Vec<Violation>,
}

impl ValidationReport {
    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.violations.len()
    }

    /// Violation counts per column.
    pub fn counts_by_column(&self) -> BTreeMap<&str, usize> {
        let mut counts = BTreeMap::new();
        for v in &self.violations {
            *counts.entry(v.column.as_str()).or_insert(0) += 1;
        }
        counts
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} violation(s)", self.violations.len())?;
        let counts: Vec<String> = self
            .counts_by_column()
            .into_iter()
            .map(|(column, n)| format!("{column}: {n}"))
            .collect();
        if !counts.is_empty() {
            write!(f, " ({})", counts.join(", "))?;
        }
        for v in self.violations.iter().take(DISPLAYED_VIOLATIONS) {
            write!(f, "; {v}")?;
        }
        Ok(())
    }
}

/// What to do with deep validation results on write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeepValidation {
    #[default]
    Skip,
    /// Log violations and write anyway.
    Warn,
    /// Reject the write on any violation.
    Enforce,
}

/// Named, ordered column specifications.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaSpec {
    pub name: String,
    pub columns: Vec<ColumnSpec>,
}

impl SchemaSpec {
    pub fn new(name: impl Into<String>, columns: Vec<ColumnSpec>) -> Self {
        Self {
            name: name.into(),
            columns,
        }
    }

    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Check column presence and types only.
    ///
    /// All mismatches are reported together.
    pub fn validate_shallow(&self, table: &WideTable) -> StoreResult<()> {
        let problems: Vec<String> = self
            .structural_violations(table)
            .iter()
            .map(ToString::to_string)
            .collect();
        if problems.is_empty() {
            Ok(())
        } else {
            Err(StoreError::SchemaMismatch(problems))
        }
    }

    /// Check every row of every schema column.
    pub fn validate_deep(&self, table: &WideTable) -> Result<(), ValidationReport> {
        let mut report = ValidationReport {
            violations: self.structural_violations(table),
        };

        for spec in &self.columns {
            let Some(data) = table.column(&spec.name) else {
                continue;
            };
            if ColumnType::of(data) != spec.dtype {
                continue;
            }
            match data {
                ColumnData::Timestamp(values) => {
                    for (row, value) in values.iter().enumerate() {
                        if value.is_none() && !spec.nullable {
                            report.violations.push(violation(spec, row, ViolationKind::Null));
                        }
                    }
                }
                ColumnData::Float(values) => {
                    for (row, value) in values.iter().enumerate() {
                        match value {
                            None if !spec.nullable => {
                                report.violations.push(violation(spec, row, ViolationKind::Null));
                            }
                            None => {}
                            Some(v) => {
                                if let Some(range) = spec.range {
                                    if !range.contains(*v) {
                                        report.violations.push(violation(
                                            spec,
                                            row,
                                            ViolationKind::OutOfRange { value: *v, range },
                                        ));
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }

        if report.is_empty() {
            Ok(())
        } else {
            Err(report)
        }
    }

    fn structural_violations(&self, table: &WideTable) -> Vec<Violation> {
        let mut violations = Vec::new();
        for spec in &self.columns {
            match table.column(&spec.name) {
                None => violations.push(Violation {
                    column: spec.name.clone(),
                    row: None,
                    kind: ViolationKind::MissingColumn,
                }),
                Some(data) if ColumnType::of(data) != spec.dtype => violations.push(Violation {
                    column: spec.name.clone(),
                    row: None,
                    kind: ViolationKind::WrongType {
                        expected: spec.dtype,
                        actual: ColumnType::of(data),
                    },
                }),
                Some(_) => {}
            }
        }
        violations
    }
}

fn violation(spec: &ColumnSpec, row: usize, kind: ViolationKind) -> Violation {
    Violation {
        column: spec.name.clone(),
        row: Some(row),
        kind,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn schema() -> SchemaSpec {
        SchemaSpec::new(
            "test",
            vec![
                ColumnSpec::timestamp("time"),
                ColumnSpec::float("t_2m").between(200.0, 350.0),
                ColumnSpec::float("gust").nullable(true).ge(0.0),
            ],
        )
    }

    fn table(t2m: Vec<Option<f64>>) -> WideTable {
        let n = t2m.len();
        let times = (0..n)
            .map(|h| Some(Utc.with_ymd_and_hms(2021, 1, 1, h as u32, 0, 0).unwrap()))
            .collect();
        let mut table = WideTable::new();
        table.push_column("time", ColumnData::Timestamp(times)).unwrap();
        table.push_column("t_2m", ColumnData::Float(t2m)).unwrap();
        table
            .push_column("gust", ColumnData::Float(vec![None; n]))
            .unwrap();
        table
            .push_column("extra", ColumnData::Float(vec![Some(-1.0); n]))
            .unwrap();
        table
    }

    #[test]
    fn test_range_contains() {
        let r = ValueRange {
            min: Some(0.0),
            max: None,
        };
        assert!(r.contains(0.0));
        assert!(r.contains(1e9));
        assert!(!r.contains(-0.1));
    }

    #[test]
    fn test_shallow_passes_with_extra_columns() {
        schema().validate_shallow(&table(vec![Some(280.0)])).unwrap();
    }

    #[test]
    fn test_shallow_ignores_values() {
        // out of range and null values are not inspected
        schema()
            .validate_shallow(&table(vec![Some(1000.0), None]))
            .unwrap();
    }

    #[test]
    fn test_shallow_reports_all_mismatches() {
        let mut t = WideTable::new();
        t.push_column("time", ColumnData::Float(vec![Some(1.0)]))
            .unwrap();
        let err = schema().validate_shallow(&t).unwrap_err();
        match err {
            StoreError::SchemaMismatch(problems) => {
                assert_eq!(problems.len(), 3);
                assert!(problems[0].contains("expected timestamp"));
                assert!(problems[1].contains("'t_2m' is missing"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_deep_collects_every_violation() {
        let report = schema()
            .validate_deep(&table(vec![Some(280.0), Some(100.0), None, Some(400.0)]))
            .unwrap_err();
        assert_eq!(report.len(), 3);
        assert_eq!(report.counts_by_column()["t_2m"], 3);
        assert_eq!(report.violations[1].row, Some(2));
        assert_eq!(report.violations[1].kind, ViolationKind::Null);
        assert!(report.to_string().starts_with("3 violation(s)"));
    }

    #[test]
    fn test_deep_passes_clean_table() {
        schema()
            .validate_deep(&table(vec![Some(200.0), Some(350.0)]))
            .unwrap();
    }
}
