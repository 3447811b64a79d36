//! SQLite-backed table store.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use pointcast_common::{ColumnData, WideTable};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{Row, SqliteConnection};
use tracing::{debug, error, info, warn};

use crate::error::{StoreError, StoreResult};
use crate::schema::{ColumnType, DeepValidation, SchemaSpec};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteMode {
    /// Add rows, creating the table if needed.
    #[default]
    Append,
    /// Drop any existing table and recreate it from the input.
    Replace,
}

impl WriteMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            WriteMode::Append => "append",
            WriteMode::Replace => "replace",
        }
    }
}

impl FromStr for WriteMode {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "append" => Ok(WriteMode::Append),
            "replace" => Ok(WriteMode::Replace),
            other => Err(StoreError::InvalidMode(other.to_string())),
        }
    }
}

impl fmt::Display for WriteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOptions {
    pub mode: WriteMode,
    /// Deep validation policy. Shallow validation always runs.
    pub deep_validate: DeepValidation,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            mode: WriteMode::Append,
            deep_validate: DeepValidation::Skip,
        }
    }
}

impl WriteOptions {
    pub fn replace() -> Self {
        Self {
            mode: WriteMode::Replace,
            ..Self::default()
        }
    }
}

/// Table shape observed right after a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteSummary {
    pub rows_in_table: u64,
    pub columns: usize,
}

/// A single SQLite database holding named wide tables.
pub struct TableStore {
    pool: SqlitePool,
    path: PathBuf,
    schemas: HashMap<String, SchemaSpec>,
}

impl TableStore {
    /// Open (creating if missing) the database at `path`.
    pub async fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| StoreError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        info!(path = %path.display(), "Opened table store");
        Ok(Self {
            pool,
            path,
            schemas: HashMap::new(),
        })
    }

    /// Register the schema validated for writes to `schema.name`.
    pub fn with_schema(mut self, schema: SchemaSpec) -> Self {
        self.schemas.insert(schema.name.clone(), schema);
        self
    }

    pub fn schema(&self, table_name: &str) -> Option<&SchemaSpec> {
        self.schemas.get(table_name)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Write `table` to `table_name`.
    ///
    /// `table_name` must have a registered schema; the table is validated
    /// against it first. Unknown tables, empty input and validation failures
    /// are rejected before the database is touched. The write itself runs in
    /// one transaction.
    pub async fn write(
        &self,
        table_name: &str,
        table: &WideTable,
        options: WriteOptions,
    ) -> StoreResult<WriteSummary> {
        check_table_name(table_name)?;
        let Some(schema) = self.schemas.get(table_name) else {
            error!(table = table_name, "Refusing to write table without a registered schema");
            return Err(StoreError::SchemaNotRegistered(table_name.to_string()));
        };
        if table.is_empty() {
            return Err(StoreError::EmptyTable(table_name.to_string()));
        }

        info!(
            table = table_name,
            rows = table.num_rows(),
            mode = %options.mode,
            "Writing rows"
        );

        validate(schema, table, options.deep_validate)?;

        let ident = quote_ident(table_name);
        let column_defs = table
            .columns()
            .iter()
            .map(|c| format!("{} {}", quote_ident(&c.name), ColumnType::of(&c.data).sql_type()))
            .collect::<Vec<_>>()
            .join(", ");

        let mut tx = self.pool.begin().await?;
        match options.mode {
            WriteMode::Replace => {
                sqlx::query(&format!("DROP TABLE IF EXISTS {ident}"))
                    .execute(&mut *tx)
                    .await?;
                sqlx::query(&format!("CREATE TABLE {ident} ({column_defs})"))
                    .execute(&mut *tx)
                    .await?;
            }
            WriteMode::Append => {
                sqlx::query(&format!("CREATE TABLE IF NOT EXISTS {ident} ({column_defs})"))
                    .execute(&mut *tx)
                    .await?;
            }
        }
        insert_rows(&mut *tx, &ident, table).await?;
        tx.commit().await?;

        match options.mode {
            WriteMode::Replace => info!(table = table_name, "Replaced table"),
            WriteMode::Append => info!(table = table_name, "Appended to table"),
        }

        let rows_in_table = self.count_rows(&ident).await?;
        info!(table = table_name, rows = rows_in_table, "Total rows in table");

        Ok(WriteSummary {
            rows_in_table,
            columns: table.num_columns(),
        })
    }

    /// Read a whole table in insertion order.
    pub async fn read(&self, table_name: &str) -> StoreResult<WideTable> {
        check_table_name(table_name)?;
        if !self.exists(table_name).await? {
            return Err(StoreError::TableNotFound(table_name.to_string()));
        }

        let columns = self.table_columns(table_name).await?;
        let rows = sqlx::query(&format!(
            "SELECT * FROM {} ORDER BY rowid",
            quote_ident(table_name)
        ))
        .fetch_all(&self.pool)
        .await?;

        let mut table = WideTable::new();
        for (i, (name, dtype)) in columns.into_iter().enumerate() {
            let data = match dtype {
                ColumnType::Timestamp => ColumnData::Timestamp(
                    rows.iter()
                        .map(|r| r.try_get::<Option<DateTime<Utc>>, _>(i))
                        .collect::<Result<_, _>>()?,
                ),
                ColumnType::Float => ColumnData::Float(
                    rows.iter()
                        .map(|r| r.try_get::<Option<f64>, _>(i))
                        .collect::<Result<_, _>>()?,
                ),
            };
            table.push_column(name, data)?;
        }

        info!(table = table_name, rows = table.num_rows(), "Read rows from table");
        Ok(table)
    }

    pub async fn exists(&self, table_name: &str) -> StoreResult<bool> {
        let count: i64 =
            sqlx::query("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?")
                .bind(table_name)
                .fetch_one(&self.pool)
                .await?
                .try_get(0)?;
        Ok(count > 0)
    }

    /// `(rows, columns)`, or `None` when the table does not exist.
    pub async fn shape(&self, table_name: &str) -> StoreResult<Option<(u64, usize)>> {
        if !self.exists(table_name).await? {
            return Ok(None);
        }
        let rows = self.count_rows(&quote_ident(table_name)).await?;
        let columns = self.table_columns(table_name).await?.len();
        Ok(Some((rows, columns)))
    }

    async fn count_rows(&self, ident: &str) -> StoreResult<u64> {
        let count: i64 = sqlx::query(&format!("SELECT COUNT(*) FROM {ident}"))
            .fetch_one(&self.pool)
            .await?
            .try_get(0)?;
        Ok(count.max(0) as u64)
    }

    /// Column names and types in declaration order.
    async fn table_columns(&self, table_name: &str) -> StoreResult<Vec<(String, ColumnType)>> {
        let rows = sqlx::query("SELECT name, type FROM pragma_table_info(?) ORDER BY cid")
            .bind(table_name)
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|row| {
                let name: String = row.try_get("name")?;
                let declared: String = row.try_get("type")?;
                let dtype = declared_type(&declared).ok_or_else(|| {
                    StoreError::UnsupportedColumn {
                        column: name.clone(),
                        declared: declared.clone(),
                    }
                })?;
                Ok((name, dtype))
            })
            .collect()
    }
}

/// Shallow validation always, deep validation per `deep`.
fn validate(schema: &SchemaSpec, table: &WideTable, deep: DeepValidation) -> StoreResult<()> {
    let table_name = schema.name.as_str();
    debug!(table = table_name, "Performing shallow validation");
    if let Err(e) = schema.validate_shallow(table) {
        error!(table = table_name, error = %e, "Shallow validation failed");
        return Err(e);
    }
    info!(table = table_name, "Shallow validation passed");

    if deep == DeepValidation::Skip {
        return Ok(());
    }
    debug!(table = table_name, "Performing deep validation");
    match schema.validate_deep(table) {
        Ok(()) => {
            info!(table = table_name, "Deep validation passed");
            Ok(())
        }
        Err(report) if deep == DeepValidation::Warn => {
            warn!(
                table = table_name,
                violations = report.len(),
                report = %report,
                "Deep validation found violations; writing anyway"
            );
            Ok(())
        }
        Err(report) => {
            error!(table = table_name, report = %report, "Deep validation failed");
            Err(StoreError::Validation(report))
        }
    }
}

async fn insert_rows(
    conn: &mut SqliteConnection,
    ident: &str,
    table: &WideTable,
) -> StoreResult<()> {
    let names = table
        .columns()
        .iter()
        .map(|c| quote_ident(&c.name))
        .collect::<Vec<_>>()
        .join(", ");
    let placeholders = vec!["?"; table.num_columns()].join(", ");
    let sql = format!("INSERT INTO {ident} ({names}) VALUES ({placeholders})");

    for row in 0..table.num_rows() {
        let mut query = sqlx::query(&sql);
        for column in table.columns() {
            query = match &column.data {
                ColumnData::Timestamp(values) => query.bind(values[row]),
                ColumnData::Float(values) => query.bind(values[row]),
            };
        }
        query.execute(&mut *conn).await?;
    }
    Ok(())
}

fn declared_type(declared: &str) -> Option<ColumnType> {
    let upper = declared.to_ascii_uppercase();
    if upper.contains("DATE") || upper.contains("TIME") {
        Some(ColumnType::Timestamp)
    } else if upper.contains("REAL") || upper.contains("FLOA") || upper.contains("DOUB") {
        Some(ColumnType::Float)
    } else {
        None
    }
}

fn check_table_name(name: &str) -> StoreResult<()> {
    if name.is_empty() || name.contains('\0') {
        return Err(StoreError::InvalidTableName(name.to_string()));
    }
    Ok(())
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ColumnSpec;
    use chrono::TimeZone;
    use test_utils::temp_test_dir_with_prefix;

    fn sample(rows: usize, t2m: Option<f64>) -> WideTable {
        let times = (0..rows)
            .map(|h| Some(Utc.with_ymd_and_hms(2021, 1, 1, h as u32, 0, 0).unwrap()))
            .collect();
        let mut table = WideTable::new();
        table.push_column("time", ColumnData::Timestamp(times)).unwrap();
        table
            .push_column("t_2m", ColumnData::Float(vec![t2m; rows]))
            .unwrap();
        table
            .push_column("latitude", ColumnData::Float(vec![Some(53.9); rows]))
            .unwrap();
        table
    }

    fn schema() -> SchemaSpec {
        SchemaSpec::new(
            "weather",
            vec![
                ColumnSpec::timestamp("time"),
                ColumnSpec::float("t_2m").between(200.0, 350.0),
                ColumnSpec::float("latitude").between(-90.0, 90.0),
            ],
        )
    }

    async fn open(dir: &tempfile::TempDir) -> TableStore {
        TableStore::open(dir.path().join("db").join("pointcast.sqlite"))
            .await
            .unwrap()
            .with_schema(schema())
    }

    #[test]
    fn test_write_mode_parse() {
        assert_eq!("append".parse::<WriteMode>().unwrap(), WriteMode::Append);
        assert_eq!("replace".parse::<WriteMode>().unwrap(), WriteMode::Replace);
        assert!(matches!(
            "upsert".parse::<WriteMode>(),
            Err(StoreError::InvalidMode(m)) if m == "upsert"
        ));
    }

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("L0_DwdWeather"), "\"L0_DwdWeather\"");
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
    }

    #[tokio::test]
    async fn test_append_then_replace_counts() {
        let dir = temp_test_dir_with_prefix("pointcast_store_");
        let store = open(&dir).await;

        let summary = store
            .write("weather", &sample(3, Some(280.0)), WriteOptions::default())
            .await
            .unwrap();
        assert_eq!(summary.rows_in_table, 3);
        assert_eq!(summary.columns, 3);

        let summary = store
            .write("weather", &sample(2, Some(281.0)), WriteOptions::default())
            .await
            .unwrap();
        assert_eq!(summary.rows_in_table, 5);

        let summary = store
            .write("weather", &sample(4, Some(282.0)), WriteOptions::replace())
            .await
            .unwrap();
        assert_eq!(summary.rows_in_table, 4);
        assert_eq!(store.shape("weather").await.unwrap(), Some((4, 3)));
    }

    #[tokio::test]
    async fn test_empty_write_leaves_table_untouched() {
        let dir = temp_test_dir_with_prefix("pointcast_store_");
        let store = open(&dir).await;
        store
            .write("weather", &sample(2, Some(280.0)), WriteOptions::default())
            .await
            .unwrap();

        let err = store
            .write("weather", &sample(0, None), WriteOptions::replace())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::EmptyTable(_)));
        assert_eq!(store.shape("weather").await.unwrap(), Some((2, 3)));
    }

    #[tokio::test]
    async fn test_read_missing_table_is_not_found() {
        let dir = temp_test_dir_with_prefix("pointcast_store_");
        let store = open(&dir).await;
        assert!(!store.exists("weather").await.unwrap());
        assert_eq!(store.shape("weather").await.unwrap(), None);
        let err = store.read("weather").await.unwrap_err();
        assert!(matches!(err, StoreError::TableNotFound(name) if name == "weather"));
    }

    #[tokio::test]
    async fn test_read_existing_empty_table() {
        let dir = temp_test_dir_with_prefix("pointcast_store_");
        let store = open(&dir).await;
        sqlx::query("CREATE TABLE \"weather\" (\"time\" DATETIME, \"t_2m\" REAL)")
            .execute(store.pool())
            .await
            .unwrap();

        let table = store.read("weather").await.unwrap();
        assert!(table.is_empty());
        assert_eq!(table.column_names(), vec!["time", "t_2m"]);
    }

    #[tokio::test]
    async fn test_round_trip_preserves_values_and_nulls() {
        let dir = temp_test_dir_with_prefix("pointcast_store_");
        let store = open(&dir).await;
        let mut table = sample(2, Some(280.25));
        table
            .push_column("u_level61", ColumnData::Float(vec![Some(3.5), None]))
            .unwrap();

        store
            .write("weather", &table, WriteOptions::replace())
            .await
            .unwrap();
        let read = store.read("weather").await.unwrap();
        assert_eq!(read, table);
    }

    #[tokio::test]
    async fn test_shallow_validation_rejects_before_write() {
        let dir = temp_test_dir_with_prefix("pointcast_store_");
        let store = open(&dir).await;
        let mut table = WideTable::new();
        table
            .push_column("time", ColumnData::Float(vec![Some(1.0)]))
            .unwrap();

        let err = store
            .write("weather", &table, WriteOptions::replace())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::SchemaMismatch(_)));
        assert!(!store.exists("weather").await.unwrap());
    }

    #[tokio::test]
    async fn test_deep_validation_policies() {
        let dir = temp_test_dir_with_prefix("pointcast_store_");
        let store = open(&dir).await;
        let hot = sample(2, Some(400.0));

        let enforce = WriteOptions {
            deep_validate: DeepValidation::Enforce,
            ..WriteOptions::replace()
        };
        let err = store.write("weather", &hot, enforce).await.unwrap_err();
        match err {
            StoreError::Validation(report) => assert_eq!(report.len(), 2),
            other => panic!("unexpected error: {other}"),
        }
        assert!(!store.exists("weather").await.unwrap());

        let warn = WriteOptions {
            deep_validate: DeepValidation::Warn,
            ..WriteOptions::replace()
        };
        assert_eq!(
            store.write("weather", &hot, warn).await.unwrap().rows_in_table,
            2
        );

        // deep checks never run by default
        store
            .write("weather", &hot, WriteOptions::replace())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_unregistered_table_is_rejected() {
        let dir = temp_test_dir_with_prefix("pointcast_store_");
        let store = open(&dir).await;
        let mut table = WideTable::new();
        table
            .push_column("anything", ColumnData::Float(vec![Some(-1.0)]))
            .unwrap();

        let err = store
            .write("scratch", &table, WriteOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::SchemaNotRegistered(name) if name == "scratch"));
        assert!(!store.exists("scratch").await.unwrap());

        // a valid table is still refused without a schema
        let err = store
            .write("scratch", &sample(1, Some(280.0)), WriteOptions::replace())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::SchemaNotRegistered(_)));
    }
}
