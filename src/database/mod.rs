//! Warehouse loading.
//!
//! Both load modes run inside a single transaction, so a failure at any step
//! leaves the destination table as it was before the run.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use tracing::info;

use crate::config::{Driver, WarehouseConfig};
use crate::error::LoadError;
use crate::models::SeriesTable;

pub mod postgres;
pub mod sqlite;

pub use postgres::PostgresWarehouse;
pub use sqlite::SqliteWarehouse;

/// How a run's rows replace what is already in the table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
    /// Drop and recreate the table, then insert
    Replace,
    /// Keep the table, replace only the loaded concepts inside the loaded date range
    Upsert,
}

impl FromStr for LoadMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "replace" => Ok(LoadMode::Replace),
            "upsert" => Ok(LoadMode::Upsert),
            other => Err(other.to_string()),
        }
    }
}

impl fmt::Display for LoadMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadMode::Replace => write!(f, "replace"),
            LoadMode::Upsert => write!(f, "upsert"),
        }
    }
}

/// Schema-qualified destination table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub schema: String,
    pub table: String,
}

impl TableRef {
    pub fn new(schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
        }
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.table)
    }
}

/// Outcome of a successful load
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadReport {
    pub table: String,
    pub mode: LoadMode,
    pub rows_inserted: u64,
    pub rows_deleted: u64,
    pub batches: usize,
}

/// Destination the aggregated table is written to
#[async_trait::async_trait]
pub trait Warehouse {
    async fn load(&self, table: &SeriesTable, mode: LoadMode) -> Result<LoadReport, LoadError>;

    /// Release the underlying connections
    async fn close(&self);
}

/// Open a warehouse for the configured driver
pub async fn connect(
    config: &WarehouseConfig,
    batch_size: usize,
) -> Result<Box<dyn Warehouse + Send + Sync>, LoadError> {
    info!("Connecting to warehouse: {}", config.redacted_url());
    let target = TableRef::new(&config.schema, &config.table);

    let warehouse: Box<dyn Warehouse + Send + Sync> = match config.driver {
        Driver::Redshift | Driver::Postgres => {
            Box::new(PostgresWarehouse::connect(config, target, batch_size).await?)
        }
        Driver::Sqlite => Box::new(SqliteWarehouse::connect(config, target, batch_size).await?),
    };
    Ok(warehouse)
}

pub(crate) fn drop_table_sql(target: &TableRef) -> String {
    format!("DROP TABLE IF EXISTS {target}")
}

/// DDL for the destination table. Redshift gets `date` as distribution and sort key.
pub(crate) fn create_table_sql(target: &TableRef, driver: Driver) -> String {
    match driver {
        Driver::Redshift => format!(
            "CREATE TABLE IF NOT EXISTS {target} (
                date DATE DISTKEY,
                concept VARCHAR(50),
                value NUMERIC(18,2),
                PRIMARY KEY (date, concept)
            )
            SORTKEY(date)"
        ),
        Driver::Postgres | Driver::Sqlite => format!(
            "CREATE TABLE IF NOT EXISTS {target} (
                date DATE,
                concept VARCHAR(50),
                value NUMERIC(18,2),
                PRIMARY KEY (date, concept)
            )"
        ),
    }
}

pub(crate) fn insert_prefix(target: &TableRef) -> String {
    format!("INSERT INTO {target} (date, concept, value) ")
}

pub(crate) fn delete_prefix(target: &TableRef) -> String {
    format!("DELETE FROM {target} WHERE date >= ")
}

/// Range and concepts an upsert clears before inserting
pub(crate) fn upsert_scope(table: &SeriesTable) -> Option<(NaiveDate, NaiveDate, Vec<String>)> {
    let (start, end) = table.date_range()?;
    let concepts = table.concepts().into_iter().map(str::to_string).collect();
    Some((start, end, concepts))
}

/// NUMERIC(18,2) keeps two decimals
pub(crate) fn to_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
