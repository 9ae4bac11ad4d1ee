use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::{debug, info};

use super::{
    create_table_sql, delete_prefix, drop_table_sql, insert_prefix, to_cents, upsert_scope,
    LoadMode, LoadReport, TableRef, Warehouse,
};
use crate::config::{Driver, WarehouseConfig};
use crate::error::LoadError;
use crate::models::SeriesTable;

/// Local SQLite destination, for development runs and tests
pub struct SqliteWarehouse {
    pool: SqlitePool,
    target: TableRef,
    batch_size: usize,
}

impl SqliteWarehouse {
    pub async fn connect(
        config: &WarehouseConfig,
        target: TableRef,
        batch_size: usize,
    ) -> Result<Self, LoadError> {
        let options = if config.database == ":memory:" {
            SqliteConnectOptions::from_str("sqlite::memory:").map_err(LoadError::Connect)?
        } else {
            SqliteConnectOptions::new()
                .filename(&config.database)
                .create_if_missing(true)
        };
        Self::connect_with(options, target, batch_size).await
    }

    /// Private in-memory database
    pub async fn in_memory(target: TableRef, batch_size: usize) -> Result<Self, LoadError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:").map_err(LoadError::Connect)?;
        Self::connect_with(options, target, batch_size).await
    }

    async fn connect_with(
        options: SqliteConnectOptions,
        target: TableRef,
        batch_size: usize,
    ) -> Result<Self, LoadError> {
        // One connection: an in-memory database lives and dies with it
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .acquire_timeout(Duration::from_secs(30))
            .connect_with(options)
            .await
            .map_err(LoadError::Connect)?;

        Ok(Self {
            pool,
            target,
            batch_size,
        })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait::async_trait]
impl Warehouse for SqliteWarehouse {
    async fn load(&self, table: &SeriesTable, mode: LoadMode) -> Result<LoadReport, LoadError> {
        let mut tx = self.pool.begin().await.map_err(LoadError::Begin)?;

        info!("Resetting table {} ({} mode)", self.target, mode);
        if mode == LoadMode::Replace {
            sqlx::query(&drop_table_sql(&self.target))
                .execute(&mut *tx)
                .await
                .map_err(LoadError::SchemaReset)?;
        }
        sqlx::query(&create_table_sql(&self.target, Driver::Sqlite))
            .execute(&mut *tx)
            .await
            .map_err(LoadError::SchemaReset)?;

        let mut rows_deleted = 0;
        if mode == LoadMode::Upsert {
            if let Some((start, end, concepts)) = upsert_scope(table) {
                let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(delete_prefix(&self.target));
                qb.push_bind(start).push(" AND date <= ").push_bind(end);
                qb.push(" AND concept IN (");
                let mut separated = qb.separated(", ");
                for concept in concepts {
                    separated.push_bind(concept);
                }
                separated.push_unseparated(")");

                rows_deleted = qb
                    .build()
                    .execute(&mut *tx)
                    .await
                    .map_err(LoadError::Insert)?
                    .rows_affected();
                debug!("Cleared {} existing rows", rows_deleted);
            }
        }

        let mut rows_inserted = 0;
        let mut batches = 0;
        for chunk in table.rows().chunks(self.batch_size) {
            let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(insert_prefix(&self.target));
            qb.push_values(chunk, |mut b, row| {
                b.push_bind(row.date)
                    .push_bind(row.concept.clone())
                    .push_bind(to_cents(row.value));
            });

            rows_inserted += qb
                .build()
                .execute(&mut *tx)
                .await
                .map_err(LoadError::Insert)?
                .rows_affected();
            batches += 1;
        }

        tx.commit().await.map_err(LoadError::Commit)?;

        Ok(LoadReport {
            table: self.target.to_string(),
            mode,
            rows_inserted,
            rows_deleted,
            batches,
        })
    }

    async fn close(&self) {
        self.pool.close().await;
        info!("Connection closed.");
    }
}
