use std::time::Duration;

use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode};
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::{debug, info};

use super::{
    create_table_sql, delete_prefix, drop_table_sql, insert_prefix, to_cents, upsert_scope,
    LoadMode, LoadReport, TableRef, Warehouse,
};
use crate::config::{Driver, WarehouseConfig};
use crate::error::LoadError;
use crate::models::SeriesTable;

/// Redshift or plain Postgres destination
pub struct PostgresWarehouse {
    pool: PgPool,
    driver: Driver,
    target: TableRef,
    batch_size: usize,
}

impl PostgresWarehouse {
    pub async fn connect(
        config: &WarehouseConfig,
        target: TableRef,
        batch_size: usize,
    ) -> Result<Self, LoadError> {
        // Redshift only accepts encrypted connections
        let ssl_mode = match config.driver {
            Driver::Redshift => PgSslMode::Require,
            _ => PgSslMode::Prefer,
        };

        let options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .database(&config.database)
            .username(&config.user)
            .password(config.password())
            .ssl_mode(ssl_mode);

        let pool = PgPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(30))
            .connect_with(options)
            .await
            .map_err(LoadError::Connect)?;

        Ok(Self {
            pool,
            driver: config.driver,
            target,
            batch_size,
        })
    }
}

#[async_trait::async_trait]
impl Warehouse for PostgresWarehouse {
    async fn load(&self, table: &SeriesTable, mode: LoadMode) -> Result<LoadReport, LoadError> {
        let mut tx = self.pool.begin().await.map_err(LoadError::Begin)?;

        info!("Resetting table {} ({} mode)", self.target, mode);
        if mode == LoadMode::Replace {
            sqlx::query(&drop_table_sql(&self.target))
                .execute(&mut *tx)
                .await
                .map_err(LoadError::SchemaReset)?;
        }
        sqlx::query(&create_table_sql(&self.target, self.driver))
            .execute(&mut *tx)
            .await
            .map_err(LoadError::SchemaReset)?;

        let mut rows_deleted = 0;
        if mode == LoadMode::Upsert {
            if let Some((start, end, concepts)) = upsert_scope(table) {
                let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(delete_prefix(&self.target));
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
            let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(insert_prefix(&self.target));
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
