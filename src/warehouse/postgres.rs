//! sqlx-backed warehouse hook.

use super::WarehouseHook;
use crate::config::WarehouseConfig;
use crate::error::TaskError;
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Executor, PgPool, Row};
use std::time::Instant;
use tracing::{debug, instrument};

/// Warehouse hook over a Postgres-protocol connection pool
#[derive(Debug, Clone)]
pub struct PostgresHook {
    pool: PgPool,
}

impl PostgresHook {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Build the pool described by `config`
    pub async fn connect(config: &WarehouseConfig) -> Result<Self, TaskError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout())
            .connect(&config.url)
            .await
            .map_err(|e| TaskError::connection(e.to_string()))?;

        debug!(
            connection_id = %config.connection_id,
            max_connections = config.max_connections,
            "Warehouse pool connected"
        );
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl WarehouseHook for PostgresHook {
    #[instrument(skip(self, sql))]
    async fn run(&self, sql: &str) -> Result<u64, TaskError> {
        let started = Instant::now();
        let result = sqlx::raw_sql(sql)
            .execute(&self.pool)
            .await
            .map_err(|e| TaskError::from_sqlx(e, sql))?;

        debug!(
            rows_affected = result.rows_affected(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Statement executed"
        );
        Ok(result.rows_affected())
    }

    #[instrument(skip(self, statements), fields(statement_count = statements.len()))]
    async fn run_batch(&self, statements: &[String]) -> Result<u64, TaskError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| TaskError::from_sqlx(e, "BEGIN"))?;

        let mut rows_affected = 0;
        for statement in statements {
            let result = (&mut *tx)
                .execute(sqlx::raw_sql(statement))
                .await
                .map_err(|e| TaskError::from_sqlx(e, statement))?;
            rows_affected += result.rows_affected();
        }

        tx.commit()
            .await
            .map_err(|e| TaskError::from_sqlx(e, "COMMIT"))?;
        Ok(rows_affected)
    }

    #[instrument(skip(self, sql))]
    async fn query_scalar(&self, sql: &str) -> Result<i64, TaskError> {
        let row = sqlx::query(sql)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| TaskError::from_sqlx(e, sql))?;

        let value: Option<i64> = row
            .try_get(0)
            .map_err(|e| TaskError::sql(sql, e.to_string()))?;
        value.ok_or_else(|| TaskError::sql(sql, "query returned NULL"))
    }
}
