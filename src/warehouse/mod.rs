//! # Warehouse Hooks
//!
//! The only channel through which tasks touch the warehouse. A hook accepts SQL
//! text and reports affected-row counts or a single scalar; connection pooling,
//! credentials and rate limiting belong to the hook implementation.
//!
//! - [`PostgresHook`] - sqlx pool over the Postgres wire protocol (Redshift)
//! - [`RecordingWarehouse`] - in-memory hook for tests and dry runs
//! - [`ConnectionRegistry`] - resolves connection ids to hooks at execute time

pub mod postgres;
pub mod recording;

use crate::error::TaskError;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;

pub use postgres::PostgresHook;
pub use recording::RecordingWarehouse;

/// SQL execution surface used by every task
#[async_trait]
pub trait WarehouseHook: Send + Sync {
    /// Execute one statement, returning the affected row count
    async fn run(&self, sql: &str) -> Result<u64, TaskError>;

    /// Execute statements in order inside a single transaction
    async fn run_batch(&self, statements: &[String]) -> Result<u64, TaskError>;

    /// Execute a query returning one integer in its first column
    async fn query_scalar(&self, sql: &str) -> Result<i64, TaskError>;
}

/// Connection id to hook lookup shared by all tasks of a run
#[derive(Default, Clone)]
pub struct ConnectionRegistry {
    hooks: Arc<DashMap<String, Arc<dyn WarehouseHook>>>,
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ids: Vec<String> = self.hooks.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        f.debug_struct("ConnectionRegistry")
            .field("connections", &ids)
            .finish()
    }
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace the hook for `connection_id`
    pub fn register(&self, connection_id: impl Into<String>, hook: Arc<dyn WarehouseHook>) {
        self.hooks.insert(connection_id.into(), hook);
    }

    pub fn with_hook(self, connection_id: impl Into<String>, hook: Arc<dyn WarehouseHook>) -> Self {
        self.register(connection_id, hook);
        self
    }

    pub fn resolve(&self, connection_id: &str) -> Result<Arc<dyn WarehouseHook>, TaskError> {
        self.hooks
            .get(connection_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| TaskError::UnknownConnection {
                connection_id: connection_id.to_string(),
            })
    }

    pub fn contains(&self, connection_id: &str) -> bool {
        self.hooks.contains_key(connection_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_resolve_registered_hook() {
        let warehouse = Arc::new(RecordingWarehouse::new());
        let registry = ConnectionRegistry::new().with_hook("redshift", warehouse.clone());

        let hook = registry.resolve("redshift").unwrap();
        hook.run("SELECT 1").await.unwrap();
        assert_eq!(warehouse.statements(), vec!["SELECT 1".to_string()]);
        assert!(registry.contains("redshift"));
    }

    #[test]
    fn test_unknown_connection() {
        let registry = ConnectionRegistry::new();
        let err = registry.resolve("warehouse").err().unwrap();
        assert_eq!(
            err,
            TaskError::UnknownConnection {
                connection_id: "warehouse".to_string()
            }
        );
    }
}
