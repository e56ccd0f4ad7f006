use super::{ExecutionContext, Task, TaskKind};
use crate::constants::DEFAULT_CONNECTION_ID;
use crate::error::TaskError;
use crate::logging::log_sql_statement;
use crate::sql::{render_insert, render_insert_deduplicated, SqlTemplate};
use async_trait::async_trait;
use tracing::{info, instrument};

/// Appends transformed staging rows to the fact table.
///
/// Exactly one INSERT-SELECT per execution; the fact table is never deleted
/// from or truncated. With dedup keys set, rows whose keys are already present
/// are skipped, making reruns over the same staging data idempotent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadFactTask {
    task_id: String,
    connection_id: String,
    table: String,
    select: SqlTemplate,
    dedup_keys: Vec<String>,
}

impl LoadFactTask {
    pub fn new(task_id: impl Into<String>, table: impl Into<String>, select: SqlTemplate) -> Self {
        Self {
            task_id: task_id.into(),
            connection_id: DEFAULT_CONNECTION_ID.to_string(),
            table: table.into(),
            select,
            dedup_keys: Vec::new(),
        }
    }

    pub fn with_connection(mut self, connection_id: impl Into<String>) -> Self {
        self.connection_id = connection_id.into();
        self
    }

    pub fn with_dedup_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dedup_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// The INSERT-SELECT this task issues
    pub fn statement(&self) -> Result<String, TaskError> {
        if self.select.is_ddl() {
            return Err(TaskError::invalid_parameter(
                "select",
                format!("{} is not a SELECT template", self.select),
            ));
        }

        if self.dedup_keys.is_empty() {
            render_insert(&self.table, self.select.sql())
        } else {
            render_insert_deduplicated(&self.table, &self.dedup_keys, self.select.sql())
        }
    }
}

#[async_trait]
impl Task for LoadFactTask {
    fn task_id(&self) -> &str {
        &self.task_id
    }

    fn kind(&self) -> TaskKind {
        TaskKind::LoadFact
    }

    fn connection_id(&self) -> Option<&str> {
        Some(&self.connection_id)
    }

    #[instrument(
        skip(self, context),
        fields(task_id = %self.task_id, table = %self.table, attempt = context.attempt)
    )]
    async fn execute(&self, context: &ExecutionContext) -> Result<(), TaskError> {
        let statement = self.statement()?;
        let hook = context.hook(&self.connection_id)?;

        log_sql_statement(&self.task_id, &self.connection_id, &statement);
        let rows = hook.run(&statement).await?;

        info!(rows_inserted = rows, "Fact table load complete");
        Ok(())
    }
}
