use super::{ExecutionContext, Task, TaskKind};
use crate::constants::DEFAULT_CONNECTION_ID;
use crate::error::TaskError;
use crate::logging::log_sql_statement;
use crate::sql::{render_insert, render_insert_deduplicated, render_truncate, SqlTemplate};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

/// How a dimension table is (re)populated
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadMode {
    /// Insert new rows on top of existing ones
    Append,
    /// Empty the table, then insert, in one transaction
    #[default]
    TruncateInsert,
}

/// Populates a dimension table from staging or fact data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadDimensionTask {
    task_id: String,
    connection_id: String,
    table: String,
    select: SqlTemplate,
    mode: LoadMode,
    dedup_keys: Vec<String>,
}

impl LoadDimensionTask {
    pub fn new(
        task_id: impl Into<String>,
        table: impl Into<String>,
        select: SqlTemplate,
        mode: LoadMode,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            connection_id: DEFAULT_CONNECTION_ID.to_string(),
            table: table.into(),
            select,
            mode,
            dedup_keys: Vec::new(),
        }
    }

    pub fn with_connection(mut self, connection_id: impl Into<String>) -> Self {
        self.connection_id = connection_id.into();
        self
    }

    /// Key columns used to skip rows already present when appending
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

    pub fn mode(&self) -> LoadMode {
        self.mode
    }

    /// Statements for one execution, in order
    pub fn statements(&self) -> Result<Vec<String>, TaskError> {
        if self.select.is_ddl() {
            return Err(TaskError::invalid_parameter(
                "select",
                format!("{} is not a SELECT template", self.select),
            ));
        }

        match self.mode {
            LoadMode::TruncateInsert => Ok(vec![
                render_truncate(&self.table)?,
                render_insert(&self.table, self.select.sql())?,
            ]),
            LoadMode::Append if self.dedup_keys.is_empty() => {
                Ok(vec![render_insert(&self.table, self.select.sql())?])
            }
            LoadMode::Append => Ok(vec![render_insert_deduplicated(
                &self.table,
                &self.dedup_keys,
                self.select.sql(),
            )?]),
        }
    }
}

#[async_trait]
impl Task for LoadDimensionTask {
    fn task_id(&self) -> &str {
        &self.task_id
    }

    fn kind(&self) -> TaskKind {
        TaskKind::LoadDimension
    }

    fn connection_id(&self) -> Option<&str> {
        Some(&self.connection_id)
    }

    #[instrument(
        skip(self, context),
        fields(
            task_id = %self.task_id,
            table = %self.table,
            mode = ?self.mode,
            attempt = context.attempt
        )
    )]
    async fn execute(&self, context: &ExecutionContext) -> Result<(), TaskError> {
        let statements = self.statements()?;
        let hook = context.hook(&self.connection_id)?;

        for statement in &statements {
            log_sql_statement(&self.task_id, &self.connection_id, statement);
        }

        let rows = match self.mode {
            LoadMode::TruncateInsert => hook.run_batch(&statements).await?,
            LoadMode::Append => hook.run(&statements[0]).await?,
        };

        info!(rows_inserted = rows, "Dimension table load complete");
        Ok(())
    }
}
