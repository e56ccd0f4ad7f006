use super::{ExecutionContext, Task, TaskKind};
use crate::constants::DEFAULT_CONNECTION_ID;
use crate::error::TaskError;
use crate::logging::log_sql_statement;
use crate::sql::SqlTemplate;
use async_trait::async_trait;
use tracing::{info, instrument};

/// Runs one template from the SQL library as-is.
///
/// Used for the table-creation tasks; the templates are `IF NOT EXISTS`
/// creates, so re-running is harmless.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlTask {
    task_id: String,
    connection_id: String,
    template: SqlTemplate,
}

impl SqlTask {
    pub fn new(task_id: impl Into<String>, template: SqlTemplate) -> Self {
        Self {
            task_id: task_id.into(),
            connection_id: DEFAULT_CONNECTION_ID.to_string(),
            template,
        }
    }

    pub fn with_connection(mut self, connection_id: impl Into<String>) -> Self {
        self.connection_id = connection_id.into();
        self
    }

    pub fn template(&self) -> SqlTemplate {
        self.template
    }
}

#[async_trait]
impl Task for SqlTask {
    fn task_id(&self) -> &str {
        &self.task_id
    }

    fn kind(&self) -> TaskKind {
        TaskKind::Sql
    }

    fn connection_id(&self) -> Option<&str> {
        Some(&self.connection_id)
    }

    #[instrument(
        skip(self, context),
        fields(task_id = %self.task_id, template = %self.template, attempt = context.attempt)
    )]
    async fn execute(&self, context: &ExecutionContext) -> Result<(), TaskError> {
        let hook = context.hook(&self.connection_id)?;
        let statement = self.template.sql();

        log_sql_statement(&self.task_id, &self.connection_id, statement);
        hook.run(statement).await?;

        info!(template = %self.template, "SQL template executed");
        Ok(())
    }
}
