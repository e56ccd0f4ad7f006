//! Object storage to staging table bulk load.

use super::{ExecutionContext, Task, TaskKind};
use crate::constants::DEFAULT_CONNECTION_ID;
use crate::error::TaskError;
use crate::logging::log_sql_statement;
use crate::sql::render::redact;
use crate::sql::{render_copy_json, render_truncate, StorageCredentials};
use async_trait::async_trait;
use tracing::{info, instrument};

/// Copies newline-delimited JSON records into a staging table.
///
/// Rows are appended; a rerun over the same source duplicates them unless
/// `truncate_first` is set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageToWarehouseTask {
    task_id: String,
    connection_id: String,
    table: String,
    bucket: String,
    /// Key prefix, may contain logical-date placeholders
    key: String,
    region: String,
    /// `auto` or the location of a JSONPaths file
    json_format: String,
    credentials: StorageCredentials,
    truncate_first: bool,
}

impl StageToWarehouseTask {
    pub fn new(
        task_id: impl Into<String>,
        table: impl Into<String>,
        bucket: impl Into<String>,
        key: impl Into<String>,
        credentials: StorageCredentials,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            connection_id: DEFAULT_CONNECTION_ID.to_string(),
            table: table.into(),
            bucket: bucket.into(),
            key: key.into(),
            region: "us-west-2".to_string(),
            json_format: "auto".to_string(),
            credentials,
            truncate_first: false,
        }
    }

    pub fn with_connection(mut self, connection_id: impl Into<String>) -> Self {
        self.connection_id = connection_id.into();
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    pub fn with_json_format(mut self, json_format: impl Into<String>) -> Self {
        self.json_format = json_format.into();
        self
    }

    pub fn truncate_first(mut self, truncate_first: bool) -> Self {
        self.truncate_first = truncate_first;
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Fully rendered `s3://bucket/key` for this run
    pub fn source_uri(&self, context: &ExecutionContext) -> Result<String, TaskError> {
        let key = context.render(&self.key)?;
        Ok(format!(
            "s3://{}/{}",
            self.bucket.trim_end_matches('/'),
            key.trim_start_matches('/')
        ))
    }

    fn statements(&self, context: &ExecutionContext) -> Result<Vec<String>, TaskError> {
        let copy = render_copy_json(
            &self.table,
            &self.source_uri(context)?,
            &self.credentials,
            &self.region,
            &self.json_format,
        )?;

        if self.truncate_first {
            Ok(vec![render_truncate(&self.table)?, copy])
        } else {
            Ok(vec![copy])
        }
    }
}

#[async_trait]
impl Task for StageToWarehouseTask {
    fn task_id(&self) -> &str {
        &self.task_id
    }

    fn kind(&self) -> TaskKind {
        TaskKind::Stage
    }

    fn connection_id(&self) -> Option<&str> {
        Some(&self.connection_id)
    }

    #[instrument(
        skip(self, context),
        fields(task_id = %self.task_id, table = %self.table, attempt = context.attempt)
    )]
    async fn execute(&self, context: &ExecutionContext) -> Result<(), TaskError> {
        let statements = self.statements(context)?;
        let hook = context.hook(&self.connection_id)?;

        for statement in &statements {
            log_sql_statement(
                &self.task_id,
                &self.connection_id,
                &redact(statement, &self.credentials),
            );
        }

        let result = if statements.len() == 1 {
            hook.run(&statements[0]).await
        } else {
            hook.run_batch(&statements).await
        };

        result.map_err(|error| match error {
            TaskError::Sql { message, .. } => TaskError::Staging {
                table: self.table.clone(),
                message,
            },
            other => other,
        })?;

        info!(source = %self.source_uri(context)?, "Staging copy complete");
        Ok(())
    }
}
