//! Per-attempt execution context handed to `Task::execute`.

use crate::error::TaskError;
use crate::warehouse::{ConnectionRegistry, WarehouseHook};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

/// Run metadata for one task attempt.
///
/// Built by the host for every attempt and only read by tasks.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub dag_id: String,
    pub run_id: Uuid,
    /// Start of the schedule interval this run covers
    pub logical_date: DateTime<Utc>,
    /// 1-based attempt number
    pub attempt: u32,
    pub max_attempts: u32,
    connections: ConnectionRegistry,
}

impl ExecutionContext {
    pub fn new(
        dag_id: impl Into<String>,
        logical_date: DateTime<Utc>,
        connections: ConnectionRegistry,
    ) -> Self {
        Self {
            dag_id: dag_id.into(),
            run_id: Uuid::new_v4(),
            logical_date,
            attempt: 1,
            max_attempts: 1,
            connections,
        }
    }

    pub fn with_run_id(mut self, run_id: Uuid) -> Self {
        self.run_id = run_id;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Context for the following retry of the same run
    pub fn next_attempt(&self) -> Self {
        let mut next = self.clone();
        next.attempt += 1;
        next
    }

    pub fn is_final_attempt(&self) -> bool {
        self.attempt >= self.max_attempts
    }

    pub fn connections(&self) -> &ConnectionRegistry {
        &self.connections
    }

    /// Resolve the warehouse hook for `connection_id`
    pub fn hook(&self, connection_id: &str) -> Result<Arc<dyn WarehouseHook>, TaskError> {
        self.connections.resolve(connection_id)
    }

    /// Substitute `{ds}`, `{ds_nodash}`, `{ts_nodash}`, `{year}`, `{month}` and
    /// `{day}` from the logical date.
    pub fn render(&self, template: &str) -> Result<String, TaskError> {
        let mut rendered = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(open) = rest.find('{') {
            rendered.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            let close = after.find('}').ok_or_else(|| {
                TaskError::invalid_parameter(
                    "template",
                    format!("unclosed placeholder in '{template}'"),
                )
            })?;
            rendered.push_str(&self.placeholder(&after[..close], template)?);
            rest = &after[close + 1..];
        }
        rendered.push_str(rest);

        Ok(rendered)
    }

    fn placeholder(&self, name: &str, template: &str) -> Result<String, TaskError> {
        let date = self.logical_date;
        let value = match name {
            "ds" => date.format("%Y-%m-%d").to_string(),
            "ds_nodash" => date.format("%Y%m%d").to_string(),
            "ts_nodash" => date.format("%Y%m%dT%H%M%S").to_string(),
            "year" => date.format("%Y").to_string(),
            "month" => date.format("%m").to_string(),
            "day" => date.format("%d").to_string(),
            other => {
                return Err(TaskError::invalid_parameter(
                    "template",
                    format!("unknown placeholder '{{{other}}}' in '{template}'"),
                ))
            }
        };
        Ok(value)
    }
}
