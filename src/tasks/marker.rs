use super::{ExecutionContext, Task, TaskKind};
use crate::error::TaskError;
use async_trait::async_trait;
use tracing::debug;

/// No-op task marking a fan-out or fan-in point
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerTask {
    task_id: String,
}

impl MarkerTask {
    pub fn new(task_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
        }
    }
}

#[async_trait]
impl Task for MarkerTask {
    fn task_id(&self) -> &str {
        &self.task_id
    }

    fn kind(&self) -> TaskKind {
        TaskKind::Marker
    }

    async fn execute(&self, context: &ExecutionContext) -> Result<(), TaskError> {
        debug!(task_id = %self.task_id, run_id = %context.run_id, "Marker reached");
        Ok(())
    }
}
