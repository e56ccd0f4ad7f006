//! # Local Runner
//!
//! In-process host for a [`Dag`]. Each round takes every ready task, executes
//! the batch concurrently and records the outcomes on the [`DagRun`] before
//! looking for the next round. Retries are fixed-count, fixed-delay and apply
//! to every error kind alike.

use super::run::{DagRun, RunState, TaskInstanceState};
use super::Dag;
use crate::config::RetryPolicy;
use crate::constants::events;
use crate::error::{Result, TaskError};
use crate::logging::{log_error, log_task_operation};
use crate::tasks::{ExecutionContext, Task};
use crate::warehouse::ConnectionRegistry;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Final state of one task instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskReport {
    pub task_id: String,
    pub state: TaskInstanceState,
    pub attempts: u32,
    pub error: Option<String>,
}

/// Outcome of a complete run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DagRunReport {
    pub run_id: Uuid,
    pub dag_id: String,
    pub logical_date: DateTime<Utc>,
    pub state: RunState,
    /// In topological order
    pub tasks: Vec<TaskReport>,
}

impl DagRunReport {
    pub fn is_success(&self) -> bool {
        self.state == RunState::Success
    }

    pub fn task(&self, task_id: &str) -> Option<&TaskReport> {
        self.tasks.iter().find(|t| t.task_id == task_id)
    }

    pub fn tasks_in_state(&self, state: TaskInstanceState) -> Vec<&str> {
        self.tasks
            .iter()
            .filter(|t| t.state == state)
            .map(|t| t.task_id.as_str())
            .collect()
    }
}

/// Attempt history of one task within a round
struct TaskOutcome {
    task_id: String,
    /// Errors of the attempts that were retried
    retried: Vec<TaskError>,
    result: std::result::Result<(), TaskError>,
}

#[derive(Debug, Clone)]
pub struct LocalRunner {
    dag: Arc<Dag>,
    retry_policy: RetryPolicy,
    connections: ConnectionRegistry,
}

impl LocalRunner {
    pub fn new(dag: Arc<Dag>, retry_policy: RetryPolicy, connections: ConnectionRegistry) -> Self {
        Self {
            dag,
            retry_policy,
            connections,
        }
    }

    pub fn dag(&self) -> &Dag {
        &self.dag
    }

    /// Execute the whole DAG once for `logical_date`
    #[instrument(skip(self), fields(dag_id = %self.dag.dag_id()))]
    pub async fn run(&self, logical_date: DateTime<Utc>) -> Result<DagRunReport> {
        let mut run = DagRun::new(&self.dag, logical_date);
        let base_context = ExecutionContext::new(
            self.dag.dag_id(),
            logical_date,
            self.connections.clone(),
        )
        .with_run_id(run.run_id())
        .with_max_attempts(self.retry_policy.max_attempts());

        info!(
            event = events::RUN_STARTED,
            run_id = %run.run_id(),
            logical_date = %logical_date.to_rfc3339(),
            tasks = self.dag.len(),
            "DAG run started"
        );

        loop {
            let ready = run.ready_tasks();
            if ready.is_empty() {
                break;
            }

            let mut batch = Vec::with_capacity(ready.len());
            for task_id in &ready {
                // ready ids always come from the DAG itself
                if let Some(task) = self.dag.task(task_id) {
                    run.mark_running(task_id)?;
                    batch.push(self.execute_with_retries(Arc::clone(task), base_context.clone()));
                }
            }

            for outcome in join_all(batch).await {
                self.record(&mut run, outcome)?;
            }
        }

        let state = run.state();
        let report = DagRunReport {
            run_id: run.run_id(),
            dag_id: run.dag_id().to_string(),
            logical_date,
            state,
            tasks: run
                .task_ids()
                .iter()
                .map(|task_id| {
                    Ok(TaskReport {
                        task_id: task_id.clone(),
                        state: run.task_state(task_id)?,
                        attempts: run.attempts(task_id)?,
                        error: run.last_error(task_id)?.map(str::to_string),
                    })
                })
                .collect::<Result<Vec<_>>>()?,
        };

        let event = if state == RunState::Success {
            events::RUN_SUCCEEDED
        } else {
            events::RUN_FAILED
        };
        info!(event = %event, run_id = %report.run_id, state = %state, "DAG run finished");

        Ok(report)
    }

    async fn execute_with_retries(
        &self,
        task: Arc<dyn Task>,
        mut context: ExecutionContext,
    ) -> TaskOutcome {
        let task_id = task.task_id().to_string();
        let mut retried = Vec::new();

        loop {
            log_task_operation(
                events::TASK_STARTED,
                &context.dag_id,
                &task_id,
                Some(context.attempt),
                None,
            );

            match task.execute(&context).await {
                Ok(()) => {
                    return TaskOutcome {
                        task_id,
                        retried,
                        result: Ok(()),
                    }
                }
                Err(error) if !context.is_final_attempt() => {
                    warn!(
                        task_id = %task_id,
                        attempt = context.attempt,
                        transient = error.is_transient(),
                        error = %error,
                        retry_in_seconds = self.retry_policy.retry_delay.as_secs(),
                        "Task attempt failed, retrying"
                    );
                    log_task_operation(
                        events::TASK_UP_FOR_RETRY,
                        &context.dag_id,
                        &task_id,
                        Some(context.attempt),
                        Some(&error.to_string()),
                    );
                    retried.push(error);
                    tokio::time::sleep(self.retry_policy.retry_delay).await;
                    context = context.next_attempt();
                }
                Err(error) => {
                    return TaskOutcome {
                        task_id,
                        retried,
                        result: Err(error),
                    }
                }
            }
        }
    }

    /// Replay one task's attempts onto the run
    fn record(&self, run: &mut DagRun, outcome: TaskOutcome) -> Result<()> {
        let dag_id = self.dag.dag_id();
        let task_id = outcome.task_id.as_str();

        for error in &outcome.retried {
            run.mark_up_for_retry(task_id, error.to_string())?;
            run.mark_running(task_id)?;
        }

        let attempts = run.attempts(task_id)?;
        match outcome.result {
            Ok(()) => {
                run.mark_success(task_id)?;
                log_task_operation(events::TASK_SUCCEEDED, dag_id, task_id, Some(attempts), None);
            }
            Err(error) => {
                let message = error.to_string();
                log_error("runner", task_id, &message, Some(error.kind()));
                log_task_operation(
                    events::TASK_FAILED,
                    dag_id,
                    task_id,
                    Some(attempts),
                    Some(&message),
                );

                for skipped in run.mark_failed(task_id, message)? {
                    log_task_operation(
                        events::TASK_UPSTREAM_FAILED,
                        dag_id,
                        &skipped,
                        None,
                        Some(task_id),
                    );
                }
            }
        }
        Ok(())
    }
}
