//! Task instance bookkeeping for one run of a [`Dag`].
//!
//! A task is ready when it has not finished and every upstream succeeded. A
//! failed task marks every transitive downstream `upstream_failed`, so nothing
//! after a failure ever runs.

use super::Dag;
use crate::error::{PipelineError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// State of one task within one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskInstanceState {
    /// Not started yet
    #[default]
    None,
    Running,
    /// Failed an attempt, another one is allowed
    UpRetry,
    Success,
    /// Failed its final attempt
    Failed,
    /// Skipped because an upstream failed
    UpstreamFailed,
}

impl TaskInstanceState {
    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::UpstreamFailed)
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed | Self::UpstreamFailed)
    }

    /// Waiting for its first or next attempt
    pub fn is_schedulable(&self) -> bool {
        matches!(self, Self::None | Self::UpRetry)
    }
}

impl fmt::Display for TaskInstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Running => write!(f, "running"),
            Self::UpRetry => write!(f, "up_for_retry"),
            Self::Success => write!(f, "success"),
            Self::Failed => write!(f, "failed"),
            Self::UpstreamFailed => write!(f, "upstream_failed"),
        }
    }
}

impl std::str::FromStr for TaskInstanceState {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "running" => Ok(Self::Running),
            "up_for_retry" => Ok(Self::UpRetry),
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            "upstream_failed" => Ok(Self::UpstreamFailed),
            _ => Err(format!("Invalid task instance state: {s}")),
        }
    }
}

/// Overall state of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Running,
    Success,
    Failed,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Success => write!(f, "success"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct TaskInstance {
    state: TaskInstanceState,
    attempts: u32,
    last_error: Option<String>,
}

/// One execution of a DAG for a logical date
#[derive(Debug, Clone)]
pub struct DagRun {
    run_id: Uuid,
    dag_id: String,
    logical_date: DateTime<Utc>,
    order: Vec<String>,
    upstream: HashMap<String, Vec<String>>,
    descendants: HashMap<String, Vec<String>>,
    instances: HashMap<String, TaskInstance>,
}

impl DagRun {
    pub fn new(dag: &Dag, logical_date: DateTime<Utc>) -> Self {
        let order = dag.topological_order().to_vec();
        let upstream = order
            .iter()
            .map(|id| {
                let ups = dag.upstream(id).into_iter().map(str::to_string).collect();
                (id.clone(), ups)
            })
            .collect();
        let descendants = order
            .iter()
            .map(|id| {
                let downs = dag.descendants(id).into_iter().map(str::to_string).collect();
                (id.clone(), downs)
            })
            .collect();
        let instances = order
            .iter()
            .map(|id| (id.clone(), TaskInstance::default()))
            .collect();

        Self {
            run_id: Uuid::new_v4(),
            dag_id: dag.dag_id().to_string(),
            logical_date,
            order,
            upstream,
            descendants,
            instances,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn dag_id(&self) -> &str {
        &self.dag_id
    }

    pub fn logical_date(&self) -> DateTime<Utc> {
        self.logical_date
    }

    /// Task ids in topological order
    pub fn task_ids(&self) -> &[String] {
        &self.order
    }

    pub fn task_state(&self, task_id: &str) -> Result<TaskInstanceState> {
        self.instance(task_id).map(|i| i.state)
    }

    /// Attempts started so far
    pub fn attempts(&self, task_id: &str) -> Result<u32> {
        self.instance(task_id).map(|i| i.attempts)
    }

    pub fn last_error(&self, task_id: &str) -> Result<Option<&str>> {
        self.instance(task_id).map(|i| i.last_error.as_deref())
    }

    /// Tasks that may start now, in topological order
    pub fn ready_tasks(&self) -> Vec<String> {
        self.order
            .iter()
            .filter(|id| {
                self.instances[*id].state.is_schedulable()
                    && self.upstream[*id]
                        .iter()
                        .all(|up| self.instances[up].state == TaskInstanceState::Success)
            })
            .cloned()
            .collect()
    }

    pub fn mark_running(&mut self, task_id: &str) -> Result<()> {
        let instance = self.instance_mut(task_id)?;
        if !instance.state.is_schedulable() {
            return Err(invalid(task_id, instance.state, TaskInstanceState::Running));
        }
        instance.state = TaskInstanceState::Running;
        instance.attempts += 1;
        Ok(())
    }

    pub fn mark_success(&mut self, task_id: &str) -> Result<()> {
        self.finish_attempt(task_id, TaskInstanceState::Success, None)
    }

    pub fn mark_up_for_retry(&mut self, task_id: &str, error: impl Into<String>) -> Result<()> {
        self.finish_attempt(task_id, TaskInstanceState::UpRetry, Some(error.into()))
    }

    /// Fail `task_id` and return the downstream tasks it marked `upstream_failed`
    pub fn mark_failed(&mut self, task_id: &str, error: impl Into<String>) -> Result<Vec<String>> {
        self.finish_attempt(task_id, TaskInstanceState::Failed, Some(error.into()))?;

        let mut skipped = Vec::new();
        for downstream in &self.descendants[task_id] {
            if let Some(instance) = self.instances.get_mut(downstream) {
                if !instance.state.is_terminal() {
                    instance.state = TaskInstanceState::UpstreamFailed;
                    skipped.push(downstream.clone());
                }
            }
        }
        Ok(skipped)
    }

    pub fn is_complete(&self) -> bool {
        self.instances.values().all(|i| i.state.is_terminal())
    }

    pub fn state(&self) -> RunState {
        if !self.is_complete() {
            RunState::Running
        } else if self.instances.values().any(|i| i.state.is_failure()) {
            RunState::Failed
        } else {
            RunState::Success
        }
    }

    /// Task ids currently in `state`, in topological order
    pub fn tasks_in_state(&self, state: TaskInstanceState) -> Vec<&str> {
        self.order
            .iter()
            .filter(|id| self.instances[*id].state == state)
            .map(String::as_str)
            .collect()
    }

    fn finish_attempt(
        &mut self,
        task_id: &str,
        to: TaskInstanceState,
        error: Option<String>,
    ) -> Result<()> {
        let instance = self.instance_mut(task_id)?;
        if instance.state != TaskInstanceState::Running {
            return Err(invalid(task_id, instance.state, to));
        }
        instance.state = to;
        instance.last_error = error;
        Ok(())
    }

    fn instance(&self, task_id: &str) -> Result<&TaskInstance> {
        self.instances
            .get(task_id)
            .ok_or_else(|| PipelineError::UnknownTask {
                task_id: task_id.to_string(),
            })
    }

    fn instance_mut(&mut self, task_id: &str) -> Result<&mut TaskInstance> {
        self.instances
            .get_mut(task_id)
            .ok_or_else(|| PipelineError::UnknownTask {
                task_id: task_id.to_string(),
            })
    }
}

fn invalid(task_id: &str, from: TaskInstanceState, to: TaskInstanceState) -> PipelineError {
    PipelineError::InvalidTransition {
        task_id: task_id.to_string(),
        from: from.to_string(),
        to: to.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::DagBuilder;
    use crate::tasks::MarkerTask;
    use std::sync::Arc;

    /// a -> b -> c, a -> d
    fn dag() -> Dag {
        let mut builder = DagBuilder::new("run_test");
        for id in ["a", "b", "c", "d"] {
            builder.add_task(Arc::new(MarkerTask::new(id))).unwrap();
        }
        builder.chain(&["a", "b", "c"]).unwrap();
        builder.add_edge("a", "d").unwrap();
        builder.build().unwrap()
    }

    #[test]
    fn test_only_roots_ready_initially() {
        let run = DagRun::new(&dag(), Utc::now());
        assert_eq!(run.ready_tasks(), vec!["a"]);
        assert_eq!(run.state(), RunState::Running);
    }

    #[test]
    fn test_success_unlocks_downstream() {
        let mut run = DagRun::new(&dag(), Utc::now());
        run.mark_running("a").unwrap();
        assert!(run.ready_tasks().is_empty());
        run.mark_success("a").unwrap();

        let mut ready = run.ready_tasks();
        ready.sort();
        assert_eq!(ready, vec!["b", "d"]);
    }

    #[test]
    fn test_failure_marks_transitive_downstream() {
        let mut run = DagRun::new(&dag(), Utc::now());
        run.mark_running("a").unwrap();
        let mut skipped = run.mark_failed("a", "boom").unwrap();
        skipped.sort();

        assert_eq!(skipped, vec!["b", "c", "d"]);
        assert_eq!(run.task_state("c").unwrap(), TaskInstanceState::UpstreamFailed);
        assert_eq!(run.last_error("a").unwrap(), Some("boom"));
        assert!(run.ready_tasks().is_empty());
        assert_eq!(run.state(), RunState::Failed);
    }

    #[test]
    fn test_retry_makes_task_ready_again() {
        let mut run = DagRun::new(&dag(), Utc::now());
        run.mark_running("a").unwrap();
        run.mark_up_for_retry("a", "timeout").unwrap();

        assert_eq!(run.ready_tasks(), vec!["a"]);
        run.mark_running("a").unwrap();
        assert_eq!(run.attempts("a").unwrap(), 2);
    }

    #[test]
    fn test_invalid_transitions() {
        let mut run = DagRun::new(&dag(), Utc::now());
        assert!(matches!(
            run.mark_success("a"),
            Err(PipelineError::InvalidTransition { .. })
        ));

        run.mark_running("a").unwrap();
        run.mark_success("a").unwrap();
        assert!(matches!(
            run.mark_running("a"),
            Err(PipelineError::InvalidTransition { .. })
        ));
        assert!(matches!(
            run.mark_running("missing"),
            Err(PipelineError::UnknownTask { .. })
        ));
    }

    #[test]
    fn test_all_success_completes_run() {
        let mut run = DagRun::new(&dag(), Utc::now());
        while let Some(next) = run.ready_tasks().into_iter().next() {
            run.mark_running(&next).unwrap();
            run.mark_success(&next).unwrap();
        }
        assert_eq!(run.state(), RunState::Success);
        assert_eq!(run.tasks_in_state(TaskInstanceState::Success).len(), 4);
    }

    #[test]
    fn test_state_string_round_trip() {
        for state in [
            TaskInstanceState::None,
            TaskInstanceState::UpRetry,
            TaskInstanceState::UpstreamFailed,
        ] {
            assert_eq!(state.to_string().parse::<TaskInstanceState>().unwrap(), state);
        }
    }
}
