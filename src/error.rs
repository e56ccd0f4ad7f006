//! # Pipeline Error Types
//!
//! Structured error types for task execution and pipeline definition using
//! thiserror instead of `Box<dyn Error>` patterns.
//!
//! Every task failure is reported to the host as a [`TaskError`]; the core never
//! attempts local recovery. [`PipelineError`] covers definition-time and
//! run-bookkeeping failures and wraps task errors where they cross that boundary.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// A single failed data-quality assertion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckFailure {
    /// Table the assertion ran against
    pub table: String,
    /// Human readable assertion, e.g. `row count > 0`
    pub assertion: String,
    /// Value returned by the warehouse
    pub observed: i64,
}

impl fmt::Display for CheckFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: expected {}, observed {}",
            self.table, self.assertion, self.observed
        )
    }
}

fn join_failures(failures: &[CheckFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors raised by a task's `execute` operation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TaskError {
    #[error("Warehouse connection error: {message}")]
    Connection { message: String },

    #[error("Unknown connection id: {connection_id}")]
    UnknownConnection { connection_id: String },

    #[error("Staging into {table} failed: {message}")]
    Staging { table: String, message: String },

    #[error("SQL execution error: {message} (statement: {statement})")]
    Sql { statement: String, message: String },

    #[error("Data quality check failed in {task_id}: {}", join_failures(.failures))]
    QualityCheckFailed {
        task_id: String,
        failures: Vec<CheckFailure>,
    },

    #[error("Invalid parameter {name}: {reason}")]
    InvalidParameter { name: String, reason: String },
}

impl TaskError {
    /// Create a connection error
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Create a SQL execution error
    pub fn sql(statement: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Sql {
            statement: statement.into(),
            message: message.into(),
        }
    }

    /// Create an invalid parameter error
    pub fn invalid_parameter(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Classify a sqlx error raised while running `statement`.
    ///
    /// Pool, IO, TLS and timeout failures are connection errors; everything the
    /// server itself rejected is a SQL error.
    pub fn from_sqlx(error: sqlx::Error, statement: &str) -> Self {
        match error {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed
            | sqlx::Error::Configuration(_) => Self::Connection {
                message: error.to_string(),
            },
            other => Self::Sql {
                statement: statement.to_string(),
                message: other.to_string(),
            },
        }
    }

    /// Whether a retry could plausibly succeed.
    ///
    /// Informational only: the host retries every failure the same way.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }

    /// Short machine-readable category used in structured logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connection { .. } => "connection",
            Self::UnknownConnection { .. } => "unknown_connection",
            Self::Staging { .. } => "staging",
            Self::Sql { .. } => "sql",
            Self::QualityCheckFailed { .. } => "quality_check",
            Self::InvalidParameter { .. } => "invalid_parameter",
        }
    }
}

/// Errors raised while defining a pipeline or tracking a run
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    #[error("Task already defined: {task_id}")]
    DuplicateTask { task_id: String },

    #[error("Unknown task: {task_id}")]
    UnknownTask { task_id: String },

    #[error("Task {task_id} cannot depend on itself")]
    SelfDependency { task_id: String },

    #[error("Cycle detected in pipeline at task {task_id}")]
    CycleDetected { task_id: String },

    #[error("Invalid state transition for {task_id}: {from} -> {to}")]
    InvalidTransition {
        task_id: String,
        from: String,
        to: String,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Task(#[from] TaskError),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
