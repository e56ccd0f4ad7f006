//! # Data Quality Checks
//!
//! Read-only assertions run after the loads. Each [`QualityCheck`] pairs a table
//! with an [`Assertion`]; the assertion supplies the probe query and the
//! predicate its scalar result must satisfy.
//!
//! A failing check raises [`TaskError::QualityCheckFailed`] carrying the table,
//! the assertion and the observed value. Retrying does not help: the data itself
//! is wrong.

use super::{ExecutionContext, Task, TaskKind};
use crate::config::QualityPolicy;
use crate::constants::DEFAULT_CONNECTION_ID;
use crate::error::{CheckFailure, TaskError};
use crate::logging::log_sql_statement;
use crate::sql::{render_null_count, render_row_count};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{info, instrument, warn};

/// Predicate over the scalar returned by a probe query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expectation {
    Equals(i64),
    GreaterThan(i64),
    LessThan(i64),
}

impl Expectation {
    pub fn holds(&self, observed: i64) -> bool {
        match self {
            Self::Equals(expected) => observed == *expected,
            Self::GreaterThan(bound) => observed > *bound,
            Self::LessThan(bound) => observed < *bound,
        }
    }
}

impl fmt::Display for Expectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Equals(expected) => write!(f, "== {expected}"),
            Self::GreaterThan(bound) => write!(f, "> {bound}"),
            Self::LessThan(bound) => write!(f, "< {bound}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum Assertion {
    /// Row count > 0
    HasRows,
    /// Null count in `column` == 0
    NoNulls { column: String },
    /// Arbitrary scalar query; must return a single BIGINT
    Scalar { sql: String, expect: Expectation },
}

impl Assertion {
    pub fn probe_sql(&self, table: &str) -> Result<String, TaskError> {
        match self {
            Self::HasRows => render_row_count(table),
            Self::NoNulls { column } => render_null_count(table, column),
            Self::Scalar { sql, .. } => Ok(sql.clone()),
        }
    }

    pub fn expectation(&self) -> Expectation {
        match self {
            Self::HasRows => Expectation::GreaterThan(0),
            Self::NoNulls { .. } => Expectation::Equals(0),
            Self::Scalar { expect, .. } => *expect,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Self::HasRows => "row count > 0".to_string(),
            Self::NoNulls { column } => format!("null count in {column} == 0"),
            Self::Scalar { sql, expect } => format!("({sql}) {expect}"),
        }
    }
}

/// One assertion against one table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityCheck {
    pub table: String,
    pub assertion: Assertion,
}

impl QualityCheck {
    pub fn has_rows(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            assertion: Assertion::HasRows,
        }
    }

    pub fn no_nulls(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            assertion: Assertion::NoNulls {
                column: column.into(),
            },
        }
    }

    pub fn scalar(table: impl Into<String>, sql: impl Into<String>, expect: Expectation) -> Self {
        Self {
            table: table.into(),
            assertion: Assertion::Scalar {
                sql: sql.into(),
                expect,
            },
        }
    }
}

/// Runs every configured check; passes only if all of them hold
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataQualityTask {
    task_id: String,
    connection_id: String,
    checks: Vec<QualityCheck>,
    policy: QualityPolicy,
}

impl DataQualityTask {
    pub fn new(task_id: impl Into<String>, checks: Vec<QualityCheck>) -> Self {
        Self {
            task_id: task_id.into(),
            connection_id: DEFAULT_CONNECTION_ID.to_string(),
            checks,
            policy: QualityPolicy::default(),
        }
    }

    pub fn with_connection(mut self, connection_id: impl Into<String>) -> Self {
        self.connection_id = connection_id.into();
        self
    }

    pub fn with_policy(mut self, policy: QualityPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn checks(&self) -> &[QualityCheck] {
        &self.checks
    }

    pub fn policy(&self) -> QualityPolicy {
        self.policy
    }
}

#[async_trait]
impl Task for DataQualityTask {
    fn task_id(&self) -> &str {
        &self.task_id
    }

    fn kind(&self) -> TaskKind {
        TaskKind::QualityCheck
    }

    fn connection_id(&self) -> Option<&str> {
        Some(&self.connection_id)
    }

    #[instrument(
        skip(self, context),
        fields(task_id = %self.task_id, checks = self.checks.len(), attempt = context.attempt)
    )]
    async fn execute(&self, context: &ExecutionContext) -> Result<(), TaskError> {
        if self.checks.is_empty() {
            return Err(TaskError::invalid_parameter(
                "checks",
                "a quality check task needs at least one check",
            ));
        }

        let hook = context.hook(&self.connection_id)?;
        let mut failures = Vec::new();

        for check in &self.checks {
            let probe = check.assertion.probe_sql(&check.table)?;
            log_sql_statement(&self.task_id, &self.connection_id, &probe);

            let observed = hook.query_scalar(&probe).await?;
            if check.assertion.expectation().holds(observed) {
                info!(
                    table = %check.table,
                    assertion = %check.assertion.describe(),
                    observed,
                    "Quality check passed"
                );
                continue;
            }

            warn!(
                table = %check.table,
                assertion = %check.assertion.describe(),
                observed,
                "Quality check failed"
            );
            failures.push(CheckFailure {
                table: check.table.clone(),
                assertion: check.assertion.describe(),
                observed,
            });

            if self.policy == QualityPolicy::FailFast {
                break;
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(TaskError::QualityCheckFailed {
                task_id: self.task_id.clone(),
                failures,
            })
        }
    }
}
