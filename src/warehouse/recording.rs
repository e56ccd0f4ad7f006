//! In-memory warehouse hook that records statements.
//!
//! Scalar queries are answered from programmed responses keyed by the exact SQL
//! text (unmatched queries return the default scalar, 1). Failures can be
//! injected for any statement containing a given fragment, optionally only for
//! the first N matching calls.

use super::WarehouseHook;
use crate::error::TaskError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;

#[derive(Debug, Clone)]
struct InjectedFailure {
    fragment: String,
    error: TaskError,
    remaining: Option<u32>,
}

#[derive(Debug, Default)]
struct RecordingState {
    statements: Vec<String>,
    batches: Vec<Vec<String>>,
    scalars: HashMap<String, i64>,
    failures: Vec<InjectedFailure>,
}

/// Test double standing in for the warehouse
#[derive(Debug)]
pub struct RecordingWarehouse {
    state: Mutex<RecordingState>,
    default_scalar: i64,
}

impl Default for RecordingWarehouse {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingWarehouse {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RecordingState::default()),
            default_scalar: 1,
        }
    }

    /// Answer `sql` with `value`
    pub fn with_scalar(self, sql: impl Into<String>, value: i64) -> Self {
        self.state.lock().scalars.insert(sql.into(), value);
        self
    }

    /// Fail every statement containing `fragment`
    pub fn fail_on(self, fragment: impl Into<String>, error: TaskError) -> Self {
        self.push_failure(fragment.into(), error, None);
        self
    }

    /// Fail the first `times` statements containing `fragment`, then succeed
    pub fn fail_times(self, fragment: impl Into<String>, times: u32, error: TaskError) -> Self {
        self.push_failure(fragment.into(), error, Some(times));
        self
    }

    fn push_failure(&self, fragment: String, error: TaskError, remaining: Option<u32>) {
        self.state.lock().failures.push(InjectedFailure {
            fragment,
            error,
            remaining,
        });
    }

    /// Every statement seen, in order, including those inside batches
    pub fn statements(&self) -> Vec<String> {
        self.state.lock().statements.clone()
    }

    /// Statements grouped by `run_batch` call
    pub fn batches(&self) -> Vec<Vec<String>> {
        self.state.lock().batches.clone()
    }

    pub fn statement_count(&self) -> usize {
        self.state.lock().statements.len()
    }

    fn record(state: &mut RecordingState, sql: &str) -> Result<(), TaskError> {
        state.statements.push(sql.to_string());
        for failure in state.failures.iter_mut() {
            if !sql.contains(&failure.fragment) {
                continue;
            }
            match failure.remaining {
                None => return Err(failure.error.clone()),
                Some(0) => continue,
                Some(ref mut remaining) => {
                    *remaining -= 1;
                    return Err(failure.error.clone());
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl WarehouseHook for RecordingWarehouse {
    async fn run(&self, sql: &str) -> Result<u64, TaskError> {
        let mut state = self.state.lock();
        Self::record(&mut state, sql)?;
        Ok(0)
    }

    async fn run_batch(&self, statements: &[String]) -> Result<u64, TaskError> {
        let mut state = self.state.lock();
        state.batches.push(statements.to_vec());
        for statement in statements {
            Self::record(&mut state, statement)?;
        }
        Ok(0)
    }

    async fn query_scalar(&self, sql: &str) -> Result<i64, TaskError> {
        let mut state = self.state.lock();
        Self::record(&mut state, sql)?;
        Ok(state
            .scalars
            .get(sql)
            .copied()
            .unwrap_or(self.default_scalar))
    }
}
