//! # Pipeline Tasks
//!
//! A task is a named, immutable unit of work with a single `execute` operation.
//! The host decides when to call it; the task only talks to the warehouse
//! through the hook its connection id resolves to.
//!
//! ## Task Types
//!
//! - [`MarkerTask`] - no-op start / join / end markers
//! - [`SqlTask`] - runs one template from the SQL library (table creation)
//! - [`StageToWarehouseTask`] - bulk-loads JSON from object storage into a staging table
//! - [`LoadFactTask`] - append-only INSERT-SELECT into the fact table
//! - [`LoadDimensionTask`] - append or truncate-and-reload a dimension table
//! - [`DataQualityTask`] - read-only assertions over loaded tables

pub mod context;
pub mod load_dimension;
pub mod load_fact;
pub mod marker;
pub mod quality;
pub mod sql_task;
pub mod stage;

use crate::error::TaskError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use context::ExecutionContext;
pub use load_dimension::{LoadDimensionTask, LoadMode};
pub use load_fact::LoadFactTask;
pub use marker::MarkerTask;
pub use quality::{Assertion, DataQualityTask, Expectation, QualityCheck};
pub use sql_task::SqlTask;
pub use stage::StageToWarehouseTask;

/// Operation kind of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Marker,
    Sql,
    Stage,
    LoadFact,
    LoadDimension,
    QualityCheck,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Marker => "marker",
            Self::Sql => "sql",
            Self::Stage => "stage",
            Self::LoadFact => "load_fact",
            Self::LoadDimension => "load_dimension",
            Self::QualityCheck => "quality_check",
        };
        f.write_str(name)
    }
}

/// Capability shared by every pipeline task
#[async_trait]
pub trait Task: Send + Sync + fmt::Debug {
    /// Identifier, unique within its pipeline
    fn task_id(&self) -> &str;

    fn kind(&self) -> TaskKind;

    /// Warehouse connection the task runs against, `None` for markers
    fn connection_id(&self) -> Option<&str> {
        None
    }

    /// Run the task to completion for one attempt
    async fn execute(&self, context: &ExecutionContext) -> Result<(), TaskError>;
}
