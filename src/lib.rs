#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Songplay Pipeline
//!
//! A warehouse ETL pipeline expressed as a DAG of tasks. Raw listening events
//! and song metadata are bulk-copied from object storage into staging tables,
//! transformed into a star schema (the `songplays` fact table plus the `users`,
//! `songs`, `artists` and `time` dimensions) and finally checked for quality.
//!
//! ## Architecture
//!
//! Tasks are immutable values implementing [`tasks::Task`]. They receive an
//! explicit [`tasks::ExecutionContext`] per attempt and reach the warehouse
//! only through a [`warehouse::WarehouseHook`] resolved by connection id. The
//! [`dag::Dag`] holds the tasks and their dependency edges; scheduling, retries
//! and state tracking belong to the host ([`dag::LocalRunner`] in process).
//!
//! ## Module Organization
//!
//! - [`sql`] - SQL template library and statement rendering
//! - [`tasks`] - staging, fact, dimension, quality and marker tasks
//! - [`dag`] - pipeline definition, run bookkeeping and local runner
//! - [`warehouse`] - warehouse hook trait, Postgres/Redshift hook, recording double
//! - [`config`] - YAML + environment configuration
//! - [`error`] - structured error handling
//! - [`logging`] - tracing initialisation and structured operation logs
//! - [`constants`] - task ids, table names, lifecycle events
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use songplay_pipeline::config::ConfigManager;
//! use songplay_pipeline::dag::{build_pipeline, LocalRunner};
//! use songplay_pipeline::warehouse::{ConnectionRegistry, PostgresHook};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load_from_file("config/pipeline.yaml")?;
//! let config = manager.config();
//!
//! let dag = Arc::new(build_pipeline(config)?);
//! let hook = PostgresHook::connect(&config.warehouse).await?;
//! let connections =
//!     ConnectionRegistry::new().with_hook(config.warehouse.connection_id.clone(), Arc::new(hook));
//!
//! let report = LocalRunner::new(dag, config.retry_policy(), connections)
//!     .run(chrono::Utc::now())
//!     .await?;
//! println!("run finished: {}", report.state);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod dag;
pub mod error;
pub mod logging;
pub mod sql;
pub mod tasks;
pub mod warehouse;

pub use config::{ConfigManager, PipelineConfig, RetryPolicy};
pub use dag::{build_pipeline, Dag, DagBuilder, DagRun, DagRunReport, LocalRunner};
pub use error::{CheckFailure, PipelineError, Result, TaskError};
pub use tasks::{ExecutionContext, Task, TaskKind};
pub use warehouse::{ConnectionRegistry, WarehouseHook};
