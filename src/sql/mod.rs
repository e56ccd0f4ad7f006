//! # SQL Template Library
//!
//! Parameterized SQL text for the songplay star schema.
//!
//! ## Key Components
//!
//! - [`queries`] - The fixed set of named [`SqlTemplate`]s (DDL and SELECT bodies)
//! - [`render`] - Statement builders wrapping templates into INSERT, COPY,
//!   TRUNCATE and quality-probe statements
//!
//! Every SELECT body lists its columns in the same order as the table it feeds,
//! and aliases them with the target column names, so the generic insert wrapper
//! and the deduplicating wrapper can both be applied to it.

pub mod queries;
pub mod render;

pub use queries::SqlTemplate;
pub use render::{
    quote_identifier, render_copy_json, render_insert, render_insert_deduplicated,
    render_null_count, render_row_count, render_truncate, StorageCredentials,
};
