//! # Structured Logging Module
//!
//! Environment-aware structured logging that outputs to both the console and a
//! JSON log file, plus helpers that emit the pipeline's structured task events.

use chrono::Utc;
use std::path::PathBuf;
use std::process;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging with environment-specific configuration.
///
/// Safe to call more than once; only the first call installs a subscriber.
pub fn init_structured_logging() {
    init_structured_logging_with_level(None);
}

/// Initialize structured logging, with `level` replacing the environment's
/// default level. `RUST_LOG` still takes precedence when set.
pub fn init_structured_logging_with_level(level: Option<&str>) {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let log_level = resolve_log_level(level, &environment);
        let log_dir = PathBuf::from("log");

        let pid = process::id();
        let timestamp = Utc::now().format("%Y%m%d_%H%M%S").to_string();
        let log_filename = format!("{environment}.{pid}.{timestamp}.log");

        let console_layer = fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_level(true)
            .with_ansi(true)
            .with_filter(build_filter(&log_level));

        // Fall back to console-only output when the log directory is unusable
        let file_layer = std::fs::create_dir_all(&log_dir).ok().map(|()| {
            let file_appender = tracing_appender::rolling::never(&log_dir, &log_filename);
            let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
            // The writer must outlive every span; keep it for the process lifetime
            std::mem::forget(guard);
            fmt::layer()
                .with_writer(file_writer)
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .with_ansi(false)
                .json()
                .with_filter(build_filter(&log_level))
        });

        let subscriber = tracing_subscriber::registry()
            .with(console_layer)
            .with(file_layer);

        if subscriber.try_init().is_err() {
            tracing::debug!("Global tracing subscriber already initialized");
            return;
        }

        tracing::info!(
            pid = pid,
            environment = %environment,
            log_file = %log_dir.join(&log_filename).display(),
            "Structured logging initialized"
        );
    });
}

fn build_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Get current environment from environment variables
fn get_environment() -> String {
    std::env::var("SONGPLAY_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

/// Get log level based on environment
fn get_log_level(environment: &str) -> String {
    match environment {
        "production" => "info".to_string(),
        _ => "debug".to_string(),
    }
}

fn resolve_log_level(requested: Option<&str>, environment: &str) -> String {
    requested
        .map(str::to_string)
        .unwrap_or_else(|| get_log_level(environment))
}

/// Log structured data for a task lifecycle event
pub fn log_task_operation(
    event: &str,
    dag_id: &str,
    task_id: &str,
    attempt: Option<u32>,
    details: Option<&str>,
) {
    tracing::info!(
        event = %event,
        dag_id = %dag_id,
        task_id = %task_id,
        attempt = attempt,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "TASK_OPERATION"
    );
}

/// Log a statement about to be sent to the warehouse (already redacted)
pub fn log_sql_statement(task_id: &str, connection_id: &str, statement: &str) {
    tracing::debug!(
        task_id = %task_id,
        connection_id = %connection_id,
        statement = %statement,
        "SQL_STATEMENT"
    );
}

/// Log error with full context
pub fn log_error(component: &str, operation: &str, error: &str, context: Option<&str>) {
    tracing::error!(
        component = %component,
        operation = %operation,
        error = %error,
        context = context,
        timestamp = %Utc::now().to_rfc3339(),
        "ERROR"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_mapping() {
        assert_eq!(get_log_level("test"), "debug");
        assert_eq!(get_log_level("development"), "debug");
        assert_eq!(get_log_level("production"), "info");
        assert_eq!(get_log_level("unknown"), "debug");
    }

    #[test]
    fn test_requested_level_overrides_environment_default() {
        assert_eq!(resolve_log_level(Some("warn"), "development"), "warn");
        assert_eq!(resolve_log_level(Some("trace"), "production"), "trace");
        assert_eq!(resolve_log_level(None, "production"), "info");
    }

    #[test]
    fn test_init_is_idempotent() {
        init_structured_logging_with_level(Some("info"));
        init_structured_logging();
        log_task_operation("task.started", "dag", "task", Some(1), None);
    }
}
