//! DAG Run Scenarios
//!
//! Drives the songplay pipeline through task instance bookkeeping and the
//! local runner with a recording warehouse: readiness at the join, skipping
//! after failures, and fixed-count retries.

use chrono::{TimeZone, Utc};
use songplay_pipeline::config::{PipelineConfig, RetryPolicy};
use songplay_pipeline::constants::task_ids;
use songplay_pipeline::dag::sparkify::quality_checks;
use songplay_pipeline::dag::{
    build_pipeline, Dag, DagRun, LocalRunner, RunState, TaskInstanceState,
};
use songplay_pipeline::error::TaskError;
use songplay_pipeline::tasks::Assertion;
use songplay_pipeline::warehouse::{ConnectionRegistry, RecordingWarehouse};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn pipeline() -> Arc<Dag> {
    Arc::new(build_pipeline(&PipelineConfig::default()).unwrap())
}

/// Warehouse on which every quality check passes
fn healthy_warehouse() -> RecordingWarehouse {
    quality_checks()
        .into_iter()
        .filter(|check| matches!(check.assertion, Assertion::NoNulls { .. }))
        .fold(RecordingWarehouse::new(), |warehouse, check| {
            let probe = check.assertion.probe_sql(&check.table).unwrap();
            warehouse.with_scalar(probe, 0)
        })
}

fn runner(warehouse: Arc<RecordingWarehouse>, retries: u32, delay: Duration) -> LocalRunner {
    LocalRunner::new(
        pipeline(),
        RetryPolicy {
            retries,
            retry_delay: delay,
        },
        ConnectionRegistry::new().with_hook("redshift", warehouse),
    )
}

fn logical_date() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2019, 1, 12, 0, 0, 0).unwrap()
}

#[test]
fn join_is_ready_only_after_all_creations_succeed() {
    let dag = pipeline();
    let mut run = DagRun::new(&dag, logical_date());

    run.mark_running(task_ids::BEGIN_EXECUTION).unwrap();
    run.mark_success(task_ids::BEGIN_EXECUTION).unwrap();

    let mut ready = run.ready_tasks();
    ready.sort();
    let mut creations: Vec<String> =
        task_ids::TABLE_CREATION.iter().map(|s| s.to_string()).collect();
    creations.sort();
    assert_eq!(ready, creations);

    let (last, rest) = task_ids::TABLE_CREATION.split_last().unwrap();
    for id in rest {
        run.mark_running(id).unwrap();
        run.mark_success(id).unwrap();
        assert!(!run
            .ready_tasks()
            .contains(&task_ids::WAIT_FOR_TABLE_CREATION.to_string()));
    }

    run.mark_running(last).unwrap();
    run.mark_success(last).unwrap();
    assert_eq!(run.ready_tasks(), vec![task_ids::WAIT_FOR_TABLE_CREATION.to_string()]);
}

#[test]
fn creation_failure_skips_everything_after_the_join() {
    let dag = pipeline();
    let mut run = DagRun::new(&dag, logical_date());

    run.mark_running(task_ids::BEGIN_EXECUTION).unwrap();
    run.mark_success(task_ids::BEGIN_EXECUTION).unwrap();
    run.mark_running(task_ids::CREATE_SONG_TABLE).unwrap();
    let skipped = run
        .mark_failed(task_ids::CREATE_SONG_TABLE, "permission denied")
        .unwrap();

    // join, two stages, fact, four dimensions, checks, stop
    assert_eq!(skipped.len(), 10);
    assert_eq!(
        run.task_state(task_ids::STOP_EXECUTION).unwrap(),
        TaskInstanceState::UpstreamFailed
    );
    // sibling creations are unaffected and still runnable
    assert_eq!(run.ready_tasks().len(), 6);
}

#[tokio::test]
async fn healthy_run_succeeds_in_dependency_order() {
    let warehouse = Arc::new(healthy_warehouse());
    let report = runner(warehouse.clone(), 0, Duration::ZERO)
        .run(logical_date())
        .await
        .unwrap();

    assert!(report.is_success(), "{report:?}");
    assert_eq!(report.tasks.len(), 18);
    assert!(report.tasks.iter().all(|t| t.attempts == 1 && t.error.is_none()));

    let statements = warehouse.statements();
    let first = |prefix: &str| statements.iter().position(|s| s.starts_with(prefix)).unwrap();
    let last = |prefix: &str| statements.iter().rposition(|s| s.starts_with(prefix)).unwrap();

    assert!(last("CREATE TABLE") < first("COPY"));
    assert!(last("COPY") < first("INSERT INTO \"songplays\""));
    assert!(first("INSERT INTO \"songplays\"") < first("TRUNCATE TABLE"));
    assert!(last("INSERT INTO") < first("SELECT COUNT(*)"));
}

#[tokio::test]
async fn transient_failures_are_retried_until_success() {
    let warehouse = Arc::new(healthy_warehouse().fail_times(
        "COPY \"staging_songs\"",
        2,
        TaskError::connection("connection reset"),
    ));
    let report = runner(warehouse, 3, Duration::ZERO)
        .run(logical_date())
        .await
        .unwrap();

    assert_eq!(report.state, RunState::Success);
    let stage = report.task(task_ids::STAGE_SONGS).unwrap();
    assert_eq!(stage.state, TaskInstanceState::Success);
    assert_eq!(stage.attempts, 3);
    assert_eq!(report.task(task_ids::STAGE_EVENTS).unwrap().attempts, 1);
}

#[tokio::test]
async fn retries_wait_for_the_configured_delay() {
    let warehouse = Arc::new(healthy_warehouse().fail_times(
        "CREATE TABLE IF NOT EXISTS songplays",
        2,
        TaskError::connection("timeout"),
    ));

    let started = Instant::now();
    let report = runner(warehouse, 2, Duration::from_millis(20))
        .run(logical_date())
        .await
        .unwrap();

    assert!(report.is_success());
    assert!(started.elapsed() >= Duration::from_millis(40));
}

#[tokio::test]
async fn exhausted_retries_fail_the_run_and_skip_downstream() {
    let warehouse = Arc::new(healthy_warehouse().fail_on(
        "COPY \"staging_events\"",
        TaskError::sql("COPY", "S3 prefix not found"),
    ));
    let report = runner(warehouse.clone(), 1, Duration::ZERO)
        .run(logical_date())
        .await
        .unwrap();

    assert_eq!(report.state, RunState::Failed);

    let stage = report.task(task_ids::STAGE_EVENTS).unwrap();
    assert_eq!(stage.state, TaskInstanceState::Failed);
    assert_eq!(stage.attempts, 2);
    assert!(stage.error.as_deref().unwrap().contains("staging_events"));

    assert_eq!(
        report.task(task_ids::STAGE_SONGS).unwrap().state,
        TaskInstanceState::Success
    );

    let mut skipped = report.tasks_in_state(TaskInstanceState::UpstreamFailed);
    skipped.sort_unstable();
    let mut expected = vec![
        task_ids::LOAD_SONGPLAYS_FACT_TABLE,
        task_ids::RUN_DATA_QUALITY_CHECKS,
        task_ids::STOP_EXECUTION,
    ];
    expected.extend_from_slice(task_ids::DIMENSION_LOADS);
    expected.sort_unstable();
    assert_eq!(skipped, expected);

    assert!(warehouse
        .statements()
        .iter()
        .all(|s| !s.starts_with("INSERT") && !s.starts_with("TRUNCATE")));
}

#[tokio::test]
async fn failed_quality_check_fails_the_run() {
    // null probes answer 1 by default
    let warehouse = Arc::new(RecordingWarehouse::new());
    let report = runner(warehouse, 0, Duration::ZERO)
        .run(logical_date())
        .await
        .unwrap();

    assert_eq!(report.state, RunState::Failed);
    let checks = report.task(task_ids::RUN_DATA_QUALITY_CHECKS).unwrap();
    assert_eq!(checks.state, TaskInstanceState::Failed);
    assert!(checks.error.as_deref().unwrap().contains("songplays"));
    assert_eq!(
        report.task(task_ids::STOP_EXECUTION).unwrap().state,
        TaskInstanceState::UpstreamFailed
    );
    assert_eq!(report.tasks_in_state(TaskInstanceState::Success).len(), 16);
}
