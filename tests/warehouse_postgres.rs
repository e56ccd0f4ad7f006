//! Postgres-backed Load Tests
//!
//! Exercise the load and quality tasks against a real Postgres-protocol
//! database. Each test works in its own schema. Skipped unless `DATABASE_URL`
//! is set.

use chrono::{TimeZone, Utc};
use songplay_pipeline::config::PipelineConfig;
use songplay_pipeline::constants::task_ids;
use songplay_pipeline::dag::{build_pipeline, Dag};
use songplay_pipeline::error::TaskError;
use songplay_pipeline::tasks::{DataQualityTask, ExecutionContext, QualityCheck, Task};
use songplay_pipeline::warehouse::{ConnectionRegistry, PostgresHook, WarehouseHook};
use sqlx::postgres::PgPoolOptions;
use sqlx::Executor;
use std::sync::Arc;
use uuid::Uuid;

struct Fixture {
    hook: Arc<PostgresHook>,
    dag: Dag,
    context: ExecutionContext,
    schema: String,
}

impl Fixture {
    /// `None` when no database is configured
    async fn setup() -> Option<Self> {
        let Ok(url) = std::env::var("DATABASE_URL") else {
            eprintln!("DATABASE_URL not set, skipping Postgres test");
            return None;
        };

        let schema = format!("songplay_test_{}", Uuid::new_v4().simple());
        let admin = PgPoolOptions::new()
            .max_connections(1)
            .connect(&url)
            .await
            .expect("connect to DATABASE_URL");
        sqlx::raw_sql(&format!("CREATE SCHEMA {schema}"))
            .execute(&admin)
            .await
            .expect("create test schema");
        admin.close().await;

        let search_path = schema.clone();
        let pool = PgPoolOptions::new()
            .max_connections(2)
            .after_connect(move |conn, _meta| {
                let statement = format!("SET search_path TO {search_path}");
                Box::pin(async move {
                    (&mut *conn).execute(sqlx::raw_sql(&statement)).await?;
                    Ok(())
                })
            })
            .connect(&url)
            .await
            .expect("connect test pool");

        let hook = Arc::new(PostgresHook::new(pool));
        let dag = build_pipeline(&PipelineConfig::default()).expect("pipeline builds");
        let context = ExecutionContext::new(
            dag.dag_id(),
            Utc.with_ymd_and_hms(2018, 11, 1, 0, 0, 0).unwrap(),
            ConnectionRegistry::new().with_hook("redshift", hook.clone()),
        );

        let fixture = Self {
            hook,
            dag,
            context,
            schema,
        };
        for task_id in task_ids::TABLE_CREATION {
            fixture.execute(task_id).await.expect("create table");
        }
        Some(fixture)
    }

    async fn execute(&self, task_id: &str) -> Result<(), TaskError> {
        self.dag
            .task(task_id)
            .expect("task exists")
            .execute(&self.context)
            .await
    }

    async fn count(&self, table: &str) -> i64 {
        self.hook
            .query_scalar(&format!("SELECT COUNT(*) FROM \"{table}\""))
            .await
            .expect("count rows")
    }

    async fn seed_staging(&self) {
        self.hook
            .run(
                "INSERT INTO staging_songs (num_songs, artist_id, artist_name, song_id, title, duration, year) VALUES \
                 (1, 'AR1', 'Artist One', 'SO1', 'First Song', 200, 2001), \
                 (1, 'AR2', 'Artist Two', 'SO2', 'Second Song', 180, 2005)",
            )
            .await
            .expect("seed staging_songs");

        self.hook
            .run(
                "INSERT INTO staging_events (artist, firstname, lastname, gender, length, level, location, page, sessionid, song, ts, useragent, userid) VALUES \
                 ('Artist One', 'Ada', 'Lovelace', 'F', 200, 'free', 'London', 'NextSong', 10, 'First Song', 1541106106796, 'agent', 1), \
                 ('Artist Two', 'Ada', 'Lovelace', 'F', 180, 'free', 'London', 'NextSong', 10, 'Second Song', 1541106352796, 'agent', 1), \
                 ('Unknown', 'Alan', 'Turing', 'M', 99, 'paid', 'Manchester', 'NextSong', 11, 'Unknown Song', 1541107053796, 'agent', 2), \
                 (NULL, 'Alan', 'Turing', 'M', NULL, 'paid', 'Manchester', 'Home', 11, NULL, 1541107000000, 'agent', 2)",
            )
            .await
            .expect("seed staging_events");
    }

    async fn teardown(self) {
        let _ = self
            .hook
            .run(&format!("DROP SCHEMA {} CASCADE", self.schema))
            .await;
        self.hook.pool().close().await;
    }
}

#[tokio::test]
async fn fact_load_twice_inserts_no_duplicates() {
    let Some(fixture) = Fixture::setup().await else {
        return;
    };
    fixture.seed_staging().await;

    fixture.execute(task_ids::LOAD_SONGPLAYS_FACT_TABLE).await.unwrap();
    let first = fixture.count("songplays").await;
    fixture.execute(task_ids::LOAD_SONGPLAYS_FACT_TABLE).await.unwrap();

    assert_eq!(first, 3);
    assert_eq!(fixture.count("songplays").await, first);
    fixture.teardown().await;
}

#[tokio::test]
async fn dimension_reload_twice_keeps_the_same_count() {
    let Some(fixture) = Fixture::setup().await else {
        return;
    };
    fixture.seed_staging().await;
    fixture.execute(task_ids::LOAD_SONGPLAYS_FACT_TABLE).await.unwrap();

    for task_id in task_ids::DIMENSION_LOADS {
        fixture.execute(task_id).await.unwrap();
    }
    let counts = [
        fixture.count("users").await,
        fixture.count("songs").await,
        fixture.count("artists").await,
        fixture.count("time").await,
    ];
    assert_eq!(counts, [2, 2, 2, 3]);

    for task_id in task_ids::DIMENSION_LOADS {
        fixture.execute(task_id).await.unwrap();
    }
    assert_eq!(fixture.count("users").await, counts[0]);
    assert_eq!(fixture.count("songs").await, counts[1]);
    assert_eq!(fixture.count("artists").await, counts[2]);
    assert_eq!(fixture.count("time").await, counts[3]);

    fixture.execute(task_ids::RUN_DATA_QUALITY_CHECKS).await.unwrap();
    fixture.teardown().await;
}

#[tokio::test]
async fn plays_within_the_same_second_are_kept_apart() {
    let Some(fixture) = Fixture::setup().await else {
        return;
    };
    fixture
        .hook
        .run(
            "INSERT INTO staging_events (artist, firstname, lastname, gender, length, level, location, page, sessionid, song, ts, useragent, userid) VALUES \
             ('Nobody', 'Ada', 'Lovelace', 'F', 120, 'free', 'London', 'NextSong', 10, 'Track A', 1541106106100, 'agent', 1), \
             ('Nobody', 'Ada', 'Lovelace', 'F', 120, 'free', 'London', 'NextSong', 10, 'Track A', 1541106106900, 'agent', 1)",
        )
        .await
        .unwrap();

    fixture.execute(task_ids::LOAD_SONGPLAYS_FACT_TABLE).await.unwrap();
    assert_eq!(fixture.count("songplays").await, 2);

    fixture.execute(task_ids::LOAD_SONGPLAYS_FACT_TABLE).await.unwrap();
    assert_eq!(fixture.count("songplays").await, 2);
    fixture.teardown().await;
}

#[tokio::test]
async fn user_dimension_keeps_latest_level_after_upgrade() {
    let Some(fixture) = Fixture::setup().await else {
        return;
    };
    fixture
        .hook
        .run(
            "INSERT INTO staging_events (artist, firstname, lastname, gender, length, level, location, page, sessionid, song, ts, useragent, userid) VALUES \
             ('Artist One', 'Ada', 'Lovelace', 'F', 200, 'free', 'London', 'NextSong', 10, 'First Song', 1541106106796, 'agent', 1), \
             ('Artist Two', 'Ada', 'Lovelace', 'F', 180, 'paid', 'London', 'NextSong', 12, 'Second Song', 1541200000000, 'agent', 1)",
        )
        .await
        .unwrap();

    fixture.execute(task_ids::LOAD_USER_DIM_TABLE).await.unwrap();
    assert_eq!(fixture.count("users").await, 1);

    let paid = fixture
        .hook
        .query_scalar("SELECT COUNT(*) FROM users WHERE userid = 1 AND level = 'paid'")
        .await
        .unwrap();
    assert_eq!(paid, 1);
    fixture.teardown().await;
}

#[tokio::test]
async fn quality_check_on_empty_table_names_table_and_zero() {
    let Some(fixture) = Fixture::setup().await else {
        return;
    };

    let task = DataQualityTask::new("check_users", vec![QualityCheck::has_rows("users")]);
    let err = task.execute(&fixture.context).await.unwrap_err();

    match err {
        TaskError::QualityCheckFailed { failures, .. } => {
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].table, "users");
            assert_eq!(failures[0].observed, 0);
        }
        other => panic!("expected quality failure, got {other:?}"),
    }
    fixture.teardown().await;
}

#[tokio::test]
async fn failed_batch_rolls_back() {
    let Some(fixture) = Fixture::setup().await else {
        return;
    };
    fixture.seed_staging().await;

    let err = fixture
        .hook
        .run_batch(&[
            "TRUNCATE TABLE staging_songs".to_string(),
            "SELECT * FROM table_that_does_not_exist".to_string(),
        ])
        .await
        .unwrap_err();

    assert!(matches!(err, TaskError::Sql { .. }));
    assert_eq!(fixture.count("staging_songs").await, 2);
    fixture.teardown().await;
}
