//! The songplay star-schema pipeline.
//!
//! ```text
//! Begin_execution
//!   -> Create_{staging_events,staging_songs,time,user,artist,song,songplay}_table
//!   -> Wait_for_table_creation
//!   -> Stage_events, Stage_songs
//!   -> Load_songplays_fact_table
//!   -> Load_{user,song,artist,time}_dim_table
//!   -> Run_data_quality_checks
//!   -> Stop_execution
//! ```

use super::{Dag, DagBuilder};
use crate::config::PipelineConfig;
use crate::constants::{tables, task_ids};
use crate::error::Result;
use crate::sql::SqlTemplate;
use crate::tasks::{
    DataQualityTask, LoadDimensionTask, LoadFactTask, LoadMode, MarkerTask, QualityCheck, SqlTask,
    StageToWarehouseTask,
};
use std::sync::Arc;
use tracing::info;

/// Creation task id and the DDL it runs
const TABLE_CREATION: [(&str, SqlTemplate); 7] = [
    (task_ids::CREATE_STAGING_EVENTS_TABLE, SqlTemplate::StagingEventsTableCreate),
    (task_ids::CREATE_STAGING_SONGS_TABLE, SqlTemplate::StagingSongsTableCreate),
    (task_ids::CREATE_TIME_TABLE, SqlTemplate::TimeTableCreate),
    (task_ids::CREATE_USER_TABLE, SqlTemplate::UserTableCreate),
    (task_ids::CREATE_ARTIST_TABLE, SqlTemplate::ArtistTableCreate),
    (task_ids::CREATE_SONG_TABLE, SqlTemplate::SongTableCreate),
    (task_ids::CREATE_SONGPLAY_TABLE, SqlTemplate::SongplayTableCreate),
];

/// Dimension load task id, target table and SELECT body
const DIMENSION_LOADS: [(&str, &str, SqlTemplate); 4] = [
    (task_ids::LOAD_USER_DIM_TABLE, tables::USERS, SqlTemplate::UserTableInsert),
    (task_ids::LOAD_SONG_DIM_TABLE, tables::SONGS, SqlTemplate::SongTableInsert),
    (task_ids::LOAD_ARTIST_DIM_TABLE, tables::ARTISTS, SqlTemplate::ArtistTableInsert),
    (task_ids::LOAD_TIME_DIM_TABLE, tables::TIME, SqlTemplate::TimeTableInsert),
];

/// Checks run by `Run_data_quality_checks`
pub fn quality_checks() -> Vec<QualityCheck> {
    vec![
        QualityCheck::has_rows(tables::SONGPLAYS),
        QualityCheck::no_nulls(tables::SONGPLAYS, "playid"),
        QualityCheck::has_rows(tables::USERS),
        QualityCheck::no_nulls(tables::USERS, "userid"),
        QualityCheck::has_rows(tables::SONGS),
        QualityCheck::no_nulls(tables::SONGS, "songid"),
        QualityCheck::has_rows(tables::ARTISTS),
        QualityCheck::no_nulls(tables::ARTISTS, "artistid"),
        QualityCheck::has_rows(tables::TIME),
        QualityCheck::no_nulls(tables::TIME, "start_time"),
    ]
}

/// Build and validate the pipeline described by `config`
pub fn build_pipeline(config: &PipelineConfig) -> Result<Dag> {
    let connection_id = config.warehouse.connection_id.as_str();
    let storage = &config.storage;
    let mut dag =
        DagBuilder::new(config.dag.dag_id.clone()).description(config.dag.description.clone());

    dag.add_task(Arc::new(MarkerTask::new(task_ids::BEGIN_EXECUTION)))?;

    for (task_id, template) in TABLE_CREATION {
        dag.add_task(Arc::new(SqlTask::new(task_id, template).with_connection(connection_id)))?;
    }

    dag.add_task(Arc::new(MarkerTask::new(task_ids::WAIT_FOR_TABLE_CREATION)))?;

    dag.add_task(Arc::new(
        StageToWarehouseTask::new(
            task_ids::STAGE_EVENTS,
            tables::STAGING_EVENTS,
            storage.bucket.clone(),
            storage.log_data_key.clone(),
            storage.credentials(),
        )
        .with_connection(connection_id)
        .with_region(storage.region.clone())
        .with_json_format(storage.log_json_path.clone()),
    ))?;

    dag.add_task(Arc::new(
        StageToWarehouseTask::new(
            task_ids::STAGE_SONGS,
            tables::STAGING_SONGS,
            storage.bucket.clone(),
            storage.song_data_key.clone(),
            storage.credentials(),
        )
        .with_connection(connection_id)
        .with_region(storage.region.clone()),
    ))?;

    dag.add_task(Arc::new(
        LoadFactTask::new(
            task_ids::LOAD_SONGPLAYS_FACT_TABLE,
            tables::SONGPLAYS,
            SqlTemplate::SongplayTableInsert,
        )
        .with_connection(connection_id)
        .with_dedup_keys(["playid"]),
    ))?;

    for (task_id, table, select) in DIMENSION_LOADS {
        dag.add_task(Arc::new(
            LoadDimensionTask::new(task_id, table, select, LoadMode::TruncateInsert)
                .with_connection(connection_id),
        ))?;
    }

    dag.add_task(Arc::new(
        DataQualityTask::new(task_ids::RUN_DATA_QUALITY_CHECKS, quality_checks())
            .with_connection(connection_id)
            .with_policy(config.quality.policy),
    ))?;

    dag.add_task(Arc::new(MarkerTask::new(task_ids::STOP_EXECUTION)))?;

    dag.set_downstream(task_ids::BEGIN_EXECUTION, task_ids::TABLE_CREATION)?
        .set_upstream(task_ids::WAIT_FOR_TABLE_CREATION, task_ids::TABLE_CREATION)?
        .set_downstream(task_ids::WAIT_FOR_TABLE_CREATION, task_ids::STAGING)?
        .set_upstream(task_ids::LOAD_SONGPLAYS_FACT_TABLE, task_ids::STAGING)?
        .set_downstream(task_ids::LOAD_SONGPLAYS_FACT_TABLE, task_ids::DIMENSION_LOADS)?
        .set_upstream(task_ids::RUN_DATA_QUALITY_CHECKS, task_ids::DIMENSION_LOADS)?
        .add_edge(task_ids::RUN_DATA_QUALITY_CHECKS, task_ids::STOP_EXECUTION)?;

    let dag = dag.build()?;
    info!(
        dag_id = %dag.dag_id(),
        tasks = dag.len(),
        edges = dag.edge_count(),
        "Pipeline definition built"
    );
    Ok(dag)
}
