//! # Pipeline Constants
//!
//! Task identifiers, warehouse table names and lifecycle event names shared by
//! the pipeline definition, the tasks and the tests.

/// Connection id the host resolves to the warehouse
pub const DEFAULT_CONNECTION_ID: &str = "redshift";

/// Task identifiers of the songplay pipeline
pub mod task_ids {
    pub const BEGIN_EXECUTION: &str = "Begin_execution";

    pub const CREATE_STAGING_EVENTS_TABLE: &str = "Create_staging_events_table";
    pub const CREATE_STAGING_SONGS_TABLE: &str = "Create_staging_songs_table";
    pub const CREATE_TIME_TABLE: &str = "Create_time_table";
    pub const CREATE_USER_TABLE: &str = "Create_user_table";
    pub const CREATE_ARTIST_TABLE: &str = "Create_artist_table";
    pub const CREATE_SONG_TABLE: &str = "Create_song_table";
    pub const CREATE_SONGPLAY_TABLE: &str = "Create_songplay_table";

    pub const WAIT_FOR_TABLE_CREATION: &str = "Wait_for_table_creation";

    pub const STAGE_EVENTS: &str = "Stage_events";
    pub const STAGE_SONGS: &str = "Stage_songs";

    pub const LOAD_SONGPLAYS_FACT_TABLE: &str = "Load_songplays_fact_table";

    pub const LOAD_USER_DIM_TABLE: &str = "Load_user_dim_table";
    pub const LOAD_SONG_DIM_TABLE: &str = "Load_song_dim_table";
    pub const LOAD_ARTIST_DIM_TABLE: &str = "Load_artist_dim_table";
    pub const LOAD_TIME_DIM_TABLE: &str = "Load_time_dim_table";

    pub const RUN_DATA_QUALITY_CHECKS: &str = "Run_data_quality_checks";

    pub const STOP_EXECUTION: &str = "Stop_execution";

    /// The seven table-creation tasks, in declaration order
    pub const TABLE_CREATION: &[&str] = &[
        CREATE_STAGING_EVENTS_TABLE,
        CREATE_STAGING_SONGS_TABLE,
        CREATE_TIME_TABLE,
        CREATE_USER_TABLE,
        CREATE_ARTIST_TABLE,
        CREATE_SONG_TABLE,
        CREATE_SONGPLAY_TABLE,
    ];

    pub const STAGING: &[&str] = &[STAGE_EVENTS, STAGE_SONGS];

    pub const DIMENSION_LOADS: &[&str] = &[
        LOAD_USER_DIM_TABLE,
        LOAD_SONG_DIM_TABLE,
        LOAD_ARTIST_DIM_TABLE,
        LOAD_TIME_DIM_TABLE,
    ];
}

/// Warehouse table names
pub mod tables {
    pub const STAGING_EVENTS: &str = "staging_events";
    pub const STAGING_SONGS: &str = "staging_songs";
    pub const SONGPLAYS: &str = "songplays";
    pub const USERS: &str = "users";
    pub const SONGS: &str = "songs";
    pub const ARTISTS: &str = "artists";
    pub const TIME: &str = "time";

    pub const DIMENSIONS: &[&str] = &[USERS, SONGS, ARTISTS, TIME];
}

/// Structured log event names for task and run lifecycle
pub mod events {
    pub const TASK_STARTED: &str = "task.started";
    pub const TASK_SUCCEEDED: &str = "task.succeeded";
    pub const TASK_FAILED: &str = "task.failed";
    pub const TASK_UP_FOR_RETRY: &str = "task.up_for_retry";
    pub const TASK_UPSTREAM_FAILED: &str = "task.upstream_failed";

    pub const RUN_STARTED: &str = "run.started";
    pub const RUN_SUCCEEDED: &str = "run.succeeded";
    pub const RUN_FAILED: &str = "run.failed";
}
