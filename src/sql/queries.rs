use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const STAGING_EVENTS_TABLE_CREATE: &str = r#"
CREATE TABLE IF NOT EXISTS staging_events (
    artist VARCHAR(256),
    auth VARCHAR(256),
    firstname VARCHAR(256),
    gender VARCHAR(256),
    iteminsession INTEGER,
    lastname VARCHAR(256),
    length NUMERIC(18, 0),
    level VARCHAR(256),
    location VARCHAR(256),
    method VARCHAR(256),
    page VARCHAR(256),
    registration NUMERIC(18, 0),
    sessionid INTEGER,
    song VARCHAR(256),
    status INTEGER,
    ts BIGINT,
    useragent VARCHAR(256),
    userid INTEGER
)"#;

const STAGING_SONGS_TABLE_CREATE: &str = r#"
CREATE TABLE IF NOT EXISTS staging_songs (
    num_songs INTEGER,
    artist_id VARCHAR(256),
    artist_name VARCHAR(256),
    artist_latitude NUMERIC(18, 0),
    artist_longitude NUMERIC(18, 0),
    artist_location VARCHAR(256),
    song_id VARCHAR(256),
    title VARCHAR(256),
    duration NUMERIC(18, 0),
    year INTEGER
)"#;

const TIME_TABLE_CREATE: &str = r#"
CREATE TABLE IF NOT EXISTS "time" (
    start_time TIMESTAMP NOT NULL,
    hour INTEGER,
    day INTEGER,
    week INTEGER,
    month INTEGER,
    year INTEGER,
    weekday INTEGER,
    CONSTRAINT time_pkey PRIMARY KEY (start_time)
)"#;

const USER_TABLE_CREATE: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    userid INTEGER NOT NULL,
    first_name VARCHAR(256),
    last_name VARCHAR(256),
    gender VARCHAR(256),
    level VARCHAR(256),
    CONSTRAINT users_pkey PRIMARY KEY (userid)
)"#;

const ARTIST_TABLE_CREATE: &str = r#"
CREATE TABLE IF NOT EXISTS artists (
    artistid VARCHAR(256) NOT NULL,
    name VARCHAR(256),
    location VARCHAR(256),
    latitude NUMERIC(18, 0),
    longitude NUMERIC(18, 0),
    CONSTRAINT artists_pkey PRIMARY KEY (artistid)
)"#;

const SONG_TABLE_CREATE: &str = r#"
CREATE TABLE IF NOT EXISTS songs (
    songid VARCHAR(256) NOT NULL,
    title VARCHAR(256),
    artistid VARCHAR(256),
    year INTEGER,
    duration NUMERIC(18, 0),
    CONSTRAINT songs_pkey PRIMARY KEY (songid)
)"#;

const SONGPLAY_TABLE_CREATE: &str = r#"
CREATE TABLE IF NOT EXISTS songplays (
    playid VARCHAR(32) NOT NULL,
    start_time TIMESTAMP NOT NULL,
    userid INTEGER NOT NULL,
    level VARCHAR(256),
    songid VARCHAR(256),
    artistid VARCHAR(256),
    sessionid INTEGER,
    location VARCHAR(256),
    user_agent VARCHAR(256),
    CONSTRAINT songplays_pkey PRIMARY KEY (playid)
)"#;

const SONGPLAY_TABLE_INSERT: &str = r#"
SELECT DISTINCT
    md5(events.sessionid::text || '-' || events.ts::text) AS playid,
    events.start_time AS start_time,
    events.userid AS userid,
    events.level AS level,
    songs.song_id AS songid,
    songs.artist_id AS artistid,
    events.sessionid AS sessionid,
    events.location AS location,
    events.useragent AS user_agent
FROM (
    SELECT TIMESTAMP 'epoch' + ts / 1000 * INTERVAL '1 second' AS start_time, *
    FROM staging_events
    WHERE page = 'NextSong'
) events
LEFT JOIN staging_songs songs
    ON events.song = songs.title
    AND events.artist = songs.artist_name
    AND events.length = songs.duration"#;

// one row per user, carrying the level of their latest play
const USER_TABLE_INSERT: &str = r#"
SELECT
    userid AS userid,
    firstname AS first_name,
    lastname AS last_name,
    gender AS gender,
    level AS level
FROM (
    SELECT
        userid, firstname, lastname, gender, level,
        ROW_NUMBER() OVER (PARTITION BY userid ORDER BY ts DESC) AS recency
    FROM staging_events
    WHERE page = 'NextSong' AND userid IS NOT NULL
) events
WHERE recency = 1"#;

const SONG_TABLE_INSERT: &str = r#"
SELECT DISTINCT
    song_id AS songid,
    title AS title,
    artist_id AS artistid,
    year AS year,
    duration AS duration
FROM staging_songs
WHERE song_id IS NOT NULL"#;

const ARTIST_TABLE_INSERT: &str = r#"
SELECT DISTINCT
    artist_id AS artistid,
    artist_name AS name,
    artist_location AS location,
    artist_latitude AS latitude,
    artist_longitude AS longitude
FROM staging_songs
WHERE artist_id IS NOT NULL"#;

const TIME_TABLE_INSERT: &str = r#"
SELECT DISTINCT
    start_time AS start_time,
    extract(hour FROM start_time) AS hour,
    extract(day FROM start_time) AS day,
    extract(week FROM start_time) AS week,
    extract(month FROM start_time) AS month,
    extract(year FROM start_time) AS year,
    extract(dow FROM start_time) AS weekday
FROM songplays"#;

/// Named SQL templates of the star schema
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SqlTemplate {
    StagingEventsTableCreate,
    StagingSongsTableCreate,
    TimeTableCreate,
    UserTableCreate,
    ArtistTableCreate,
    SongTableCreate,
    SongplayTableCreate,
    SongplayTableInsert,
    UserTableInsert,
    SongTableInsert,
    ArtistTableInsert,
    TimeTableInsert,
}

impl SqlTemplate {
    pub const ALL: &'static [SqlTemplate] = &[
        Self::StagingEventsTableCreate,
        Self::StagingSongsTableCreate,
        Self::TimeTableCreate,
        Self::UserTableCreate,
        Self::ArtistTableCreate,
        Self::SongTableCreate,
        Self::SongplayTableCreate,
        Self::SongplayTableInsert,
        Self::UserTableInsert,
        Self::SongTableInsert,
        Self::ArtistTableInsert,
        Self::TimeTableInsert,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::StagingEventsTableCreate => "staging_events_table_create",
            Self::StagingSongsTableCreate => "staging_songs_table_create",
            Self::TimeTableCreate => "time_table_create",
            Self::UserTableCreate => "user_table_create",
            Self::ArtistTableCreate => "artist_table_create",
            Self::SongTableCreate => "song_table_create",
            Self::SongplayTableCreate => "songplay_table_create",
            Self::SongplayTableInsert => "songplay_table_insert",
            Self::UserTableInsert => "user_table_insert",
            Self::SongTableInsert => "song_table_insert",
            Self::ArtistTableInsert => "artist_table_insert",
            Self::TimeTableInsert => "time_table_insert",
        }
    }

    /// Raw SQL text, trimmed of the leading newline
    pub fn sql(&self) -> &'static str {
        let text = match self {
            Self::StagingEventsTableCreate => STAGING_EVENTS_TABLE_CREATE,
            Self::StagingSongsTableCreate => STAGING_SONGS_TABLE_CREATE,
            Self::TimeTableCreate => TIME_TABLE_CREATE,
            Self::UserTableCreate => USER_TABLE_CREATE,
            Self::ArtistTableCreate => ARTIST_TABLE_CREATE,
            Self::SongTableCreate => SONG_TABLE_CREATE,
            Self::SongplayTableCreate => SONGPLAY_TABLE_CREATE,
            Self::SongplayTableInsert => SONGPLAY_TABLE_INSERT,
            Self::UserTableInsert => USER_TABLE_INSERT,
            Self::SongTableInsert => SONG_TABLE_INSERT,
            Self::ArtistTableInsert => ARTIST_TABLE_INSERT,
            Self::TimeTableInsert => TIME_TABLE_INSERT,
        };
        text.trim_start()
    }

    /// DDL templates create a table; the rest are SELECT bodies for inserts
    pub fn is_ddl(&self) -> bool {
        matches!(
            self,
            Self::StagingEventsTableCreate
                | Self::StagingSongsTableCreate
                | Self::TimeTableCreate
                | Self::UserTableCreate
                | Self::ArtistTableCreate
                | Self::SongTableCreate
                | Self::SongplayTableCreate
        )
    }
}

impl fmt::Display for SqlTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SqlTemplate {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|template| template.name() == s)
            .ok_or_else(|| format!("Unknown SQL template: {s}"))
    }
}
