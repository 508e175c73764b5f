//! # Star Schema SQL
//!
//! The built-in DDL script for the staging and star-schema tables, and the
//! insert-select bodies that populate the fact and dimension tables from the
//! staging tables.

/// Creates both staging tables, the `songplays` fact table and the four
/// dimension tables. Every statement is guarded with `IF NOT EXISTS`, so the
/// script can run on every pipeline execution.
pub const CREATE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS public.staging_events (
    artist varchar(256),
    auth varchar(256),
    firstname varchar(256),
    gender varchar(256),
    iteminsession int4,
    lastname varchar(256),
    length numeric(18,0),
    "level" varchar(256),
    location varchar(256),
    "method" varchar(256),
    page varchar(256),
    registration numeric(18,0),
    sessionid int4,
    song varchar(256),
    status int4,
    ts int8,
    useragent varchar(256),
    userid int4
);

CREATE TABLE IF NOT EXISTS public.staging_songs (
    num_songs int4,
    artist_id varchar(256),
    artist_name varchar(256),
    artist_latitude numeric(18,0),
    artist_longitude numeric(18,0),
    artist_location varchar(256),
    song_id varchar(256),
    title varchar(256),
    duration numeric(18,0),
    "year" int4
);

CREATE TABLE IF NOT EXISTS public.songplays (
    playid varchar(32) NOT NULL,
    start_time timestamp NOT NULL,
    userid int4 NOT NULL,
    "level" varchar(256),
    songid varchar(256),
    artistid varchar(256),
    sessionid int4,
    location varchar(256),
    user_agent varchar(256),
    CONSTRAINT songplays_pkey PRIMARY KEY (playid)
);

CREATE TABLE IF NOT EXISTS public.users (
    userid int4 NOT NULL,
    first_name varchar(256),
    last_name varchar(256),
    gender varchar(256),
    "level" varchar(256),
    CONSTRAINT users_pkey PRIMARY KEY (userid)
);

CREATE TABLE IF NOT EXISTS public.songs (
    songid varchar(256) NOT NULL,
    title varchar(256),
    artistid varchar(256),
    "year" int4,
    duration numeric(18,0),
    CONSTRAINT songs_pkey PRIMARY KEY (songid)
);

CREATE TABLE IF NOT EXISTS public.artists (
    artistid varchar(256) NOT NULL,
    name varchar(256),
    location varchar(256),
    lattitude numeric(18,0),
    longitude numeric(18,0)
);

CREATE TABLE IF NOT EXISTS public."time" (
    start_time timestamp NOT NULL,
    "hour" int4,
    "day" int4,
    week int4,
    "month" varchar(256),
    "year" int4,
    weekday varchar(256),
    CONSTRAINT time_pkey PRIMARY KEY (start_time)
);
"#;

/// Insert-select bodies, one per target table. Each is passed to a load task
/// and becomes `INSERT INTO <table> <body>`.
pub mod queries {
    pub const SONGPLAY_TABLE_INSERT: &str = "
        SELECT
            md5(events.sessionid || events.start_time) AS playid,
            events.start_time,
            events.userid,
            events.level,
            songs.song_id,
            songs.artist_id,
            events.sessionid,
            events.location,
            events.useragent
        FROM (
            SELECT TIMESTAMP 'epoch' + ts / 1000 * interval '1 second' AS start_time, *
            FROM staging_events
            WHERE page = 'NextSong'
        ) events
        LEFT JOIN staging_songs songs
            ON events.song = songs.title
            AND events.artist = songs.artist_name
            AND events.length = songs.duration";

    pub const USER_TABLE_INSERT: &str = "
        SELECT DISTINCT userid, firstname, lastname, gender, level
        FROM staging_events
        WHERE page = 'NextSong'";

    pub const SONG_TABLE_INSERT: &str = "
        SELECT DISTINCT song_id, title, artist_id, year, duration
        FROM staging_songs";

    pub const ARTIST_TABLE_INSERT: &str = "
        SELECT DISTINCT artist_id, artist_name, artist_location, artist_latitude, artist_longitude
        FROM staging_songs";

    pub const TIME_TABLE_INSERT: &str = "
        SELECT start_time,
            extract(hour FROM start_time),
            extract(day FROM start_time),
            extract(week FROM start_time),
            extract(month FROM start_time),
            extract(year FROM start_time),
            extract(dayofweek FROM start_time)
        FROM songplays";
}
