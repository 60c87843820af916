use std::str::FromStr;

use anyhow::Result;
use sqlx::{
    Executor, SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};

pub type DB = SqlitePool;

pub async fn open(path: &str) -> Result<DB> {
    let opts = SqliteConnectOptions::from_str(path)?.create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(opts)
        .await?;

    init_schema(&pool).await?;
    Ok(pool)
}

/// Create the schema on first open.
async fn init_schema(pool: &DB) -> Result<()> {
    // Unprepared execute: the batch below is several statements.
    pool.execute(
        r#"
        CREATE TABLE IF NOT EXISTS plans (
            id          TEXT PRIMARY KEY,
            name        TEXT NOT NULL UNIQUE,
            description TEXT,
            created_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS plan_steps (
            id          TEXT PRIMARY KEY,
            plan_id     TEXT NOT NULL REFERENCES plans(id) ON DELETE CASCADE,
            phase       TEXT NOT NULL CHECK (phase IN ('warmup', 'stretch')),
            name        TEXT NOT NULL,
            seconds     INTEGER NOT NULL,
            order_index INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS plan_exercises (
            id               TEXT PRIMARY KEY,
            plan_id          TEXT NOT NULL REFERENCES plans(id) ON DELETE CASCADE,
            name             TEXT NOT NULL,
            sets             INTEGER NOT NULL,
            reps             TEXT,
            target_weight_kg REAL,
            rest_between_sets INTEGER,
            rest_after       INTEGER,
            superset_group   INTEGER,
            is_challenge     INTEGER NOT NULL DEFAULT 0,
            order_index      INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS exercise_media (
            exercise_name TEXT PRIMARY KEY,
            image_url     TEXT,
            video_url     TEXT
        );

        CREATE TABLE IF NOT EXISTS workout_logs (
            id                  TEXT PRIMARY KEY,
            plan_name           TEXT NOT NULL,
            started_at          TEXT NOT NULL,
            duration_seconds    INTEGER NOT NULL,
            total_sets          INTEGER NOT NULL,
            total_reps          INTEGER NOT NULL,
            total_volume_kg     REAL NOT NULL,
            total_rest_seconds  INTEGER NOT NULL,
            avg_rest_seconds    INTEGER NOT NULL,
            progress_percentage INTEGER NOT NULL,
            completed           INTEGER NOT NULL,
            quit_reason         TEXT
        );

        CREATE TABLE IF NOT EXISTS set_logs (
            id            TEXT PRIMARY KEY,
            workout_id    TEXT NOT NULL REFERENCES workout_logs(id) ON DELETE CASCADE,
            exercise_name TEXT NOT NULL,
            set_number    INTEGER NOT NULL,
            reps          INTEGER NOT NULL,
            weight_kg     REAL NOT NULL,
            target_reps   INTEGER NOT NULL,
            completed_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS rest_logs (
            id            TEXT PRIMARY KEY,
            workout_id    TEXT NOT NULL REFERENCES workout_logs(id) ON DELETE CASCADE,
            exercise_name TEXT NOT NULL,
            set_number    INTEGER,
            rest_seconds  INTEGER NOT NULL,
            kind          TEXT NOT NULL,
            recorded_at   TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS drink_logs (
            id          TEXT PRIMARY KEY,
            workout_id  TEXT NOT NULL REFERENCES workout_logs(id) ON DELETE CASCADE,
            milliliters INTEGER NOT NULL,
            recorded_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS personal_records (
            id            TEXT PRIMARY KEY,
            exercise_name TEXT NOT NULL,
            weight_kg     REAL NOT NULL,
            reps          INTEGER NOT NULL,
            estimated_1rm REAL NOT NULL,
            date          TEXT NOT NULL
        );
        "#,
    )
    .await?;

    Ok(())
}
