//! Embedded, versioned schema migrations.
//!
//! Migration units are compiled into the binary as SQL string pairs
//! (forward + reverse) identified by monotonic integers. At startup the
//! runner applies every unit newer than the recorded version, each in
//! its own transaction, aborting on the first failure. A second run
//! with no new units is a no-op that reports the same version.
//!
//! Reverse units exist for operator recovery ([`revert_last`]) and are
//! never invoked by the startup path.

use sqlx::SqlitePool;
use wanimirror_core::timestamp;

use crate::error::StorageError;

/// One forward/reverse migration pair.
struct Migration {
    version: i64,
    name: &'static str,
    up: &'static str,
    down: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "mirror_tables",
        up: MIRROR_TABLES_UP,
        down: MIRROR_TABLES_DOWN,
    },
    Migration {
        version: 2,
        name: "statistics",
        up: STATISTICS_UP,
        down: STATISTICS_DOWN,
    },
    Migration {
        version: 3,
        name: "snapshots_and_watermarks",
        up: SNAPSHOTS_UP,
        down: SNAPSHOTS_DOWN,
    },
];

/// Apply all pending migrations. Returns the final applied version.
pub async fn run(pool: &SqlitePool) -> Result<i64, StorageError> {
    sqlx::raw_sql(VERSION_TABLE_INIT).execute(pool).await?;

    let mut applied = current_version(pool).await?;
    let pending: Vec<_> = MIGRATIONS.iter().filter(|m| m.version > applied).collect();
    for migration in pending {
        let mut tx = pool.begin().await?;
        sqlx::raw_sql(migration.up)
            .execute(&mut *tx)
            .await
            .map_err(|source| StorageError::Migration {
                version: migration.version,
                name: migration.name,
                source,
            })?;
        sqlx::query("INSERT INTO schema_migrations (version, name, applied_at) VALUES (?1, ?2, ?3)")
            .bind(migration.version)
            .bind(migration.name)
            .bind(timestamp::format_rfc3339(timestamp::now_utc_second())?)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        applied = migration.version;
    }
    Ok(applied)
}

/// The currently applied version, 0 if no migration has ever run.
pub async fn current_version(pool: &SqlitePool) -> Result<i64, StorageError> {
    let version: Option<i64> = sqlx::query_scalar("SELECT MAX(version) FROM schema_migrations")
        .fetch_one(pool)
        .await?;
    Ok(version.unwrap_or(0))
}

/// Roll back the most recently applied migration. Returns the version
/// in effect afterwards. A no-op returning 0 when nothing is applied.
pub async fn revert_last(pool: &SqlitePool) -> Result<i64, StorageError> {
    let applied = current_version(pool).await?;
    let Some(migration) = MIGRATIONS.iter().find(|m| m.version == applied) else {
        return Ok(applied);
    };

    let mut tx = pool.begin().await?;
    sqlx::raw_sql(migration.down)
        .execute(&mut *tx)
        .await
        .map_err(|source| StorageError::Migration {
            version: migration.version,
            name: migration.name,
            source,
        })?;
    sqlx::query("DELETE FROM schema_migrations WHERE version = ?1")
        .bind(migration.version)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    current_version(pool).await
}

const VERSION_TABLE_INIT: &str = r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    applied_at TEXT NOT NULL
);
"#;

const MIRROR_TABLES_UP: &str = r#"
CREATE TABLE subjects (
    id INTEGER PRIMARY KEY,
    object TEXT NOT NULL,
    url TEXT NOT NULL,
    data_updated_at TEXT NOT NULL,
    level INTEGER NOT NULL,
    characters TEXT,
    meanings TEXT NOT NULL,
    readings TEXT NOT NULL
);
CREATE INDEX subjects_by_level ON subjects (level);
CREATE INDEX subjects_by_object ON subjects (object);

CREATE TABLE assignments (
    id INTEGER PRIMARY KEY,
    subject_id INTEGER NOT NULL REFERENCES subjects (id),
    subject_type TEXT NOT NULL,
    srs_stage INTEGER NOT NULL,
    unlocked_at TEXT,
    started_at TEXT,
    passed_at TEXT,
    data_updated_at TEXT NOT NULL
);
CREATE INDEX assignments_by_subject ON assignments (subject_id);
CREATE INDEX assignments_by_stage ON assignments (srs_stage);

CREATE TABLE reviews (
    id INTEGER PRIMARY KEY,
    assignment_id INTEGER NOT NULL REFERENCES assignments (id),
    subject_id INTEGER NOT NULL REFERENCES subjects (id),
    created_at TEXT NOT NULL,
    incorrect_meaning_answers INTEGER NOT NULL,
    incorrect_reading_answers INTEGER NOT NULL
);
CREATE INDEX reviews_by_created_at ON reviews (created_at);
CREATE INDEX reviews_by_assignment ON reviews (assignment_id);
"#;

const MIRROR_TABLES_DOWN: &str = r#"
DROP TABLE reviews;
DROP TABLE assignments;
DROP TABLE subjects;
"#;

const STATISTICS_UP: &str = r#"
CREATE TABLE statistics (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    captured_at TEXT NOT NULL,
    data TEXT NOT NULL
);
CREATE INDEX statistics_by_captured_at ON statistics (captured_at);
"#;

const STATISTICS_DOWN: &str = r#"
DROP TABLE statistics;
"#;

const SNAPSHOTS_UP: &str = r#"
CREATE TABLE assignment_snapshots (
    date TEXT NOT NULL,
    srs_stage INTEGER NOT NULL,
    subject_type TEXT NOT NULL,
    count INTEGER NOT NULL,
    PRIMARY KEY (date, srs_stage, subject_type)
);

CREATE TABLE sync_watermarks (
    data_type TEXT PRIMARY KEY,
    last_synced_at TEXT NOT NULL
);
"#;

const SNAPSHOTS_DOWN: &str = r#"
DROP TABLE sync_watermarks;
DROP TABLE assignment_snapshots;
"#;
