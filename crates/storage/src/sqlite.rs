//! SQLite-backed `MirrorStore` over a sqlx connection pool.
//!
//! Timestamps persist as normalized RFC 3339 TEXT (UTC, whole seconds)
//! and dates as `YYYY-MM-DD` TEXT, so SQL string comparison equals
//! chronological comparison and range filters stay inclusive at second
//! precision. Foreign-key enforcement is switched on in the connect
//! options, which applies it to every pooled connection.

use std::collections::BTreeSet;
use std::str::FromStr;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool, Transaction};
use time::{Date, OffsetDateTime};
use wanimirror_core::{
    timestamp, Assignment, AssignmentFilter, AssignmentSnapshot, DataType, DateRange, Review,
    StatisticsSnapshot, Subject, SubjectData, SubjectFilter, SubjectKind, TimeRange,
};

use crate::error::StorageError;
use crate::migrations;
use crate::traits::MirrorStore;

/// Upper bound on ids per `IN (...)` probe, well under SQLite's bind
/// parameter limit.
const ID_PROBE_CHUNK: usize = 500;

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if missing) the database at `path` and run any
    /// pending migrations.
    pub async fn open(path: &str) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        migrations::run(&pool).await?;
        Ok(Self { pool })
    }

    /// A fresh in-memory store with migrations applied.
    ///
    /// The pool is capped at a single connection: each SQLite
    /// `:memory:` connection is its own database, so a second pooled
    /// connection would see an empty schema.
    pub async fn in_memory() -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        migrations::run(&pool).await?;
        Ok(Self { pool })
    }

    /// The underlying pool, for migration tooling and tests.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the pool, waiting for checked-out connections to return.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Ids from `wanted` that have no row in `table`, checked inside
    /// the transaction so rows written earlier in the same batch count.
    async fn missing_ids(
        tx: &mut Transaction<'static, Sqlite>,
        table: &'static str,
        wanted: &BTreeSet<i64>,
    ) -> Result<BTreeSet<i64>, StorageError> {
        let ids: Vec<i64> = wanted.iter().copied().collect();
        let mut found = BTreeSet::new();
        for chunk in ids.chunks(ID_PROBE_CHUNK) {
            let mut query = QueryBuilder::<Sqlite>::new(format!("SELECT id FROM {table} WHERE id IN ("));
            let mut separated = query.separated(", ");
            for id in chunk {
                separated.push_bind(*id);
            }
            query.push(")");
            for row in query.build().fetch_all(&mut **tx).await? {
                found.insert(row.try_get::<i64, _>(0)?);
            }
        }
        Ok(wanted.difference(&found).copied().collect())
    }
}

#[async_trait]
impl MirrorStore for SqliteStore {
    type Tx = Transaction<'static, Sqlite>;

    async fn begin_tx(&self) -> Result<Self::Tx, StorageError> {
        Ok(self.pool.begin().await?)
    }

    async fn commit_tx(&self, tx: Self::Tx) -> Result<(), StorageError> {
        Ok(tx.commit().await?)
    }

    async fn abort_tx(&self, tx: Self::Tx) -> Result<(), StorageError> {
        Ok(tx.rollback().await?)
    }

    async fn upsert_subjects(
        &self,
        tx: &mut Self::Tx,
        subjects: &[Subject],
    ) -> Result<(), StorageError> {
        for subject in subjects {
            sqlx::query(UPSERT_SUBJECT)
                .bind(subject.id)
                .bind(subject.kind.as_str())
                .bind(&subject.url)
                .bind(bind_ts(subject.data_updated_at)?)
                .bind(subject.data.level)
                .bind(&subject.data.characters)
                .bind(serde_json::to_string(&subject.data.meanings)?)
                .bind(serde_json::to_string(&subject.data.readings)?)
                .execute(&mut **tx)
                .await?;
        }
        Ok(())
    }

    async fn upsert_assignments(
        &self,
        tx: &mut Self::Tx,
        assignments: &[Assignment],
    ) -> Result<(), StorageError> {
        let wanted: BTreeSet<i64> = assignments.iter().map(|a| a.subject_id).collect();
        let missing = Self::missing_ids(tx, "subjects", &wanted).await?;
        if let Some(assignment) = assignments.iter().find(|a| missing.contains(&a.subject_id)) {
            return Err(StorageError::MissingReference {
                entity: "assignment",
                entity_id: assignment.id,
                referenced: "subject",
                referenced_id: assignment.subject_id,
            });
        }

        for assignment in assignments {
            sqlx::query(UPSERT_ASSIGNMENT)
                .bind(assignment.id)
                .bind(assignment.subject_id)
                .bind(assignment.subject_type.as_str())
                .bind(assignment.srs_stage)
                .bind(bind_opt_ts(assignment.unlocked_at)?)
                .bind(bind_opt_ts(assignment.started_at)?)
                .bind(bind_opt_ts(assignment.passed_at)?)
                .bind(bind_ts(assignment.data_updated_at)?)
                .execute(&mut **tx)
                .await?;
        }
        Ok(())
    }

    async fn upsert_reviews(
        &self,
        tx: &mut Self::Tx,
        reviews: &[Review],
    ) -> Result<(), StorageError> {
        let assignment_ids: BTreeSet<i64> = reviews.iter().map(|r| r.assignment_id).collect();
        let missing = Self::missing_ids(tx, "assignments", &assignment_ids).await?;
        if let Some(review) = reviews.iter().find(|r| missing.contains(&r.assignment_id)) {
            return Err(StorageError::MissingReference {
                entity: "review",
                entity_id: review.id,
                referenced: "assignment",
                referenced_id: review.assignment_id,
            });
        }

        let subject_ids: BTreeSet<i64> = reviews.iter().map(|r| r.subject_id).collect();
        let missing = Self::missing_ids(tx, "subjects", &subject_ids).await?;
        if let Some(review) = reviews.iter().find(|r| missing.contains(&r.subject_id)) {
            return Err(StorageError::MissingReference {
                entity: "review",
                entity_id: review.id,
                referenced: "subject",
                referenced_id: review.subject_id,
            });
        }

        for review in reviews {
            sqlx::query(UPSERT_REVIEW)
                .bind(review.id)
                .bind(review.assignment_id)
                .bind(review.subject_id)
                .bind(bind_ts(review.created_at)?)
                .bind(review.incorrect_meaning_answers)
                .bind(review.incorrect_reading_answers)
                .execute(&mut **tx)
                .await?;
        }
        Ok(())
    }

    async fn upsert_assignment_snapshots(
        &self,
        tx: &mut Self::Tx,
        rows: &[AssignmentSnapshot],
    ) -> Result<(), StorageError> {
        let mut dates = BTreeSet::new();
        for row in rows {
            dates.insert(bind_date(row.date)?);
        }
        // Replace each affected date's full row set so stale
        // (stage, type) pairs from an earlier derivation are dropped.
        for date in &dates {
            sqlx::query("DELETE FROM assignment_snapshots WHERE date = ?1")
                .bind(date)
                .execute(&mut **tx)
                .await?;
        }
        for row in rows {
            sqlx::query(UPSERT_SNAPSHOT)
                .bind(bind_date(row.date)?)
                .bind(row.srs_stage)
                .bind(row.subject_type.as_str())
                .bind(row.count)
                .execute(&mut **tx)
                .await?;
        }
        Ok(())
    }

    async fn insert_statistics(
        &self,
        data: &serde_json::Value,
        captured_at: OffsetDateTime,
    ) -> Result<(), StorageError> {
        sqlx::query("INSERT INTO statistics (captured_at, data) VALUES (?1, ?2)")
            .bind(bind_ts(captured_at)?)
            .bind(serde_json::to_string(data)?)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_last_sync_time(
        &self,
        data_type: DataType,
        ts: OffsetDateTime,
    ) -> Result<(), StorageError> {
        sqlx::query(UPSERT_WATERMARK)
            .bind(data_type.as_str())
            .bind(bind_ts(ts)?)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_subjects(&self, filter: &SubjectFilter) -> Result<Vec<Subject>, StorageError> {
        let mut query = QueryBuilder::<Sqlite>::new(
            "SELECT id, object, url, data_updated_at, level, characters, meanings, readings \
             FROM subjects WHERE 1 = 1",
        );
        if let Some(kind) = filter.kind {
            query.push(" AND object = ").push_bind(kind.as_str());
        }
        if let Some(level) = filter.level {
            query.push(" AND level = ").push_bind(level);
        }
        query.push(" ORDER BY id ASC");

        let rows = query.build().fetch_all(&self.pool).await?;
        rows.iter().map(subject_from_row).collect()
    }

    async fn get_assignments(
        &self,
        filter: &AssignmentFilter,
    ) -> Result<Vec<Assignment>, StorageError> {
        let mut query = QueryBuilder::<Sqlite>::new(
            "SELECT id, subject_id, subject_type, srs_stage, unlocked_at, started_at, passed_at, \
             data_updated_at FROM assignments WHERE 1 = 1",
        );
        if let Some(stage) = filter.srs_stage {
            query.push(" AND srs_stage = ").push_bind(stage);
        }
        query.push(" ORDER BY id ASC");

        let rows = query.build().fetch_all(&self.pool).await?;
        rows.iter().map(assignment_from_row).collect()
    }

    async fn get_reviews(&self, range: &TimeRange) -> Result<Vec<Review>, StorageError> {
        let mut query = QueryBuilder::<Sqlite>::new(
            "SELECT id, assignment_id, subject_id, created_at, incorrect_meaning_answers, \
             incorrect_reading_answers FROM reviews WHERE 1 = 1",
        );
        if let Some(from) = range.from {
            query.push(" AND created_at >= ").push_bind(bind_ts(from)?);
        }
        if let Some(to) = range.to {
            query.push(" AND created_at <= ").push_bind(bind_ts(to)?);
        }
        query.push(" ORDER BY created_at ASC, id ASC");

        let rows = query.build().fetch_all(&self.pool).await?;
        rows.iter().map(review_from_row).collect()
    }

    async fn get_statistics(
        &self,
        range: &TimeRange,
    ) -> Result<Vec<StatisticsSnapshot>, StorageError> {
        let mut query = QueryBuilder::<Sqlite>::new(
            "SELECT id, captured_at, data FROM statistics WHERE 1 = 1",
        );
        if let Some(from) = range.from {
            query.push(" AND captured_at >= ").push_bind(bind_ts(from)?);
        }
        if let Some(to) = range.to {
            query.push(" AND captured_at <= ").push_bind(bind_ts(to)?);
        }
        query.push(" ORDER BY captured_at DESC, id DESC");

        let rows = query.build().fetch_all(&self.pool).await?;
        rows.iter().map(statistics_from_row).collect()
    }

    async fn get_latest_statistics(&self) -> Result<Option<StatisticsSnapshot>, StorageError> {
        let row = sqlx::query(
            "SELECT id, captured_at, data FROM statistics ORDER BY captured_at DESC, id DESC \
             LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(statistics_from_row).transpose()
    }

    async fn get_assignment_snapshots(
        &self,
        range: &DateRange,
    ) -> Result<Vec<AssignmentSnapshot>, StorageError> {
        let mut query = QueryBuilder::<Sqlite>::new(
            "SELECT date, srs_stage, subject_type, count FROM assignment_snapshots WHERE 1 = 1",
        );
        if let Some(from) = range.from {
            query.push(" AND date >= ").push_bind(bind_date(from)?);
        }
        if let Some(to) = range.to {
            query.push(" AND date <= ").push_bind(bind_date(to)?);
        }
        query.push(" ORDER BY date ASC, srs_stage ASC, subject_type ASC");

        let rows = query.build().fetch_all(&self.pool).await?;
        rows.iter().map(snapshot_from_row).collect()
    }

    async fn calculate_assignment_snapshot(
        &self,
        date: Date,
    ) -> Result<Vec<AssignmentSnapshot>, StorageError> {
        let rows = sqlx::query(
            "SELECT srs_stage, subject_type, COUNT(*) AS count FROM assignments \
             WHERE srs_stage > 0 GROUP BY srs_stage, subject_type \
             ORDER BY srs_stage ASC, subject_type ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(AssignmentSnapshot {
                    date,
                    srs_stage: row.try_get("srs_stage")?,
                    subject_type: read_kind(&row.try_get::<String, _>("subject_type")?)?,
                    count: row.try_get("count")?,
                })
            })
            .collect()
    }

    async fn get_last_sync_time(
        &self,
        data_type: DataType,
    ) -> Result<Option<OffsetDateTime>, StorageError> {
        let stored: Option<String> =
            sqlx::query_scalar("SELECT last_synced_at FROM sync_watermarks WHERE data_type = ?1")
                .bind(data_type.as_str())
                .fetch_optional(&self.pool)
                .await?;
        stored.as_deref().map(read_ts).transpose()
    }
}

// ─── Row mapping ──────────────────────────────────────────────────────────────

fn subject_from_row(row: &SqliteRow) -> Result<Subject, StorageError> {
    Ok(Subject {
        id: row.try_get("id")?,
        kind: read_kind(&row.try_get::<String, _>("object")?)?,
        url: row.try_get("url")?,
        data_updated_at: read_ts(&row.try_get::<String, _>("data_updated_at")?)?,
        data: SubjectData {
            level: row.try_get("level")?,
            characters: row.try_get("characters")?,
            meanings: serde_json::from_str(&row.try_get::<String, _>("meanings")?)?,
            readings: serde_json::from_str(&row.try_get::<String, _>("readings")?)?,
        },
    })
}

fn assignment_from_row(row: &SqliteRow) -> Result<Assignment, StorageError> {
    Ok(Assignment {
        id: row.try_get("id")?,
        subject_id: row.try_get("subject_id")?,
        subject_type: read_kind(&row.try_get::<String, _>("subject_type")?)?,
        srs_stage: row.try_get("srs_stage")?,
        unlocked_at: read_opt_ts(row.try_get("unlocked_at")?)?,
        started_at: read_opt_ts(row.try_get("started_at")?)?,
        passed_at: read_opt_ts(row.try_get("passed_at")?)?,
        data_updated_at: read_ts(&row.try_get::<String, _>("data_updated_at")?)?,
    })
}

fn review_from_row(row: &SqliteRow) -> Result<Review, StorageError> {
    Ok(Review {
        id: row.try_get("id")?,
        assignment_id: row.try_get("assignment_id")?,
        subject_id: row.try_get("subject_id")?,
        created_at: read_ts(&row.try_get::<String, _>("created_at")?)?,
        incorrect_meaning_answers: row.try_get("incorrect_meaning_answers")?,
        incorrect_reading_answers: row.try_get("incorrect_reading_answers")?,
    })
}

fn statistics_from_row(row: &SqliteRow) -> Result<StatisticsSnapshot, StorageError> {
    Ok(StatisticsSnapshot {
        id: row.try_get("id")?,
        captured_at: read_ts(&row.try_get::<String, _>("captured_at")?)?,
        data: serde_json::from_str(&row.try_get::<String, _>("data")?)?,
    })
}

fn snapshot_from_row(row: &SqliteRow) -> Result<AssignmentSnapshot, StorageError> {
    Ok(AssignmentSnapshot {
        date: read_date(&row.try_get::<String, _>("date")?)?,
        srs_stage: row.try_get("srs_stage")?,
        subject_type: read_kind(&row.try_get::<String, _>("subject_type")?)?,
        count: row.try_get("count")?,
    })
}

// ─── Value conversion ─────────────────────────────────────────────────────────

fn bind_ts(ts: OffsetDateTime) -> Result<String, StorageError> {
    Ok(timestamp::format_rfc3339(ts)?)
}

fn bind_opt_ts(ts: Option<OffsetDateTime>) -> Result<Option<String>, StorageError> {
    ts.map(bind_ts).transpose()
}

fn read_ts(stored: &str) -> Result<OffsetDateTime, StorageError> {
    timestamp::parse_rfc3339(stored)
        .map_err(|e| StorageError::Corrupt(format!("bad timestamp '{stored}': {e}")))
}

fn read_opt_ts(stored: Option<String>) -> Result<Option<OffsetDateTime>, StorageError> {
    stored.as_deref().map(read_ts).transpose()
}

fn bind_date(date: Date) -> Result<String, StorageError> {
    Ok(timestamp::format_date(date)?)
}

fn read_date(stored: &str) -> Result<Date, StorageError> {
    timestamp::parse_date(stored)
        .map_err(|e| StorageError::Corrupt(format!("bad date '{stored}': {e}")))
}

fn read_kind(stored: &str) -> Result<SubjectKind, StorageError> {
    SubjectKind::parse(stored)
        .ok_or_else(|| StorageError::Corrupt(format!("unknown subject kind '{stored}'")))
}

// ─── SQL ──────────────────────────────────────────────────────────────────────

const UPSERT_SUBJECT: &str = "\
INSERT INTO subjects (id, object, url, data_updated_at, level, characters, meanings, readings) \
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8) \
ON CONFLICT (id) DO UPDATE SET \
    object = excluded.object, \
    url = excluded.url, \
    data_updated_at = excluded.data_updated_at, \
    level = excluded.level, \
    characters = excluded.characters, \
    meanings = excluded.meanings, \
    readings = excluded.readings";

const UPSERT_ASSIGNMENT: &str = "\
INSERT INTO assignments (id, subject_id, subject_type, srs_stage, unlocked_at, started_at, \
                         passed_at, data_updated_at) \
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8) \
ON CONFLICT (id) DO UPDATE SET \
    subject_id = excluded.subject_id, \
    subject_type = excluded.subject_type, \
    srs_stage = excluded.srs_stage, \
    unlocked_at = excluded.unlocked_at, \
    started_at = excluded.started_at, \
    passed_at = excluded.passed_at, \
    data_updated_at = excluded.data_updated_at";

const UPSERT_REVIEW: &str = "\
INSERT INTO reviews (id, assignment_id, subject_id, created_at, incorrect_meaning_answers, \
                     incorrect_reading_answers) \
VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
ON CONFLICT (id) DO UPDATE SET \
    assignment_id = excluded.assignment_id, \
    subject_id = excluded.subject_id, \
    created_at = excluded.created_at, \
    incorrect_meaning_answers = excluded.incorrect_meaning_answers, \
    incorrect_reading_answers = excluded.incorrect_reading_answers";

const UPSERT_SNAPSHOT: &str = "\
INSERT INTO assignment_snapshots (date, srs_stage, subject_type, count) \
VALUES (?1, ?2, ?3, ?4) \
ON CONFLICT (date, srs_stage, subject_type) DO UPDATE SET count = excluded.count";

const UPSERT_WATERMARK: &str = "\
INSERT INTO sync_watermarks (data_type, last_synced_at) \
VALUES (?1, ?2) \
ON CONFLICT (data_type) DO UPDATE SET last_synced_at = excluded.last_synced_at";
