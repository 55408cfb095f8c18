use async_trait::async_trait;
use time::{Date, OffsetDateTime};
use wanimirror_core::{
    Assignment, AssignmentFilter, AssignmentSnapshot, DataType, DateRange, Review,
    StatisticsSnapshot, Subject, SubjectFilter, TimeRange,
};

use crate::error::StorageError;

/// The storage contract for the data mirror.
///
/// The primary implementation is an embedded relational engine
/// ([`crate::SqliteStore`]); consumers depend on this trait only, so a
/// different backend can be substituted without touching the
/// orchestrator or the read API.
///
/// ## Transaction semantics
///
/// Batch mutations take `&mut Self::Tx`, a type representing an
/// in-progress transaction. The lifecycle is:
///
/// 1. `begin_tx()` — start a transaction
/// 2. call batch mutations with `&mut tx`
/// 3. `commit_tx(tx)` — commit and consume the transaction,
///    OR `abort_tx(tx)` — roll back and consume the transaction
///
/// If a `Tx` is dropped without committing, the underlying database
/// transaction MUST be rolled back. A failure mid-batch therefore
/// never surfaces partial rows in any subsequent read.
///
/// ## Upsert contract
///
/// Upserts are idempotent by primary key with last-write-wins payload
/// refresh: `upsert(x); upsert(x)` leaves exactly one row whose fields
/// equal `x`'s. For assignments and reviews, foreign-key existence is
/// validated inside the same transaction before the write batch; a
/// batch containing any dangling reference fails atomically with
/// [`StorageError::MissingReference`].
///
/// ## Timestamp discipline
///
/// All timestamps are persisted at second precision, UTC. Range filters
/// are inclusive at both ends at that precision.
///
/// ## Thread safety
///
/// Implementations must be `Send + Sync + 'static` to live in axum
/// application state and cross async task boundaries.
#[async_trait]
pub trait MirrorStore: Send + Sync + 'static {
    /// The transaction handle type. Must be `Send` to cross `.await`s.
    type Tx: Send;

    // ── Transaction lifecycle ─────────────────────────────────────────────────

    async fn begin_tx(&self) -> Result<Self::Tx, StorageError>;

    async fn commit_tx(&self, tx: Self::Tx) -> Result<(), StorageError>;

    async fn abort_tx(&self, tx: Self::Tx) -> Result<(), StorageError>;

    // ── Batch mutations (within a transaction) ────────────────────────────────

    /// Upsert a batch of subjects keyed by upstream id.
    async fn upsert_subjects(
        &self,
        tx: &mut Self::Tx,
        subjects: &[Subject],
    ) -> Result<(), StorageError>;

    /// Upsert a batch of assignments.
    ///
    /// Every `subject_id` in the batch must reference a subject visible
    /// inside the transaction, otherwise the whole batch is rejected.
    async fn upsert_assignments(
        &self,
        tx: &mut Self::Tx,
        assignments: &[Assignment],
    ) -> Result<(), StorageError>;

    /// Upsert a batch of reviews.
    ///
    /// Every `assignment_id` and `subject_id` must resolve inside the
    /// transaction, otherwise the whole batch is rejected.
    async fn upsert_reviews(&self, tx: &mut Self::Tx, reviews: &[Review])
        -> Result<(), StorageError>;

    /// Replace the daily distribution rows for the dates present in
    /// `rows`.
    ///
    /// Re-deriving a date overwrites that date's full row set (stale
    /// (stage, type) pairs from an earlier derivation the same day are
    /// dropped); rows for other dates are untouched.
    async fn upsert_assignment_snapshots(
        &self,
        tx: &mut Self::Tx,
        rows: &[AssignmentSnapshot],
    ) -> Result<(), StorageError>;

    // ── Single-statement mutations ────────────────────────────────────────────

    /// Append one statistics capture. Rows are never updated or
    /// deleted; the full time series is preserved.
    async fn insert_statistics(
        &self,
        data: &serde_json::Value,
        captured_at: OffsetDateTime,
    ) -> Result<(), StorageError>;

    /// Persist the last successful sync time for one data type.
    async fn set_last_sync_time(
        &self,
        data_type: DataType,
        ts: OffsetDateTime,
    ) -> Result<(), StorageError>;

    // ── Queries (outside any transaction, against the pool) ───────────────────

    async fn get_subjects(&self, filter: &SubjectFilter) -> Result<Vec<Subject>, StorageError>;

    async fn get_assignments(
        &self,
        filter: &AssignmentFilter,
    ) -> Result<Vec<Assignment>, StorageError>;

    /// Reviews whose `created_at` falls inside `range`, inclusive.
    async fn get_reviews(&self, range: &TimeRange) -> Result<Vec<Review>, StorageError>;

    /// Statistics captures inside `range`, newest first.
    async fn get_statistics(
        &self,
        range: &TimeRange,
    ) -> Result<Vec<StatisticsSnapshot>, StorageError>;

    /// The capture with the maximum `captured_at`, or `None` if no
    /// statistics have ever been stored.
    async fn get_latest_statistics(&self) -> Result<Option<StatisticsSnapshot>, StorageError>;

    /// Daily distribution rows inside `range`, ordered by date
    /// ascending.
    async fn get_assignment_snapshots(
        &self,
        range: &DateRange,
    ) -> Result<Vec<AssignmentSnapshot>, StorageError>;

    /// Derive the daily distribution for `date` from the current
    /// assignment table: group by (stage, type), exclude stage 0,
    /// count. Pairs with zero assignments are absent from the output.
    /// Does not write anything.
    async fn calculate_assignment_snapshot(
        &self,
        date: Date,
    ) -> Result<Vec<AssignmentSnapshot>, StorageError>;

    /// The last successful sync time for one data type. `None` means
    /// no successful sync has happened yet.
    async fn get_last_sync_time(
        &self,
        data_type: DataType,
    ) -> Result<Option<OffsetDateTime>, StorageError>;
}
