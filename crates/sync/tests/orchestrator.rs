//! Orchestrator scenarios against a scripted upstream and a real
//! in-memory SQLite store.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use time::macros::datetime;
use time::OffsetDateTime;
use wanimirror_client::ApiError;
use wanimirror_core::{
    timestamp, Assignment, AssignmentFilter, DataType, DateRange, Meaning, Reading, Review,
    Subject, SubjectData, SubjectFilter, SubjectKind, TimeRange,
};
use wanimirror_storage::{MirrorStore, SqliteStore};
use wanimirror_sync::query::QueryService;
use wanimirror_sync::{SyncError, SyncService, Upstream};

/// Scripted upstream: queued responses per data type (an exhausted
/// queue returns an empty batch), recorded `updated_after` arguments,
/// and an optional artificial delay on subject fetches.
#[derive(Default)]
struct ScriptedUpstream {
    subjects: Mutex<VecDeque<Result<Vec<Subject>, ApiError>>>,
    assignments: Mutex<VecDeque<Result<Vec<Assignment>, ApiError>>>,
    reviews: Mutex<VecDeque<Result<Vec<Review>, ApiError>>>,
    statistics: Mutex<VecDeque<Result<serde_json::Value, ApiError>>>,
    calls: Mutex<Vec<(DataType, Option<OffsetDateTime>)>>,
    subject_delay: Mutex<Option<Duration>>,
}

impl ScriptedUpstream {
    fn push_subjects(&self, outcome: Result<Vec<Subject>, ApiError>) {
        self.subjects.lock().expect("queue lock").push_back(outcome);
    }

    fn push_assignments(&self, outcome: Result<Vec<Assignment>, ApiError>) {
        self.assignments
            .lock()
            .expect("queue lock")
            .push_back(outcome);
    }

    fn push_reviews(&self, outcome: Result<Vec<Review>, ApiError>) {
        self.reviews.lock().expect("queue lock").push_back(outcome);
    }

    fn push_statistics(&self, outcome: Result<serde_json::Value, ApiError>) {
        self.statistics
            .lock()
            .expect("queue lock")
            .push_back(outcome);
    }

    fn delay_subjects(&self, delay: Duration) {
        *self.subject_delay.lock().expect("delay lock") = Some(delay);
    }

    fn recorded_calls(&self) -> Vec<(DataType, Option<OffsetDateTime>)> {
        self.calls.lock().expect("calls lock").clone()
    }

    fn record(&self, data_type: DataType, updated_after: Option<OffsetDateTime>) {
        self.calls
            .lock()
            .expect("calls lock")
            .push((data_type, updated_after));
    }
}

#[async_trait]
impl Upstream for ScriptedUpstream {
    async fn fetch_subjects(
        &self,
        updated_after: Option<OffsetDateTime>,
    ) -> Result<Vec<Subject>, ApiError> {
        self.record(DataType::Subjects, updated_after);
        let delay = *self.subject_delay.lock().expect("delay lock");
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.subjects
            .lock()
            .expect("queue lock")
            .pop_front()
            .unwrap_or(Ok(Vec::new()))
    }

    async fn fetch_assignments(
        &self,
        updated_after: Option<OffsetDateTime>,
    ) -> Result<Vec<Assignment>, ApiError> {
        self.record(DataType::Assignments, updated_after);
        self.assignments
            .lock()
            .expect("queue lock")
            .pop_front()
            .unwrap_or(Ok(Vec::new()))
    }

    async fn fetch_reviews(
        &self,
        updated_after: Option<OffsetDateTime>,
    ) -> Result<Vec<Review>, ApiError> {
        self.record(DataType::Reviews, updated_after);
        self.reviews
            .lock()
            .expect("queue lock")
            .pop_front()
            .unwrap_or(Ok(Vec::new()))
    }

    async fn fetch_statistics(&self) -> Result<serde_json::Value, ApiError> {
        self.record(DataType::Statistics, None);
        self.statistics
            .lock()
            .expect("queue lock")
            .pop_front()
            .unwrap_or(Ok(json!({})))
    }
}

fn subject(id: i64, kind: SubjectKind, level: i64) -> Subject {
    Subject {
        id,
        kind,
        url: format!("https://api.example.test/v2/subjects/{id}"),
        data_updated_at: datetime!(2024-01-09 12:00:00 UTC),
        data: SubjectData {
            level,
            characters: Some("字".to_string()),
            meanings: vec![Meaning {
                meaning: "meaning".to_string(),
                primary: true,
            }],
            readings: vec![Reading {
                reading: "reading".to_string(),
                primary: true,
            }],
        },
    }
}

fn assignment(id: i64, subject_id: i64, kind: SubjectKind, stage: i64) -> Assignment {
    Assignment {
        id,
        subject_id,
        subject_type: kind,
        srs_stage: stage,
        unlocked_at: Some(datetime!(2024-01-01 00:00:00 UTC)),
        started_at: None,
        passed_at: None,
        data_updated_at: datetime!(2024-01-09 12:00:00 UTC),
    }
}

fn review(id: i64, assignment_id: i64, subject_id: i64) -> Review {
    Review {
        id,
        assignment_id,
        subject_id,
        created_at: datetime!(2024-01-10 00:00:00 UTC),
        incorrect_meaning_answers: 0,
        incorrect_reading_answers: 0,
    }
}

/// The fresh-sync scenario: two subjects, one assignment, one review,
/// one report.
fn fresh_scenario() -> Arc<ScriptedUpstream> {
    let upstream = Arc::new(ScriptedUpstream::default());
    upstream.push_subjects(Ok(vec![
        subject(1, SubjectKind::Kanji, 5),
        subject(2, SubjectKind::Radical, 1),
    ]));
    upstream.push_assignments(Ok(vec![assignment(100, 1, SubjectKind::Kanji, 3)]));
    upstream.push_reviews(Ok(vec![review(200, 100, 1)]));
    upstream.push_statistics(Ok(json!({"lessons": {"count": 3}})));
    upstream
}

async fn harness(
    upstream: Arc<ScriptedUpstream>,
) -> (Arc<SqliteStore>, SyncService<SqliteStore, ScriptedUpstream>) {
    let store = Arc::new(SqliteStore::in_memory().await.expect("fresh store"));
    let service = SyncService::new(store.clone(), upstream);
    (store, service)
}

#[tokio::test]
async fn fresh_sync_populates_store_watermarks_and_snapshot() {
    let upstream = fresh_scenario();
    let (store, service) = harness(upstream).await;

    let before = timestamp::now_utc_second();
    let run = service.sync_all().await.expect("single flight free");
    let after = timestamp::now_utc_second();

    assert!(run.is_success(), "unexpected error: {:?}", run.error);
    let counts: Vec<u64> = run.results.iter().map(|r| r.records_updated).collect();
    assert_eq!(counts, [2, 1, 1, 1]);
    assert!(run.results.iter().all(|r| r.success));

    // Store contains exactly the fetched rows.
    let subjects = store
        .get_subjects(&SubjectFilter::default())
        .await
        .expect("subjects");
    assert_eq!(subjects.len(), 2);
    let reviews = store
        .get_reviews(&TimeRange::default())
        .await
        .expect("reviews");
    assert_eq!(reviews.len(), 1);
    assert!(store
        .get_latest_statistics()
        .await
        .expect("statistics")
        .is_some());

    // All four watermarks are set to each step's start time.
    for data_type in DataType::ALL {
        let watermark = store
            .get_last_sync_time(data_type)
            .await
            .expect("watermark read")
            .expect("watermark set");
        assert!(
            watermark >= before && watermark <= after,
            "{data_type} watermark {watermark} outside [{before}, {after}]"
        );
    }

    // One daily snapshot row exists for today: stage 3, kanji, count 1.
    let snapshots = store
        .get_assignment_snapshots(&DateRange::default())
        .await
        .expect("snapshots");
    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0].date, timestamp::now_utc_second().date());
    assert_eq!(snapshots[0].srs_stage, 3);
    assert_eq!(snapshots[0].subject_type, SubjectKind::Kanji);
    assert_eq!(snapshots[0].count, 1);

    // The read side joins the assignment with its level-5 subject.
    let query = QueryService::new(store.clone());
    let views = query
        .assignments_with_subjects(&AssignmentFilter::default())
        .await
        .expect("join");
    assert_eq!(views.len(), 1);
    let joined = views[0].subject.as_ref().expect("subject joined");
    assert_eq!(joined.data.level, 5);
}

#[tokio::test]
async fn incremental_sync_with_no_changes_advances_watermarks() {
    let upstream = fresh_scenario();
    let (store, service) = harness(upstream).await;
    service.sync_all().await.expect("first run");

    let first_watermarks = watermarks(&store).await;
    // Make the clock observably advance past the stored second.
    tokio::time::sleep(Duration::from_millis(1100)).await;

    // Queues are exhausted: every fetch now returns an empty batch.
    let run = service.sync_all().await.expect("second run");
    assert!(run.is_success());
    let counts: Vec<u64> = run.results.iter().map(|r| r.records_updated).collect();
    assert_eq!(counts, [0, 0, 0, 1]);

    let second_watermarks = watermarks(&store).await;
    for ((data_type, first), second) in DataType::ALL
        .iter()
        .zip(&first_watermarks)
        .zip(&second_watermarks)
    {
        assert!(
            second > first,
            "{data_type} watermark did not advance: {second} <= {first}"
        );
    }

    // Today's snapshot was re-derived, still a single row.
    let snapshots = store
        .get_assignment_snapshots(&DateRange::default())
        .await
        .expect("snapshots");
    assert_eq!(snapshots.len(), 1);
}

#[tokio::test]
async fn failure_at_reviews_halts_and_preserves_later_watermarks() {
    let upstream = Arc::new(ScriptedUpstream::default());
    upstream.push_subjects(Ok(vec![subject(1, SubjectKind::Kanji, 5)]));
    upstream.push_assignments(Ok(vec![assignment(100, 1, SubjectKind::Kanji, 3)]));
    upstream.push_reviews(Err(ApiError::Network("connection reset".to_string())));
    let (store, service) = harness(upstream).await;

    let run = service.sync_all().await.expect("single flight free");
    assert!(!run.is_success());
    assert!(matches!(
        run.error,
        Some(SyncError::Upstream {
            data_type: DataType::Reviews,
            ..
        })
    ));

    // Three results: two successes and the failed reviews step.
    assert_eq!(run.results.len(), 3);
    assert!(run.results[0].success && run.results[1].success);
    assert!(!run.results[2].success);
    assert!(run.results[2]
        .error_message
        .as_deref()
        .expect("failure message")
        .contains("connection reset"));

    // Completed steps advanced their watermarks; halted steps did not.
    let marks = watermarks_opt(&store).await;
    assert!(marks[0].is_some() && marks[1].is_some());
    assert!(marks[2].is_none() && marks[3].is_none());

    // No daily snapshot is written on a failed run.
    let snapshots = store
        .get_assignment_snapshots(&DateRange::default())
        .await
        .expect("snapshots");
    assert!(snapshots.is_empty());
}

#[tokio::test]
async fn second_sync_all_is_rejected_while_first_is_in_flight() {
    let upstream = fresh_scenario();
    upstream.delay_subjects(Duration::from_millis(50));
    let (store, service) = harness(upstream).await;
    let service = Arc::new(service);

    let background = {
        let service = service.clone();
        tokio::spawn(async move { service.sync_all().await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert!(service.is_syncing());
    let rejected = service.sync_all().await;
    assert!(matches!(rejected, Err(SyncError::InProgress)));

    let run = background
        .await
        .expect("task join")
        .expect("first run proceeds");
    assert!(run.is_success());
    assert!(!service.is_syncing());

    // The rejected call made no store writes; rows come only from the
    // first run.
    let subjects = store
        .get_subjects(&SubjectFilter::default())
        .await
        .expect("subjects");
    assert_eq!(subjects.len(), 2);
}

#[tokio::test]
async fn prior_watermark_is_propagated_as_updated_after() {
    let upstream = Arc::new(ScriptedUpstream::default());
    let (store, service) = harness(upstream.clone()).await;

    let watermark = datetime!(2024-01-10 08:00:00 UTC);
    store
        .set_last_sync_time(DataType::Subjects, watermark)
        .await
        .expect("seed watermark");

    service.sync_subjects().await.expect("sync");

    let calls = upstream.recorded_calls();
    assert_eq!(calls, [(DataType::Subjects, Some(watermark))]);
}

#[tokio::test]
async fn absent_watermark_fetches_without_updated_after() {
    let upstream = Arc::new(ScriptedUpstream::default());
    let (_store, service) = harness(upstream.clone()).await;

    service.sync_subjects().await.expect("sync");

    let calls = upstream.recorded_calls();
    assert_eq!(calls, [(DataType::Subjects, None)]);
}

#[tokio::test]
async fn dangling_batch_fails_the_step_and_preserves_the_watermark() {
    let upstream = Arc::new(ScriptedUpstream::default());
    // Assignment references subject 999 which the subjects step never
    // delivered.
    upstream.push_assignments(Ok(vec![assignment(100, 999, SubjectKind::Kanji, 3)]));
    let (store, service) = harness(upstream).await;

    let error = service.sync_assignments().await.expect_err("must fail");
    assert!(matches!(
        error,
        SyncError::Storage {
            data_type: DataType::Assignments,
            ..
        }
    ));

    let marks = watermarks_opt(&store).await;
    assert!(marks[1].is_none(), "failed step advanced its watermark");
    let assignments = store
        .get_assignments(&AssignmentFilter::default())
        .await
        .expect("assignments");
    assert!(assignments.is_empty(), "partial write survived");
}

#[tokio::test]
async fn snapshot_failure_does_not_fail_the_run() {
    let upstream = fresh_scenario();
    let (store, service) = harness(upstream).await;

    // Sabotage only the derived view's table; the source-of-truth
    // pipeline must still complete and advance every watermark.
    sqlx::query("DROP TABLE assignment_snapshots")
        .execute(store.pool())
        .await
        .expect("drop snapshot table");

    let run = service.sync_all().await.expect("single flight free");
    assert!(run.is_success(), "snapshot failure leaked: {:?}", run.error);
    assert_eq!(run.results.len(), 4);

    let marks = watermarks_opt(&store).await;
    assert!(marks.iter().all(Option::is_some));
}

#[tokio::test]
async fn create_assignment_snapshot_reports_rows_written() {
    let upstream = fresh_scenario();
    let (store, service) = harness(upstream).await;
    service.sync_all().await.expect("seed");

    let today = timestamp::now_utc_second().date();
    let rows = service
        .create_assignment_snapshot(today)
        .await
        .expect("derive");
    assert_eq!(rows, 1);

    let stored = store
        .get_assignment_snapshots(&DateRange::default())
        .await
        .expect("snapshots");
    assert_eq!(stored.len(), 1);
}

async fn watermarks(store: &SqliteStore) -> Vec<OffsetDateTime> {
    let mut out = Vec::new();
    for data_type in DataType::ALL {
        out.push(
            store
                .get_last_sync_time(data_type)
                .await
                .expect("watermark read")
                .expect("watermark set"),
        );
    }
    out
}

async fn watermarks_opt(store: &SqliteStore) -> Vec<Option<OffsetDateTime>> {
    let mut out = Vec::new();
    for data_type in DataType::ALL {
        out.push(
            store
                .get_last_sync_time(data_type)
                .await
                .expect("watermark read"),
        );
    }
    out
}
