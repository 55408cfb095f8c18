use std::future::Future;

use time::macros::date;
use wanimirror_core::{AssignmentSnapshot, DateRange, SubjectKind};

use super::{err_str, make_assignment, make_subject, seed, TestResult};
use crate::MirrorStore;

pub(super) async fn run_snapshot_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: MirrorStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "snapshot",
        "derivation_excludes_stage_zero",
        derivation_excludes_stage_zero(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "derivation_groups_by_stage_and_type",
        derivation_groups_by_stage_and_type(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "rederiving_a_date_overwrites_its_rows",
        rederiving_a_date_overwrites_its_rows(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "other_dates_stay_untouched",
        other_dates_stay_untouched(factory).await,
    ));
    results.push(TestResult::from_result(
        "snapshot",
        "date_range_read_orders_ascending",
        date_range_read_orders_ascending(factory).await,
    ));

    results
}

async fn store_snapshot<S: MirrorStore>(
    store: &S,
    rows: &[AssignmentSnapshot],
) -> Result<(), String> {
    let mut tx = store.begin_tx().await.map_err(err_str)?;
    store
        .upsert_assignment_snapshots(&mut tx, rows)
        .await
        .map_err(err_str)?;
    store.commit_tx(tx).await.map_err(err_str)
}

// ── Test implementations ──────────────────────────────────────────────────────

async fn derivation_excludes_stage_zero<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: MirrorStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(
        &s,
        &[
            make_subject(1, SubjectKind::Kanji, 5),
            make_subject(2, SubjectKind::Radical, 1),
        ],
        &[
            make_assignment(100, 1, SubjectKind::Kanji, 0),
            make_assignment(101, 2, SubjectKind::Radical, 3),
        ],
        &[],
    )
    .await?;

    let rows = s
        .calculate_assignment_snapshot(date!(2024 - 01 - 10))
        .await
        .map_err(err_str)?;
    if rows.iter().any(|r| r.srs_stage == 0) {
        return Err(format!("stage-0 row leaked into derivation: {rows:?}"));
    }
    if rows.len() != 1 || rows[0].count != 1 {
        return Err(format!("expected one counted row, got {rows:?}"));
    }
    Ok(())
}

async fn derivation_groups_by_stage_and_type<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: MirrorStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut subjects = Vec::new();
    let mut assignments = Vec::new();
    // Three kanji at stage 3, two radicals at stage 3, one vocabulary
    // at stage 7.
    for i in 0..3 {
        subjects.push(make_subject(i + 1, SubjectKind::Kanji, 5));
        assignments.push(make_assignment(100 + i, i + 1, SubjectKind::Kanji, 3));
    }
    for i in 0..2 {
        subjects.push(make_subject(10 + i, SubjectKind::Radical, 1));
        assignments.push(make_assignment(110 + i, 10 + i, SubjectKind::Radical, 3));
    }
    subjects.push(make_subject(20, SubjectKind::Vocabulary, 9));
    assignments.push(make_assignment(120, 20, SubjectKind::Vocabulary, 7));
    seed(&s, &subjects, &assignments, &[]).await?;

    let d = date!(2024 - 01 - 10);
    let rows = s
        .calculate_assignment_snapshot(d)
        .await
        .map_err(err_str)?;
    let expected = vec![
        AssignmentSnapshot {
            date: d,
            srs_stage: 3,
            subject_type: SubjectKind::Radical,
            count: 2,
        },
        AssignmentSnapshot {
            date: d,
            srs_stage: 3,
            subject_type: SubjectKind::Kanji,
            count: 3,
        },
        AssignmentSnapshot {
            date: d,
            srs_stage: 7,
            subject_type: SubjectKind::Vocabulary,
            count: 1,
        },
    ];
    let mut sorted = rows.clone();
    sorted.sort();
    let mut expected_sorted = expected;
    expected_sorted.sort();
    if sorted != expected_sorted {
        return Err(format!("grouping diverged: {rows:?}"));
    }
    Ok(())
}

/// Re-deriving after the population changed replaces the date's row
/// set, dropping pairs that no longer exist.
async fn rederiving_a_date_overwrites_its_rows<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: MirrorStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let d = date!(2024 - 01 - 10);
    seed(
        &s,
        &[make_subject(1, SubjectKind::Kanji, 5)],
        &[make_assignment(100, 1, SubjectKind::Kanji, 3)],
        &[],
    )
    .await?;

    let first = s.calculate_assignment_snapshot(d).await.map_err(err_str)?;
    store_snapshot(&s, &first).await?;

    // The assignment advances a stage; the old (3, kanji) pair must
    // vanish from the re-derived date.
    seed(
        &s,
        &[],
        &[make_assignment(100, 1, SubjectKind::Kanji, 4)],
        &[],
    )
    .await?;
    let second = s.calculate_assignment_snapshot(d).await.map_err(err_str)?;
    store_snapshot(&s, &second).await?;

    let stored = s
        .get_assignment_snapshots(&DateRange::default())
        .await
        .map_err(err_str)?;
    if stored.len() != 1 || stored[0].srs_stage != 4 {
        return Err(format!("stale rows survived overwrite: {stored:?}"));
    }
    Ok(())
}

async fn other_dates_stay_untouched<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: MirrorStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let yesterday = AssignmentSnapshot {
        date: date!(2024 - 01 - 09),
        srs_stage: 2,
        subject_type: SubjectKind::Kanji,
        count: 7,
    };
    store_snapshot(&s, std::slice::from_ref(&yesterday)).await?;

    let today = AssignmentSnapshot {
        date: date!(2024 - 01 - 10),
        srs_stage: 3,
        subject_type: SubjectKind::Kanji,
        count: 4,
    };
    store_snapshot(&s, std::slice::from_ref(&today)).await?;

    let stored = s
        .get_assignment_snapshots(&DateRange::default())
        .await
        .map_err(err_str)?;
    if stored != [yesterday, today] {
        return Err(format!("cross-date interference: {stored:?}"));
    }
    Ok(())
}

async fn date_range_read_orders_ascending<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: MirrorStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let rows = vec![
        AssignmentSnapshot {
            date: date!(2024 - 01 - 12),
            srs_stage: 3,
            subject_type: SubjectKind::Kanji,
            count: 1,
        },
        AssignmentSnapshot {
            date: date!(2024 - 01 - 10),
            srs_stage: 3,
            subject_type: SubjectKind::Kanji,
            count: 2,
        },
        AssignmentSnapshot {
            date: date!(2024 - 01 - 11),
            srs_stage: 3,
            subject_type: SubjectKind::Kanji,
            count: 3,
        },
    ];
    store_snapshot(&s, &rows).await?;

    let range = DateRange {
        from: Some(date!(2024 - 01 - 10)),
        to: Some(date!(2024 - 01 - 11)),
    };
    let stored = s
        .get_assignment_snapshots(&range)
        .await
        .map_err(err_str)?;
    let dates: Vec<_> = stored.iter().map(|r| r.date).collect();
    if dates != [date!(2024 - 01 - 10), date!(2024 - 01 - 11)] {
        return Err(format!("range or order wrong: {dates:?}"));
    }
    Ok(())
}
