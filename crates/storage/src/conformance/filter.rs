use std::future::Future;

use time::macros::datetime;
use wanimirror_core::{AssignmentFilter, SubjectFilter, SubjectKind, TimeRange};

use super::{err_str, make_assignment, make_review, make_subject, seed, TestResult};
use crate::MirrorStore;

pub(super) async fn run_filter_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: MirrorStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "filter",
        "unconstrained_filters_return_everything",
        unconstrained_filters_return_everything(factory).await,
    ));
    results.push(TestResult::from_result(
        "filter",
        "subject_level_filter_sound_and_complete",
        subject_level_filter_sound_and_complete(factory).await,
    ));
    results.push(TestResult::from_result(
        "filter",
        "subject_kind_and_level_combine_conjunctively",
        subject_kind_and_level_combine_conjunctively(factory).await,
    ));
    results.push(TestResult::from_result(
        "filter",
        "assignment_stage_filter_sound_and_complete",
        assignment_stage_filter_sound_and_complete(factory).await,
    ));
    results.push(TestResult::from_result(
        "filter",
        "review_range_bounds_are_inclusive",
        review_range_bounds_are_inclusive(factory).await,
    ));
    results.push(TestResult::from_result(
        "filter",
        "review_range_half_open_sides",
        review_range_half_open_sides(factory).await,
    ));

    results
}

// ── Test implementations ──────────────────────────────────────────────────────

async fn unconstrained_filters_return_everything<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: MirrorStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let subjects = vec![
        make_subject(1, SubjectKind::Radical, 1),
        make_subject(2, SubjectKind::Kanji, 5),
        make_subject(3, SubjectKind::Vocabulary, 10),
    ];
    seed(&s, &subjects, &[], &[]).await?;

    let stored = s
        .get_subjects(&SubjectFilter::default())
        .await
        .map_err(err_str)?;
    if stored.len() != subjects.len() {
        return Err(format!(
            "expected {} rows, got {}",
            subjects.len(),
            stored.len()
        ));
    }
    Ok(())
}

/// `Query(F) = {x ∈ S : F(x)}` — checked against the in-model
/// predicate, so the SQL can neither over- nor under-select.
async fn subject_level_filter_sound_and_complete<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: MirrorStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let subjects = vec![
        make_subject(1, SubjectKind::Radical, 1),
        make_subject(2, SubjectKind::Kanji, 5),
        make_subject(3, SubjectKind::Vocabulary, 10),
        make_subject(4, SubjectKind::Kanji, 5),
    ];
    seed(&s, &subjects, &[], &[]).await?;

    let filter = SubjectFilter {
        level: Some(5),
        ..Default::default()
    };
    let stored = s.get_subjects(&filter).await.map_err(err_str)?;
    let expected: Vec<_> = subjects.iter().filter(|x| filter.matches(x)).collect();
    if stored.iter().collect::<Vec<_>>() != expected {
        return Err(format!("filter diverged from model: {stored:?}"));
    }
    Ok(())
}

async fn subject_kind_and_level_combine_conjunctively<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: MirrorStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let subjects = vec![
        make_subject(1, SubjectKind::Kanji, 5),
        make_subject(2, SubjectKind::Radical, 5),
        make_subject(3, SubjectKind::Kanji, 6),
    ];
    seed(&s, &subjects, &[], &[]).await?;

    let filter = SubjectFilter {
        kind: Some(SubjectKind::Kanji),
        level: Some(5),
    };
    let stored = s.get_subjects(&filter).await.map_err(err_str)?;
    if stored.len() != 1 || stored[0].id != 1 {
        return Err(format!("expected only subject 1, got {stored:?}"));
    }
    Ok(())
}

async fn assignment_stage_filter_sound_and_complete<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: MirrorStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let subjects = vec![
        make_subject(1, SubjectKind::Kanji, 5),
        make_subject(2, SubjectKind::Radical, 1),
    ];
    let assignments = vec![
        make_assignment(100, 1, SubjectKind::Kanji, 3),
        make_assignment(101, 2, SubjectKind::Radical, 5),
        make_assignment(102, 1, SubjectKind::Kanji, 3),
    ];
    seed(&s, &subjects, &assignments, &[]).await?;

    let filter = AssignmentFilter { srs_stage: Some(3) };
    let stored = s.get_assignments(&filter).await.map_err(err_str)?;
    let expected: Vec<_> = assignments.iter().filter(|a| filter.matches(a)).collect();
    if stored.iter().collect::<Vec<_>>() != expected {
        return Err(format!("filter diverged from model: {stored:?}"));
    }
    Ok(())
}

/// Rows exactly on the `from`/`to` seconds are included.
async fn review_range_bounds_are_inclusive<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: MirrorStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let subject = make_subject(1, SubjectKind::Kanji, 5);
    let assignment = make_assignment(100, 1, SubjectKind::Kanji, 3);
    let reviews = vec![
        make_review(200, 100, 1, datetime!(2024-01-09 23:59:59 UTC)),
        make_review(201, 100, 1, datetime!(2024-01-10 00:00:00 UTC)),
        make_review(202, 100, 1, datetime!(2024-01-11 23:59:59 UTC)),
        make_review(203, 100, 1, datetime!(2024-01-12 00:00:00 UTC)),
    ];
    seed(&s, &[subject], &[assignment], &reviews).await?;

    let range = TimeRange {
        from: Some(datetime!(2024-01-10 00:00:00 UTC)),
        to: Some(datetime!(2024-01-11 23:59:59 UTC)),
    };
    let stored = s.get_reviews(&range).await.map_err(err_str)?;
    let ids: Vec<i64> = stored.iter().map(|r| r.id).collect();
    if ids != [201, 202] {
        return Err(format!("expected [201, 202], got {ids:?}"));
    }
    Ok(())
}

async fn review_range_half_open_sides<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: MirrorStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let subject = make_subject(1, SubjectKind::Kanji, 5);
    let assignment = make_assignment(100, 1, SubjectKind::Kanji, 3);
    let reviews = vec![
        make_review(200, 100, 1, datetime!(2024-01-09 00:00:00 UTC)),
        make_review(201, 100, 1, datetime!(2024-01-10 00:00:00 UTC)),
        make_review(202, 100, 1, datetime!(2024-01-11 00:00:00 UTC)),
    ];
    seed(&s, &[subject], &[assignment], &reviews).await?;

    let from_only = TimeRange {
        from: Some(datetime!(2024-01-10 00:00:00 UTC)),
        to: None,
    };
    let stored = s.get_reviews(&from_only).await.map_err(err_str)?;
    if stored.iter().map(|r| r.id).collect::<Vec<_>>() != [201, 202] {
        return Err(format!("from-only range wrong: {stored:?}"));
    }

    let to_only = TimeRange {
        from: None,
        to: Some(datetime!(2024-01-10 00:00:00 UTC)),
    };
    let stored = s.get_reviews(&to_only).await.map_err(err_str)?;
    if stored.iter().map(|r| r.id).collect::<Vec<_>>() != [200, 201] {
        return Err(format!("to-only range wrong: {stored:?}"));
    }
    Ok(())
}
