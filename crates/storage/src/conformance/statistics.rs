use std::future::Future;

use time::macros::datetime;
use wanimirror_core::TimeRange;

use super::{err_str, TestResult};
use crate::MirrorStore;

pub(super) async fn run_statistics_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: MirrorStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "statistics",
        "captures_read_back_newest_first",
        captures_read_back_newest_first(factory).await,
    ));
    results.push(TestResult::from_result(
        "statistics",
        "latest_returns_max_captured_at",
        latest_returns_max_captured_at(factory).await,
    ));
    results.push(TestResult::from_result(
        "statistics",
        "latest_absent_on_empty_store",
        latest_absent_on_empty_store(factory).await,
    ));
    results.push(TestResult::from_result(
        "statistics",
        "range_bounds_are_inclusive",
        range_bounds_are_inclusive(factory).await,
    ));
    results.push(TestResult::from_result(
        "statistics",
        "payload_round_trips_verbatim",
        payload_round_trips_verbatim(factory).await,
    ));

    results
}

// ── Test implementations ──────────────────────────────────────────────────────

async fn captures_read_back_newest_first<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: MirrorStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    for (hour, label) in [(8, "first"), (9, "second"), (10, "third")] {
        let data = serde_json::json!({ "label": label });
        let ts = datetime!(2024-01-10 00:00:00 UTC) + time::Duration::hours(hour);
        s.insert_statistics(&data, ts).await.map_err(err_str)?;
    }

    let stored = s
        .get_statistics(&TimeRange::default())
        .await
        .map_err(err_str)?;
    let labels: Vec<&str> = stored
        .iter()
        .filter_map(|c| c.data["label"].as_str())
        .collect();
    if labels != ["third", "second", "first"] {
        return Err(format!("expected newest first, got {labels:?}"));
    }
    Ok(())
}

async fn latest_returns_max_captured_at<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: MirrorStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    s.insert_statistics(&serde_json::json!({"n": 1}), datetime!(2024-01-10 08:00:00 UTC))
        .await
        .map_err(err_str)?;
    s.insert_statistics(&serde_json::json!({"n": 2}), datetime!(2024-01-10 09:00:00 UTC))
        .await
        .map_err(err_str)?;

    let latest = s
        .get_latest_statistics()
        .await
        .map_err(err_str)?
        .ok_or("latest missing")?;
    if latest.data["n"] != 2 {
        return Err(format!("expected newest capture, got {:?}", latest.data));
    }
    if latest.captured_at != datetime!(2024-01-10 09:00:00 UTC) {
        return Err(format!("captured_at diverged: {}", latest.captured_at));
    }
    Ok(())
}

async fn latest_absent_on_empty_store<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: MirrorStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    match s.get_latest_statistics().await.map_err(err_str)? {
        None => Ok(()),
        Some(row) => Err(format!("phantom capture: {row:?}")),
    }
}

async fn range_bounds_are_inclusive<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: MirrorStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    for hour in [7, 8, 9, 10] {
        let ts = datetime!(2024-01-10 00:00:00 UTC) + time::Duration::hours(hour);
        s.insert_statistics(&serde_json::json!({ "hour": hour }), ts)
            .await
            .map_err(err_str)?;
    }

    let range = TimeRange {
        from: Some(datetime!(2024-01-10 08:00:00 UTC)),
        to: Some(datetime!(2024-01-10 09:00:00 UTC)),
    };
    let stored = s.get_statistics(&range).await.map_err(err_str)?;
    let hours: Vec<i64> = stored
        .iter()
        .filter_map(|c| c.data["hour"].as_i64())
        .collect();
    if hours != [9, 8] {
        return Err(format!("expected [9, 8], got {hours:?}"));
    }
    Ok(())
}

async fn payload_round_trips_verbatim<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: MirrorStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let data = serde_json::json!({
        "lessons": {"subject_ids": [1, 2, 3]},
        "reviews": [{"available_at": "2024-01-10T09:00:00Z", "subject_ids": [440]}],
        "next_reviews_at": null
    });
    s.insert_statistics(&data, datetime!(2024-01-10 08:00:00 UTC))
        .await
        .map_err(err_str)?;

    let latest = s
        .get_latest_statistics()
        .await
        .map_err(err_str)?
        .ok_or("latest missing")?;
    if latest.data != data {
        return Err(format!("payload diverged: {:?}", latest.data));
    }
    Ok(())
}
