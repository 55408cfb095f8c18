use std::future::Future;

use time::macros::datetime;
use wanimirror_core::DataType;

use super::{err_str, TestResult};
use crate::MirrorStore;

pub(super) async fn run_watermark_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: MirrorStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "watermark",
        "absent_watermark_reads_none",
        absent_watermark_reads_none(factory).await,
    ));
    results.push(TestResult::from_result(
        "watermark",
        "set_then_get_round_trips",
        set_then_get_round_trips(factory).await,
    ));
    results.push(TestResult::from_result(
        "watermark",
        "overwrite_advances_the_watermark",
        overwrite_advances_the_watermark(factory).await,
    ));
    results.push(TestResult::from_result(
        "watermark",
        "watermarks_are_independent_per_type",
        watermarks_are_independent_per_type(factory).await,
    ));

    results
}

// ── Test implementations ──────────────────────────────────────────────────────

/// Absence means "no successful sync yet".
async fn absent_watermark_reads_none<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: MirrorStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    for data_type in DataType::ALL {
        if let Some(ts) = s.get_last_sync_time(data_type).await.map_err(err_str)? {
            return Err(format!("phantom watermark for {data_type}: {ts}"));
        }
    }
    Ok(())
}

async fn set_then_get_round_trips<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: MirrorStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let ts = datetime!(2024-01-10 08:30:15 UTC);
    s.set_last_sync_time(DataType::Subjects, ts)
        .await
        .map_err(err_str)?;

    let stored = s
        .get_last_sync_time(DataType::Subjects)
        .await
        .map_err(err_str)?;
    if stored != Some(ts) {
        return Err(format!("expected {ts}, got {stored:?}"));
    }
    Ok(())
}

async fn overwrite_advances_the_watermark<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: MirrorStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    s.set_last_sync_time(DataType::Reviews, datetime!(2024-01-10 08:00:00 UTC))
        .await
        .map_err(err_str)?;
    s.set_last_sync_time(DataType::Reviews, datetime!(2024-01-11 08:00:00 UTC))
        .await
        .map_err(err_str)?;

    let stored = s
        .get_last_sync_time(DataType::Reviews)
        .await
        .map_err(err_str)?;
    if stored != Some(datetime!(2024-01-11 08:00:00 UTC)) {
        return Err(format!("watermark not advanced: {stored:?}"));
    }
    Ok(())
}

async fn watermarks_are_independent_per_type<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: MirrorStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    s.set_last_sync_time(DataType::Subjects, datetime!(2024-01-10 08:00:00 UTC))
        .await
        .map_err(err_str)?;

    if s.get_last_sync_time(DataType::Assignments)
        .await
        .map_err(err_str)?
        .is_some()
    {
        return Err("assignments watermark leaked from subjects".to_string());
    }
    Ok(())
}
