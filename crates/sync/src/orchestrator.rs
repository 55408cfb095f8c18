use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use time::Date;
use wanimirror_core::{timestamp, DataType, SyncResult};
use wanimirror_storage::MirrorStore;

use crate::error::SyncError;
use crate::upstream::Upstream;

/// Outcome of one full pipeline run: the per-type results in execution
/// order (the halting type included, marked failed), plus the error
/// that stopped the pipeline, if any.
#[derive(Debug)]
pub struct SyncRun {
    pub results: Vec<SyncResult>,
    pub error: Option<SyncError>,
}

impl SyncRun {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// The sync orchestrator.
///
/// Drives the serially ordered pull pipeline against a [`MirrorStore`]
/// and an [`Upstream`]. Per-type watermarks advance only on success;
/// a failure leaves the watermark untouched so the next run resumes
/// from the last known-good point.
pub struct SyncService<S, U> {
    store: Arc<S>,
    upstream: Arc<U>,
    syncing: AtomicBool,
}

impl<S: MirrorStore, U: Upstream> SyncService<S, U> {
    pub fn new(store: Arc<S>, upstream: Arc<U>) -> Self {
        Self {
            store,
            upstream,
            syncing: AtomicBool::new(false),
        }
    }

    /// Whether a `sync_all` currently holds the single-flight guard.
    pub fn is_syncing(&self) -> bool {
        self.syncing.load(Ordering::SeqCst)
    }

    pub async fn sync_subjects(&self) -> Result<SyncResult, SyncError> {
        self.sync_data_type(DataType::Subjects).await
    }

    pub async fn sync_assignments(&self) -> Result<SyncResult, SyncError> {
        self.sync_data_type(DataType::Assignments).await
    }

    pub async fn sync_reviews(&self) -> Result<SyncResult, SyncError> {
        self.sync_data_type(DataType::Reviews).await
    }

    pub async fn sync_statistics(&self) -> Result<SyncResult, SyncError> {
        self.sync_data_type(DataType::Statistics).await
    }

    /// Run the full pipeline: subjects → assignments → reviews →
    /// statistics, then derive today's assignment snapshot.
    ///
    /// Fails fast with [`SyncError::InProgress`] when another call
    /// holds the single-flight guard; it does not queue or block. The
    /// guard is released on every exit path, cancellation included.
    pub async fn sync_all(&self) -> Result<SyncRun, SyncError> {
        if self
            .syncing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(SyncError::InProgress);
        }
        let _guard = FlagGuard {
            flag: &self.syncing,
        };
        Ok(self.run_pipeline().await)
    }

    /// Derive the assignment distribution for `date` and persist it,
    /// replacing any earlier derivation of the same date. Returns the
    /// number of rows written.
    pub async fn create_assignment_snapshot(&self, date: Date) -> Result<usize, SyncError> {
        let rows = self
            .store
            .calculate_assignment_snapshot(date)
            .await
            .map_err(|source| SyncError::Snapshot { source })?;

        let mut tx = self
            .store
            .begin_tx()
            .await
            .map_err(|source| SyncError::Snapshot { source })?;
        if let Err(source) = self.store.upsert_assignment_snapshots(&mut tx, &rows).await {
            self.abort_quietly(tx).await;
            return Err(SyncError::Snapshot { source });
        }
        self.store
            .commit_tx(tx)
            .await
            .map_err(|source| SyncError::Snapshot { source })?;
        Ok(rows.len())
    }

    async fn run_pipeline(&self) -> SyncRun {
        let mut results = Vec::with_capacity(DataType::ALL.len());
        for data_type in DataType::ALL {
            match self.sync_data_type(data_type).await {
                Ok(result) => {
                    tracing::info!(
                        data_type = %data_type,
                        records = result.records_updated,
                        "sync step complete"
                    );
                    results.push(result);
                }
                Err(error) => {
                    tracing::warn!(
                        data_type = %data_type,
                        error = %error,
                        "sync step failed, halting pipeline"
                    );
                    results.push(SyncResult::failed(
                        data_type,
                        error.to_string(),
                        timestamp::now_utc_second(),
                    ));
                    return SyncRun {
                        results,
                        error: Some(error),
                    };
                }
            }
        }

        // The snapshot is a derived view, not part of the source of
        // truth: a failure here is logged, never fails the run, and
        // rolls back no watermark.
        let today = timestamp::now_utc_second().date();
        match self.create_assignment_snapshot(today).await {
            Ok(rows) => tracing::info!(rows, "daily snapshot derived"),
            Err(error) => tracing::warn!(error = %error, "daily snapshot derivation failed"),
        }

        SyncRun {
            results,
            error: None,
        }
    }

    async fn sync_data_type(&self, data_type: DataType) -> Result<SyncResult, SyncError> {
        // The watermark written on success is this clock reading,
        // captured before the fetch: a record modified upstream during
        // the fetch window is re-pulled next run rather than missed.
        let started_at = timestamp::now_utc_second();
        let watermark = self
            .store
            .get_last_sync_time(data_type)
            .await
            .map_err(|source| SyncError::Storage { data_type, source })?;

        let upstream_err = |source| SyncError::Upstream { data_type, source };
        let storage_err = |source| SyncError::Storage { data_type, source };

        let records_updated = match data_type {
            DataType::Subjects => {
                let batch = self
                    .upstream
                    .fetch_subjects(watermark)
                    .await
                    .map_err(upstream_err)?;
                let mut tx = self.store.begin_tx().await.map_err(storage_err)?;
                if let Err(source) = self.store.upsert_subjects(&mut tx, &batch).await {
                    self.abort_quietly(tx).await;
                    return Err(storage_err(source));
                }
                self.store.commit_tx(tx).await.map_err(storage_err)?;
                batch.len() as u64
            }
            DataType::Assignments => {
                let batch = self
                    .upstream
                    .fetch_assignments(watermark)
                    .await
                    .map_err(upstream_err)?;
                let mut tx = self.store.begin_tx().await.map_err(storage_err)?;
                if let Err(source) = self.store.upsert_assignments(&mut tx, &batch).await {
                    self.abort_quietly(tx).await;
                    return Err(storage_err(source));
                }
                self.store.commit_tx(tx).await.map_err(storage_err)?;
                batch.len() as u64
            }
            DataType::Reviews => {
                let batch = self
                    .upstream
                    .fetch_reviews(watermark)
                    .await
                    .map_err(upstream_err)?;
                let mut tx = self.store.begin_tx().await.map_err(storage_err)?;
                if let Err(source) = self.store.upsert_reviews(&mut tx, &batch).await {
                    self.abort_quietly(tx).await;
                    return Err(storage_err(source));
                }
                self.store.commit_tx(tx).await.map_err(storage_err)?;
                batch.len() as u64
            }
            DataType::Statistics => {
                let report = self
                    .upstream
                    .fetch_statistics()
                    .await
                    .map_err(upstream_err)?;
                self.store
                    .insert_statistics(&report, started_at)
                    .await
                    .map_err(storage_err)?;
                1
            }
        };

        self.store
            .set_last_sync_time(data_type, started_at)
            .await
            .map_err(|source| SyncError::Storage { data_type, source })?;

        Ok(SyncResult::succeeded(data_type, records_updated, started_at))
    }

    async fn abort_quietly(&self, tx: S::Tx) {
        if let Err(error) = self.store.abort_tx(tx).await {
            tracing::warn!(error = %error, "transaction rollback failed");
        }
    }
}

/// Releases the single-flight flag when the pipeline finishes or its
/// future is dropped mid-run.
struct FlagGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for FlagGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}
