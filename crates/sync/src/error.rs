use wanimirror_client::ApiError;
use wanimirror_core::DataType;
use wanimirror_storage::StorageError;

/// Failures surfaced by the sync orchestrator.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Another `sync_all` holds the single-flight guard.
    #[error("sync already in progress")]
    InProgress,

    /// The upstream fetch for one data type failed after the client's
    /// retries were exhausted.
    #[error("{data_type} fetch failed: {source}")]
    Upstream {
        data_type: DataType,
        #[source]
        source: ApiError,
    },

    /// Persisting one data type's batch or watermark failed.
    #[error("{data_type} persistence failed: {source}")]
    Storage {
        data_type: DataType,
        #[source]
        source: StorageError,
    },

    /// Deriving or writing the daily distribution failed. Swallowed by
    /// the pipeline (the snapshot is a derived view), surfaced only
    /// when `create_assignment_snapshot` is invoked directly.
    #[error("snapshot derivation failed: {source}")]
    Snapshot {
        #[source]
        source: StorageError,
    },
}

impl SyncError {
    /// The upstream classification behind this error, when there is one.
    pub fn upstream_cause(&self) -> Option<&ApiError> {
        match self {
            SyncError::Upstream { source, .. } => Some(source),
            _ => None,
        }
    }
}
