/// All errors that can be returned by a `MirrorStore` implementation.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// A batch row references a primary key that does not exist in the
    /// store. The whole batch is rejected; no rows are written.
    #[error("{entity} {entity_id} references missing {referenced} {referenced_id}")]
    MissingReference {
        entity: &'static str,
        entity_id: i64,
        referenced: &'static str,
        referenced_id: i64,
    },

    /// A stored value could not be decoded back into its domain shape
    /// (bad timestamp text, unknown kind string, and the like).
    #[error("corrupt stored value: {0}")]
    Corrupt(String),

    /// A migration unit failed; later units were not attempted.
    #[error("migration {version} ({name}) failed: {source}")]
    Migration {
        version: i64,
        name: &'static str,
        #[source]
        source: sqlx::Error,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("timestamp formatting error: {0}")]
    TimestampFormat(#[from] time::error::Format),

    /// A backend database error (connection, constraint, I/O).
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}
