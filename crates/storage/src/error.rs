/// Unique key on `transactions`: one settlement per task.
pub const TRANSACTION_PER_TASK: &str = "transactions.task_id";

/// Unique key on `task_reviews`: one review per (task, reviewer).
pub const REVIEW_PER_REVIEWER: &str = "task_reviews.task_id_reviewer_id";

/// All errors that can be returned by a MarketStorage implementation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    /// Optimistic concurrency control conflict: another snapshot committed a
    /// change to the row after it was read. The expected version was not found.
    #[error("concurrent conflict on {table}/{id}: expected version {expected_version}")]
    ConcurrentConflict {
        table: &'static str,
        id: String,
        expected_version: i64,
    },

    /// No row with the given id.
    #[error("{table} not found: {id}")]
    NotFound { table: &'static str, id: String },

    /// A row with this id already exists.
    #[error("{table} already exists: {id}")]
    AlreadyExists { table: &'static str, id: String },

    /// An append-only insert violated a uniqueness constraint.
    #[error("unique constraint violated: {key}")]
    Duplicate { key: &'static str },

    /// A backend-specific storage error (connection, serialization, poisoned lock, etc.).
    #[error("storage backend error: {0}")]
    Backend(String),
}
