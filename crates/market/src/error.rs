use suitedbot_core::{BudgetError, RatingError, TransitionError};
use suitedbot_storage::{StorageError, REVIEW_PER_REVIEWER, TRANSACTION_PER_TASK};

/// Failure of a marketplace operation.
///
/// Every variant carries a human-readable message suitable for returning to
/// the caller as-is.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MarketError {
    /// Missing or malformed input.
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    /// The caller is known but may not act on this entity.
    #[error("{0}")]
    Forbidden(String),

    /// The entity is not in a state that permits the requested transition.
    #[error("{0}")]
    InvalidState(String),

    /// The entity was already claimed, settled, or changed underneath us.
    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    DuplicateReview(String),

    #[error("{0}")]
    InsufficientFunds(String),

    #[error("store error: {0}")]
    Store(StorageError),
}

impl MarketError {
    pub fn validation(msg: impl Into<String>) -> Self {
        MarketError::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        MarketError::NotFound(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        MarketError::Forbidden(msg.into())
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        MarketError::InvalidState(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        MarketError::Conflict(msg.into())
    }
}

impl From<StorageError> for MarketError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound { table, .. } => {
                MarketError::NotFound(format!("{} not found", entity_name(table)))
            }
            StorageError::Duplicate { key } if key == REVIEW_PER_REVIEWER => {
                MarketError::DuplicateReview(
                    "You have already reviewed this task".to_string(),
                )
            }
            StorageError::Duplicate { key } if key == TRANSACTION_PER_TASK => {
                MarketError::Conflict("Task has already been settled".to_string())
            }
            StorageError::ConcurrentConflict { table, .. } => MarketError::Conflict(format!(
                "{} was modified concurrently, retry the request",
                entity_name(table)
            )),
            other => MarketError::Store(other),
        }
    }
}

impl From<TransitionError> for MarketError {
    fn from(e: TransitionError) -> Self {
        MarketError::InvalidState(e.to_string())
    }
}

impl From<BudgetError> for MarketError {
    fn from(e: BudgetError) -> Self {
        MarketError::Validation(e.to_string())
    }
}

impl From<RatingError> for MarketError {
    fn from(_: RatingError) -> Self {
        MarketError::Validation("Rating must be between 1 and 5".to_string())
    }
}

fn entity_name(table: &str) -> &str {
    match table {
        "users" => "User",
        "tasks" => "Task",
        "offers" => "Offer",
        "submissions" => "Submission",
        "transactions" => "Transaction",
        "task_reviews" => "Review",
        other => other,
    }
}
