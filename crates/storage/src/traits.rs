use async_trait::async_trait;
use suitedbot_core::{
    Offer, OfferId, OfferStatus, ReviewDirection, SettlementRecord, Submission, SubmissionId,
    Task, TaskId, TaskReview, UserAccount, UserId,
};
use time::OffsetDateTime;

use crate::error::StorageError;
use crate::record::{TaskFilter, Versioned};

/// The storage trait for SuitedBot marketplace backends.
///
/// A `MarketStorage` implementation provides durable, transactional storage
/// for users, tasks, offers, submissions, settlement records, and reviews.
///
/// ## Snapshot Semantics
///
/// All mutating operations take `&mut Self::Snapshot`, a type representing an
/// in-progress transaction. The lifecycle is:
///
/// 1. `begin_snapshot()`: start a transaction, returns a `Snapshot`
/// 2. Call mutating methods with `&mut snapshot`
/// 3. `commit_snapshot(snapshot)`: commit and consume the transaction
///    OR `abort_snapshot(snapshot)`: roll back and consume the transaction
///
/// If a `Snapshot` is dropped without committing, the underlying transaction
/// MUST be rolled back. A lifecycle transition that touches several tables
/// (submission, task, transaction, user balance) is one snapshot, so it lands
/// entirely or not at all.
///
/// ## OCC Conflict Detection
///
/// `update_*` performs an optimistic concurrency check:
/// `UPDATE WHERE version = expected_version`. If the row moved on, the method
/// (or the later commit) returns `Err(StorageError::ConcurrentConflict { .. })`.
///
/// ## Append-only tables
///
/// `insert_transaction` and `insert_review` enforce the unique keys
/// [`TRANSACTION_PER_TASK`](crate::TRANSACTION_PER_TASK) and
/// [`REVIEW_PER_REVIEWER`](crate::REVIEW_PER_REVIEWER), returning
/// `Err(StorageError::Duplicate { key })` on violation.
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync + 'static` to be used in axum
/// application state and across async task boundaries.
#[async_trait]
pub trait MarketStorage: Send + Sync + 'static {
    /// The snapshot (transaction) type used by this storage backend.
    type Snapshot: Send;

    // ── Snapshot lifecycle ────────────────────────────────────────────────────

    async fn begin_snapshot(&self) -> Result<Self::Snapshot, StorageError>;

    async fn commit_snapshot(&self, snapshot: Self::Snapshot) -> Result<(), StorageError>;

    async fn abort_snapshot(&self, snapshot: Self::Snapshot) -> Result<(), StorageError>;

    // ── Users (within snapshot) ───────────────────────────────────────────────

    /// Insert a new user at version 0.
    ///
    /// Returns `Err(StorageError::AlreadyExists)` if the id is taken.
    async fn insert_user(
        &self,
        snapshot: &mut Self::Snapshot,
        user: UserAccount,
    ) -> Result<(), StorageError>;

    async fn get_user_for_update(
        &self,
        snapshot: &mut Self::Snapshot,
        id: UserId,
    ) -> Result<Versioned<UserAccount>, StorageError>;

    /// Replace a user row, conditional on `expected_version`. Returns the new version.
    async fn update_user(
        &self,
        snapshot: &mut Self::Snapshot,
        user: UserAccount,
        expected_version: i64,
    ) -> Result<i64, StorageError>;

    // ── Tasks (within snapshot) ───────────────────────────────────────────────

    async fn insert_task(&self, snapshot: &mut Self::Snapshot, task: Task)
        -> Result<(), StorageError>;

    async fn get_task_for_update(
        &self,
        snapshot: &mut Self::Snapshot,
        id: TaskId,
    ) -> Result<Versioned<Task>, StorageError>;

    async fn update_task(
        &self,
        snapshot: &mut Self::Snapshot,
        task: Task,
        expected_version: i64,
    ) -> Result<i64, StorageError>;

    // ── Offers (within snapshot) ──────────────────────────────────────────────

    async fn insert_offer(
        &self,
        snapshot: &mut Self::Snapshot,
        offer: Offer,
    ) -> Result<(), StorageError>;

    async fn get_offer_for_update(
        &self,
        snapshot: &mut Self::Snapshot,
        id: OfferId,
    ) -> Result<Versioned<Offer>, StorageError>;

    /// All offers on a task as seen by this snapshot, newest first.
    async fn list_task_offers_for_update(
        &self,
        snapshot: &mut Self::Snapshot,
        task_id: TaskId,
    ) -> Result<Vec<Versioned<Offer>>, StorageError>;

    async fn update_offer(
        &self,
        snapshot: &mut Self::Snapshot,
        offer: Offer,
        expected_version: i64,
    ) -> Result<i64, StorageError>;

    // ── Submissions (within snapshot) ─────────────────────────────────────────

    async fn insert_submission(
        &self,
        snapshot: &mut Self::Snapshot,
        submission: Submission,
    ) -> Result<(), StorageError>;

    async fn get_submission_for_update(
        &self,
        snapshot: &mut Self::Snapshot,
        id: SubmissionId,
    ) -> Result<Versioned<Submission>, StorageError>;

    async fn update_submission(
        &self,
        snapshot: &mut Self::Snapshot,
        submission: Submission,
        expected_version: i64,
    ) -> Result<i64, StorageError>;

    // ── Append-only records (within snapshot) ─────────────────────────────────

    /// Insert a settlement record. At most one per task.
    async fn insert_transaction(
        &self,
        snapshot: &mut Self::Snapshot,
        record: SettlementRecord,
    ) -> Result<(), StorageError>;

    /// Insert a review. At most one per (task, reviewer).
    async fn insert_review(
        &self,
        snapshot: &mut Self::Snapshot,
        review: TaskReview,
    ) -> Result<(), StorageError>;

    // ── Query operations (outside snapshot) ───────────────────────────────────

    async fn get_user(&self, id: UserId) -> Result<UserAccount, StorageError>;

    async fn get_task(&self, id: TaskId) -> Result<Task, StorageError>;

    /// Tasks matching `filter`, newest first.
    async fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>, StorageError>;

    async fn get_offer(&self, id: OfferId) -> Result<Offer, StorageError>;

    /// Offers on a task, newest first.
    async fn list_offers(&self, task_id: TaskId) -> Result<Vec<Offer>, StorageError>;

    /// Offers in the given status across all tasks, newest first.
    async fn list_offers_by_status(&self, status: OfferStatus)
        -> Result<Vec<Offer>, StorageError>;

    async fn get_submission(&self, id: SubmissionId) -> Result<Submission, StorageError>;

    /// Submissions on a task, newest first.
    async fn list_submissions(&self, task_id: TaskId) -> Result<Vec<Submission>, StorageError>;

    /// Pending submissions whose auto-approval deadline is at or before `now`,
    /// oldest deadline first.
    async fn list_due_submissions(
        &self,
        now: OffsetDateTime,
    ) -> Result<Vec<Submission>, StorageError>;

    async fn list_transactions(&self, task_id: TaskId)
        -> Result<Vec<SettlementRecord>, StorageError>;

    /// Reviews written about this task, oldest first.
    async fn list_task_reviews(&self, task_id: TaskId) -> Result<Vec<TaskReview>, StorageError>;

    /// Reviews received by `user_id` in the given direction, newest first.
    async fn list_reviews_received(
        &self,
        user_id: UserId,
        direction: ReviewDirection,
    ) -> Result<Vec<TaskReview>, StorageError>;
}
