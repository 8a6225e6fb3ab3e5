//! Persisted marketplace records.
//!
//! Status changes go through the methods on each record, which consult the
//! transition table in [`crate::lifecycle`] and keep the dependent fields
//! (`claimed_by`, `auto_approve_at`) in step with the status.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::ids::{OfferId, ReviewId, SubmissionId, TaskId, TransactionId, UserId};
use crate::lifecycle::{
    OfferEvent, OfferStatus, SubmissionEvent, SubmissionStatus, TaskEvent, TaskStatus,
    TransitionError,
};
use crate::money::Budget;

// ──────────────────────────────────────────────
// Users
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserType {
    Human,
    Bot,
}

impl UserType {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserType::Human => "human",
            UserType::Bot => "bot",
        }
    }
}

/// A marketplace account with its balance and reputation counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserAccount {
    pub id: UserId,
    pub display_name: String,
    pub user_type: UserType,
    /// The human operating this account, for bots acting on delegated credentials.
    pub master_id: Option<UserId>,
    pub salt_balance: Decimal,
    pub tasks_posted: u32,
    pub tasks_completed: u32,
    pub reputation: i64,
    pub poster_reputation: i64,
    pub poster_reviews_count: u32,
    pub avg_poster_rating: Decimal,
    pub worker_reviews_count: u32,
    pub avg_worker_rating: Decimal,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl UserAccount {
    pub fn new(display_name: impl Into<String>, user_type: UserType, now: OffsetDateTime) -> Self {
        Self {
            id: UserId::new(),
            display_name: display_name.into(),
            user_type,
            master_id: None,
            salt_balance: Decimal::ZERO,
            tasks_posted: 0,
            tasks_completed: 0,
            reputation: 0,
            poster_reputation: 0,
            poster_reviews_count: 0,
            avg_poster_rating: Decimal::ZERO,
            worker_reviews_count: 0,
            avg_worker_rating: Decimal::ZERO,
            created_at: now,
        }
    }
}

/// Fold one more rating into an average over `count` previous ratings,
/// rounded to two decimal places.
pub fn running_mean(avg: Decimal, count: u32, rating: Rating) -> Decimal {
    let total = avg * Decimal::from(count) + Decimal::from(rating.get());
    (total / Decimal::from(count + 1)).round_dp(2)
}

// ──────────────────────────────────────────────
// Tasks
// ──────────────────────────────────────────────

/// Which kind of worker a task is aimed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetType {
    Human,
    Bot,
    #[default]
    Any,
}

impl TargetType {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "human" => Some(TargetType::Human),
            "bot" => Some(TargetType::Bot),
            "any" => Some(TargetType::Any),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub poster_id: UserId,
    pub title: String,
    pub description: String,
    pub category: String,
    pub budget: Budget,
    pub target_type: TargetType,
    pub status: TaskStatus,
    pub claimed_by: Option<UserId>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub claimed_at: Option<OffsetDateTime>,
    pub offer_count: u32,
    #[serde(with = "time::serde::rfc3339::option")]
    pub deadline: Option<OffsetDateTime>,
    pub required_tags: Vec<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Task {
    /// Assign the task to `worker`.
    pub fn claim(&mut self, worker: UserId, now: OffsetDateTime) -> Result<(), TransitionError> {
        self.status = self.status.transition(TaskEvent::Claim)?;
        self.claimed_by = Some(worker);
        self.claimed_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    pub fn record_submission(&mut self, now: OffsetDateTime) -> Result<(), TransitionError> {
        self.status = self.status.transition(TaskEvent::Submit)?;
        self.updated_at = now;
        Ok(())
    }

    /// Apply the task side of a submission review: completion on approval,
    /// back to the worker on rejection or revision.
    pub fn apply_review(
        &mut self,
        event: SubmissionEvent,
        now: OffsetDateTime,
    ) -> Result<(), TransitionError> {
        self.status = self.status.transition(event.task_event())?;
        self.updated_at = now;
        Ok(())
    }

    /// `claimed_by` is set exactly when the status implies a worker.
    pub fn is_consistent(&self) -> bool {
        self.claimed_by.is_some() == self.status.has_worker()
    }
}

// ──────────────────────────────────────────────
// Offers
// ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Offer {
    pub id: OfferId,
    pub task_id: TaskId,
    pub offerer_id: UserId,
    pub offer_text: String,
    pub price_salt: Option<Decimal>,
    pub price_usdc: Option<Decimal>,
    pub status: OfferStatus,
    /// The offer this one counters.
    pub parent_offer_id: Option<OfferId>,
    /// Who approved or rejected a bot suggestion.
    pub decided_by: Option<UserId>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub decided_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Offer {
    pub fn apply(&mut self, event: OfferEvent, now: OffsetDateTime) -> Result<(), TransitionError> {
        self.status = self.status.transition(event)?;
        self.updated_at = now;
        Ok(())
    }
}

// ──────────────────────────────────────────────
// Submissions
// ──────────────────────────────────────────────

/// Metadata describing an uploaded proof attachment.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProofMetadata {
    pub hash: Option<String>,
    pub file_type: Option<String>,
    pub file_size: Option<u64>,
    pub original_name: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub uploaded_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub id: SubmissionId,
    pub task_id: TaskId,
    pub submitter_id: UserId,
    pub content: String,
    pub attachment_url: Option<String>,
    pub proof_url: Option<String>,
    pub proof_metadata: Option<ProofMetadata>,
    pub status: SubmissionStatus,
    pub reviewer_notes: Option<String>,
    /// Deadline after which the sweeper approves the submission. Only set while pending.
    #[serde(with = "time::serde::rfc3339::option")]
    pub auto_approve_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub reviewed_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Submission {
    /// Apply a review outcome. Clears the auto-approval deadline.
    pub fn review(
        &mut self,
        event: SubmissionEvent,
        notes: Option<String>,
        now: OffsetDateTime,
    ) -> Result<(), TransitionError> {
        self.status = self.status.transition(event)?;
        self.reviewer_notes = notes;
        self.auto_approve_at = None;
        self.reviewed_at = Some(now);
        Ok(())
    }

    /// Pending with an elapsed auto-approval deadline.
    pub fn is_due(&self, now: OffsetDateTime) -> bool {
        self.status == SubmissionStatus::Pending
            && self.auto_approve_at.is_some_and(|at| at <= now)
    }

    /// `auto_approve_at` is set exactly while the submission is pending.
    pub fn is_consistent(&self) -> bool {
        self.auto_approve_at.is_some() == (self.status == SubmissionStatus::Pending)
    }
}

// ──────────────────────────────────────────────
// Settlement
// ──────────────────────────────────────────────

/// Append-only record of a released payment. One per task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementRecord {
    pub id: TransactionId,
    pub task_id: TaskId,
    pub poster_id: UserId,
    pub completer_id: UserId,
    pub offer_id: Option<OfferId>,
    pub submission_id: SubmissionId,
    pub amount: Budget,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

// ──────────────────────────────────────────────
// Reviews
// ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("rating must be between 1 and 5, got {0}")]
pub struct RatingError(pub i64);

/// A star rating in `1..=5`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub struct Rating(u8);

impl Rating {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    pub fn new(value: i64) -> Result<Self, RatingError> {
        if (Self::MIN as i64..=Self::MAX as i64).contains(&value) {
            Ok(Rating(value as u8))
        } else {
            Err(RatingError(value))
        }
    }

    /// Sub-ratings outside the range are dropped rather than rejected.
    pub fn lenient(value: Option<i64>) -> Option<Self> {
        value.and_then(|v| Rating::new(v).ok())
    }

    pub fn get(&self) -> u8 {
        self.0
    }
}

impl TryFrom<i64> for Rating {
    type Error = RatingError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Rating::new(value)
    }
}

impl From<Rating> for u8 {
    fn from(r: Rating) -> u8 {
        r.0
    }
}

/// Which side of the poster/worker relationship wrote a review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDirection {
    WorkerReviewsPoster,
    PosterReviewsWorker,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskReview {
    pub id: ReviewId,
    pub task_id: TaskId,
    pub reviewer_id: UserId,
    pub reviewed_id: UserId,
    pub direction: ReviewDirection,
    pub rating: Rating,
    pub clarity_rating: Option<Rating>,
    pub communication_rating: Option<Rating>,
    pub payment_speed_rating: Option<Rating>,
    pub would_work_again: bool,
    pub comment: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn sample_task(now: OffsetDateTime) -> Task {
        Task {
            id: TaskId::new(),
            poster_id: UserId::new(),
            title: "Label 200 images".into(),
            description: String::new(),
            category: "general".into(),
            budget: Budget::Salt(Decimal::from(100)),
            target_type: TargetType::Any,
            status: TaskStatus::Active,
            claimed_by: None,
            claimed_at: None,
            offer_count: 0,
            deadline: None,
            required_tags: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn claim_sets_worker_and_keeps_invariant() {
        let now = datetime!(2026-03-01 12:00 UTC);
        let mut task = sample_task(now);
        assert!(task.is_consistent());

        let worker = UserId::new();
        task.claim(worker, now).unwrap();
        assert_eq!(task.status, TaskStatus::Claimed);
        assert_eq!(task.claimed_by, Some(worker));
        assert_eq!(task.claimed_at, Some(now));
        assert!(task.is_consistent());

        assert!(task.claim(UserId::new(), now).is_err());
        assert_eq!(task.claimed_by, Some(worker));
    }

    #[test]
    fn rejected_review_returns_task_to_claimed() {
        let now = datetime!(2026-03-01 12:00 UTC);
        let mut task = sample_task(now);
        task.claim(UserId::new(), now).unwrap();
        task.record_submission(now).unwrap();
        task.apply_review(SubmissionEvent::Reject, now).unwrap();
        assert_eq!(task.status, TaskStatus::Claimed);
        task.record_submission(now).unwrap();
        task.apply_review(SubmissionEvent::Approve, now).unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert!(task.is_consistent());
    }

    #[test]
    fn review_clears_deadline() {
        let now = datetime!(2026-03-01 12:00 UTC);
        let mut sub = Submission {
            id: SubmissionId::new(),
            task_id: TaskId::new(),
            submitter_id: UserId::new(),
            content: "done".into(),
            attachment_url: None,
            proof_url: None,
            proof_metadata: None,
            status: SubmissionStatus::Pending,
            reviewer_notes: None,
            auto_approve_at: Some(datetime!(2026-03-03 12:00 UTC)),
            reviewed_at: None,
            created_at: now,
        };
        assert!(sub.is_consistent());
        assert!(!sub.is_due(now));
        assert!(sub.is_due(datetime!(2026-03-03 12:00 UTC)));

        sub.review(SubmissionEvent::RequestRevision, Some("add labels".into()), now)
            .unwrap();
        assert_eq!(sub.status, SubmissionStatus::RevisionRequested);
        assert_eq!(sub.auto_approve_at, None);
        assert!(sub.is_consistent());
        assert!(!sub.is_due(datetime!(2026-04-01 00:00 UTC)));
    }

    #[test]
    fn rating_bounds() {
        assert!(Rating::new(0).is_err());
        assert_eq!(Rating::new(5).unwrap().get(), 5);
        assert_eq!(Rating::new(6), Err(RatingError(6)));
        assert_eq!(Rating::lenient(Some(9)), None);
        assert_eq!(Rating::lenient(Some(3)).map(|r| r.get()), Some(3));
        assert_eq!(Rating::lenient(None), None);
        assert!(serde_json::from_str::<Rating>("7").is_err());
    }

    #[test]
    fn running_mean_rounds_to_cents() {
        let r = |v| Rating::new(v).unwrap();
        let first = running_mean(Decimal::ZERO, 0, r(5));
        assert_eq!(first, Decimal::from(5));
        let second = running_mean(first, 1, r(4));
        assert_eq!(second, Decimal::new(450, 2));
        let third = running_mean(second, 2, r(4));
        assert_eq!(third, Decimal::new(433, 2));
    }
}
