//! Conformance test suite for `MarketStorage` implementations.
//!
//! This module provides a backend-agnostic test suite that any `MarketStorage`
//! implementation can run to verify correctness. The suite covers:
//!
//! - **Initialization**: row creation at version 0, duplicate and missing ids
//! - **Atomic commit**: all-or-nothing semantics for multi-table snapshots
//! - **Version validation / OCC**: optimistic concurrency conflict detection
//! - **Concurrency**: racing snapshots on the same row, exactly one wins
//! - **Uniqueness**: one settlement per task, one review per (task, reviewer)
//! - **Queries**: ordering and filtering of the read-side listings
//!
//! # Usage
//!
//! Backend crates call [`run_conformance_suite`] with a factory function that
//! creates a fresh, empty storage instance for each test:
//!
//! ```ignore
//! use suitedbot_storage::conformance::run_conformance_suite;
//!
//! #[tokio::test]
//! async fn postgres_conformance() {
//!     let report = run_conformance_suite(|| async {
//!         create_test_postgres_storage().await
//!     }).await;
//!     assert!(report.failed == 0, "{report}");
//! }
//! ```

mod commit;
mod concurrent;
mod init;
mod query;
mod unique;
mod version;

use std::fmt;
use std::future::Future;

use rust_decimal::Decimal;
use suitedbot_core::{
    Budget, Offer, OfferId, OfferStatus, Rating, ReviewDirection, ReviewId, SettlementRecord,
    Submission, SubmissionId, SubmissionStatus, TargetType, Task, TaskId, TaskReview,
    TaskStatus, TransactionId, UserAccount, UserId, UserType,
};
use time::macros::datetime;
use time::{Duration, OffsetDateTime};

use crate::MarketStorage;

/// Result of a single conformance test.
#[derive(Debug, Clone)]
pub struct TestResult {
    /// Test category (e.g. "init", "commit", "unique").
    pub category: String,
    /// Test name (e.g. "insert_user_starts_at_version_0").
    pub name: String,
    pub passed: bool,
    /// Error message if the test failed.
    pub message: Option<String>,
}

impl TestResult {
    fn from_result(category: &str, name: &str, result: Result<(), String>) -> Self {
        let (passed, message) = match result {
            Ok(()) => (true, None),
            Err(msg) => (false, Some(msg)),
        };
        Self {
            category: category.to_string(),
            name: name.to_string(),
            passed,
            message,
        }
    }
}

/// Aggregated report from a full conformance suite run.
#[derive(Debug, Clone)]
pub struct ConformanceReport {
    pub results: Vec<TestResult>,
    pub passed: usize,
    pub failed: usize,
    pub total: usize,
}

impl fmt::Display for ConformanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Conformance: {}/{} passed ({} failed)",
            self.passed, self.total, self.failed
        )?;
        for r in &self.results {
            if !r.passed {
                writeln!(
                    f,
                    "  FAIL [{}/{}]: {}",
                    r.category,
                    r.name,
                    r.message.as_deref().unwrap_or("(no message)")
                )?;
            }
        }
        Ok(())
    }
}

/// Run the full conformance suite against a storage backend.
///
/// The `factory` function is called once per test to create a fresh, empty
/// storage instance, ensuring test isolation.
pub async fn run_conformance_suite<S, F, Fut>(factory: F) -> ConformanceReport
where
    S: MarketStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.extend(init::run_init_tests(&factory).await);
    results.extend(commit::run_commit_tests(&factory).await);
    results.extend(version::run_version_tests(&factory).await);
    results.extend(concurrent::run_concurrent_tests(&factory).await);
    results.extend(unique::run_unique_tests(&factory).await);
    results.extend(query::run_query_tests(&factory).await);

    let passed = results.iter().filter(|r| r.passed).count();
    let total = results.len();

    ConformanceReport {
        results,
        passed,
        failed: total - passed,
        total,
    }
}

// ── Helpers: record constructors with sensible defaults ──────────────────────

const EPOCH: OffsetDateTime = datetime!(2026-01-01 00:00 UTC);

fn at(minutes: i64) -> OffsetDateTime {
    EPOCH + Duration::minutes(minutes)
}

fn make_user(name: &str) -> UserAccount {
    let mut user = UserAccount::new(name, UserType::Human, EPOCH);
    user.salt_balance = Decimal::from(500);
    user
}

fn make_task(poster: UserId, category: &str, created: i64) -> Task {
    Task {
        id: TaskId::new(),
        poster_id: poster,
        title: format!("task created at +{created}m"),
        description: String::new(),
        category: category.to_string(),
        budget: Budget::Salt(Decimal::from(100)),
        target_type: TargetType::Any,
        status: TaskStatus::Active,
        claimed_by: None,
        claimed_at: None,
        offer_count: 0,
        deadline: None,
        required_tags: Vec::new(),
        created_at: at(created),
        updated_at: at(created),
    }
}

fn make_offer(task: &Task, offerer: UserId, status: OfferStatus) -> Offer {
    Offer {
        id: OfferId::new(),
        task_id: task.id,
        offerer_id: offerer,
        offer_text: "I can do this".to_string(),
        price_salt: None,
        price_usdc: None,
        status,
        parent_offer_id: None,
        decided_by: None,
        decided_at: None,
        created_at: EPOCH,
        updated_at: EPOCH,
    }
}

fn make_submission(task: &Task, submitter: UserId, auto_approve_at: OffsetDateTime) -> Submission {
    Submission {
        id: SubmissionId::new(),
        task_id: task.id,
        submitter_id: submitter,
        content: "done".to_string(),
        attachment_url: None,
        proof_url: None,
        proof_metadata: None,
        status: SubmissionStatus::Pending,
        reviewer_notes: None,
        auto_approve_at: Some(auto_approve_at),
        reviewed_at: None,
        created_at: EPOCH,
    }
}

fn make_transaction(
    task: &Task,
    submission_id: SubmissionId,
    completer: UserId,
) -> SettlementRecord {
    SettlementRecord {
        id: TransactionId::new(),
        task_id: task.id,
        poster_id: task.poster_id,
        completer_id: completer,
        offer_id: None,
        submission_id,
        amount: task.budget,
        created_at: EPOCH,
    }
}

fn make_review(task: &Task, reviewer: UserId, reviewed: UserId, rating: Rating) -> TaskReview {
    TaskReview {
        id: ReviewId::new(),
        task_id: task.id,
        reviewer_id: reviewer,
        reviewed_id: reviewed,
        direction: ReviewDirection::WorkerReviewsPoster,
        rating,
        clarity_rating: None,
        communication_rating: None,
        payment_speed_rating: None,
        would_work_again: true,
        comment: None,
        created_at: EPOCH,
    }
}

// ── Helpers: seed committed rows ─────────────────────────────────────────────

async fn seed_user<S: MarketStorage>(storage: &S, user: &UserAccount) -> Result<(), String> {
    let mut snap = storage
        .begin_snapshot()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    storage
        .insert_user(&mut snap, user.clone())
        .await
        .map_err(|e| format!("insert user: {e}"))?;
    storage
        .commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit user: {e}"))
}

async fn seed_task<S: MarketStorage>(storage: &S, task: &Task) -> Result<(), String> {
    let mut snap = storage
        .begin_snapshot()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    storage
        .insert_task(&mut snap, task.clone())
        .await
        .map_err(|e| format!("insert task: {e}"))?;
    storage
        .commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit task: {e}"))
}

async fn seed_offer<S: MarketStorage>(storage: &S, offer: &Offer) -> Result<(), String> {
    let mut snap = storage
        .begin_snapshot()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    storage
        .insert_offer(&mut snap, offer.clone())
        .await
        .map_err(|e| format!("insert offer: {e}"))?;
    storage
        .commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit offer: {e}"))
}

async fn seed_submission<S: MarketStorage>(
    storage: &S,
    submission: &Submission,
) -> Result<(), String> {
    let mut snap = storage
        .begin_snapshot()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    storage
        .insert_submission(&mut snap, submission.clone())
        .await
        .map_err(|e| format!("insert submission: {e}"))?;
    storage
        .commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit submission: {e}"))
}

fn rating(value: i64) -> Result<Rating, String> {
    Rating::new(value).map_err(|e| e.to_string())
}

fn ensure(cond: bool, msg: impl Into<String>) -> Result<(), String> {
    if cond {
        Ok(())
    } else {
        Err(msg.into())
    }
}
