//! suitedbot-market: the task lifecycle services.
//!
//! [`Marketplace`] owns a storage handle, a clock, and the tunables, and exposes
//! one async method per lifecycle operation. Each operation that changes state
//! runs inside a single storage snapshot, so a submission approval, task
//! completion, settlement record, and balance credit land together or not at all.
//!
//! # Modules
//!
//! - [`tasks`]: task creation with escrow, listings, detail view
//! - [`offers`]: offers, accept/reject/counter
//! - [`bots`]: task scans for bots, suggestions gated by the bot's master,
//!   auto-accept offers
//! - [`submissions`]: work submission and poster review
//! - [`settlement`]: transaction record and escrow release
//! - [`sweeper`]: auto-approval of submissions past their deadline
//! - [`reviews`]: worker/poster ratings and poster review statistics

pub mod bots;
pub mod clock;
pub mod config;
pub mod error;
pub mod offers;
pub mod reviews;
pub mod settlement;
pub mod submissions;
pub mod sweeper;
pub mod tasks;
pub mod users;

use std::sync::Arc;

use suitedbot_storage::MarketStorage;
use time::OffsetDateTime;

pub use bots::{
    match_score, AutoAcceptInput, Recommendation, ScanQuery, ScannedTask, SuggestionInput,
    SuggestionView,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{MarketConfig, COMPLETION_REPUTATION_AWARD, DEFAULT_AUTO_APPROVE_HOURS};
pub use error::MarketError;
pub use offers::{NewOffer, OfferAction, OfferResponse, OfferResponseOutcome};
pub use reviews::{
    would_work_again_percent, Pagination, PosterProfile, PosterReviewStats, PosterReviewsPage,
    ReviewInput,
};
pub use submissions::{
    AutoApproveCountdown, NewSubmission, ReviewAction, ReviewOutcome, SubmissionForReview,
};
pub use sweeper::{SweepFailure, SweepReport, AUTO_APPROVE_NOTE};
pub use tasks::{NewTask, TaskDetail, TaskQuery, TaskSummary};

pub type Result<T> = std::result::Result<T, MarketError>;

/// The marketplace service, generic over its store and clock.
pub struct Marketplace<S, C = SystemClock> {
    storage: Arc<S>,
    clock: C,
    config: MarketConfig,
}

impl<S: MarketStorage, C: Clock> Marketplace<S, C> {
    pub fn new(storage: Arc<S>, clock: C, config: MarketConfig) -> Self {
        Self {
            storage,
            clock,
            config,
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn config(&self) -> &MarketConfig {
        &self.config
    }

    pub fn now(&self) -> OffsetDateTime {
        self.clock.now()
    }

    /// Commit `snapshot` if `result` is `Ok`, abort it otherwise.
    async fn finish<T>(&self, snapshot: S::Snapshot, result: Result<T>) -> Result<T> {
        match result {
            Ok(value) => {
                self.storage.commit_snapshot(snapshot).await?;
                Ok(value)
            }
            Err(e) => {
                let _ = self.storage.abort_snapshot(snapshot).await;
                Err(e)
            }
        }
    }
}
