//! suitedbot-core: domain model for the SuitedBot task marketplace.
//!
//! Holds the record types persisted by a storage backend and the explicit
//! finite-state machines that govern tasks, offers, and submissions. Nothing
//! in this crate performs I/O.
//!
//! # Public API
//!
//! - Identifiers: [`UserId`], [`TaskId`], [`OfferId`], [`SubmissionId`],
//!   [`TransactionId`], [`ReviewId`]
//! - Money: [`Currency`], [`Budget`]
//! - Records: [`UserAccount`], [`Task`], [`Offer`], [`Submission`],
//!   [`SettlementRecord`], [`TaskReview`]
//! - Lifecycle: [`TaskStatus`], [`OfferStatus`], [`SubmissionStatus`] and their
//!   event enums, with [`TransitionError`] for illegal transitions

pub mod ids;
pub mod lifecycle;
pub mod model;
pub mod money;

pub use ids::{OfferId, ReviewId, SubmissionId, TaskId, TransactionId, UserId};
pub use lifecycle::{
    OfferEvent, OfferStatus, SubmissionEvent, SubmissionStatus, TaskEvent, TaskStatus,
    TransitionError,
};
pub use model::{
    running_mean, Offer, ProofMetadata, Rating, RatingError, ReviewDirection, SettlementRecord,
    Submission, TargetType, Task, TaskReview, UserAccount, UserType,
};
pub use money::{Budget, BudgetError, Currency, MAX_AMOUNT};
