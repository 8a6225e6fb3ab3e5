//! Lifecycle state machines for tasks, offers, and submissions.
//!
//! Each machine is a status enum plus an event enum. `transition` is the single
//! table deciding which (state, event) pairs are legal; handlers never compare
//! status strings themselves.
//!
//! ```text
//! Task:        active --claim--> claimed --submit--> submitted --complete--> completed
//!                                   ^                    |
//!                                   +----return----------+
//!
//! Offer:       pending_master_approval --master_approve--> pending
//!              pending_master_approval --master_reject---> rejected_by_master
//!              pending --accept--> accepted
//!              pending --reject | supersede--> rejected
//!              pending --counter--> countered
//!
//! Submission:  pending --approve | auto_approve--> approved
//!              pending --reject--> rejected
//!              pending --request_revision--> revision_requested
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

/// An event that is not legal from the machine's current state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{machine} in state '{from}' cannot {event}")]
pub struct TransitionError {
    pub machine: &'static str,
    pub from: &'static str,
    pub event: &'static str,
}

// ──────────────────────────────────────────────
// Task
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Active,
    Claimed,
    Submitted,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskEvent {
    /// An offer was accepted; the offerer becomes the worker.
    Claim,
    /// The worker submitted a deliverable.
    Submit,
    /// A submission was approved, manually or by the sweeper.
    Complete,
    /// A submission was rejected or sent back for revision.
    Return,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Active => "active",
            TaskStatus::Claimed => "claimed",
            TaskStatus::Submitted => "submitted",
            TaskStatus::Completed => "completed",
        }
    }

    /// Parse the wire name of a status.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(TaskStatus::Active),
            "claimed" => Some(TaskStatus::Claimed),
            "submitted" => Some(TaskStatus::Submitted),
            "completed" => Some(TaskStatus::Completed),
            _ => None,
        }
    }

    /// Whether new offers may be placed against a task in this state.
    pub fn accepts_offers(&self) -> bool {
        matches!(self, TaskStatus::Active | TaskStatus::Claimed)
    }

    /// Whether a task in this state has an assigned worker.
    pub fn has_worker(&self) -> bool {
        !matches!(self, TaskStatus::Active)
    }

    pub fn transition(self, event: TaskEvent) -> Result<TaskStatus, TransitionError> {
        use TaskEvent::*;
        use TaskStatus::*;
        match (self, event) {
            (Active, Claim) => Ok(Claimed),
            (Claimed, Submit) => Ok(Submitted),
            (Submitted, Complete) => Ok(Completed),
            (Submitted, Return) => Ok(Claimed),
            (from, event) => Err(TransitionError {
                machine: "task",
                from: from.as_str(),
                event: event.as_str(),
            }),
        }
    }
}

impl TaskEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskEvent::Claim => "be claimed",
            TaskEvent::Submit => "receive a submission",
            TaskEvent::Complete => "be completed",
            TaskEvent::Return => "return to the worker",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ──────────────────────────────────────────────
// Offer
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfferStatus {
    Pending,
    Accepted,
    Rejected,
    Countered,
    /// A bot's suggestion awaiting its master's decision.
    PendingMasterApproval,
    RejectedByMaster,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfferEvent {
    Accept,
    Reject,
    Counter,
    /// Another offer on the same task was accepted.
    Supersede,
    MasterApprove,
    MasterReject,
}

impl OfferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OfferStatus::Pending => "pending",
            OfferStatus::Accepted => "accepted",
            OfferStatus::Rejected => "rejected",
            OfferStatus::Countered => "countered",
            OfferStatus::PendingMasterApproval => "pending_master_approval",
            OfferStatus::RejectedByMaster => "rejected_by_master",
        }
    }

    pub fn transition(self, event: OfferEvent) -> Result<OfferStatus, TransitionError> {
        use OfferEvent::*;
        use OfferStatus::*;
        match (self, event) {
            (Pending, Accept) => Ok(Accepted),
            (Pending, Reject) | (Pending, Supersede) => Ok(Rejected),
            (Pending, Counter) => Ok(Countered),
            (PendingMasterApproval, MasterApprove) => Ok(Pending),
            (PendingMasterApproval, MasterReject) => Ok(RejectedByMaster),
            (from, event) => Err(TransitionError {
                machine: "offer",
                from: from.as_str(),
                event: event.as_str(),
            }),
        }
    }
}

impl OfferEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            OfferEvent::Accept => "be accepted",
            OfferEvent::Reject => "be rejected",
            OfferEvent::Counter => "be countered",
            OfferEvent::Supersede => "be superseded",
            OfferEvent::MasterApprove => "be approved by the master",
            OfferEvent::MasterReject => "be rejected by the master",
        }
    }
}

impl fmt::Display for OfferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ──────────────────────────────────────────────
// Submission
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    Pending,
    Approved,
    Rejected,
    RevisionRequested,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionEvent {
    Approve,
    /// Approval forced by the sweeper after the review deadline.
    AutoApprove,
    Reject,
    RequestRevision,
}

impl SubmissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionStatus::Pending => "pending",
            SubmissionStatus::Approved => "approved",
            SubmissionStatus::Rejected => "rejected",
            SubmissionStatus::RevisionRequested => "revision_requested",
        }
    }

    pub fn transition(self, event: SubmissionEvent) -> Result<SubmissionStatus, TransitionError> {
        use SubmissionEvent::*;
        use SubmissionStatus::*;
        match (self, event) {
            (Pending, Approve) | (Pending, AutoApprove) => Ok(Approved),
            (Pending, Reject) => Ok(Rejected),
            (Pending, RequestRevision) => Ok(RevisionRequested),
            (from, event) => Err(TransitionError {
                machine: "submission",
                from: from.as_str(),
                event: event.as_str(),
            }),
        }
    }
}

impl SubmissionEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionEvent::Approve => "be approved",
            SubmissionEvent::AutoApprove => "be auto-approved",
            SubmissionEvent::Reject => "be rejected",
            SubmissionEvent::RequestRevision => "be sent back for revision",
        }
    }

    /// The task event driven by this submission event.
    pub fn task_event(&self) -> TaskEvent {
        match self {
            SubmissionEvent::Approve | SubmissionEvent::AutoApprove => TaskEvent::Complete,
            SubmissionEvent::Reject | SubmissionEvent::RequestRevision => TaskEvent::Return,
        }
    }
}

impl fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TASK_STATES: [TaskStatus; 4] = [
        TaskStatus::Active,
        TaskStatus::Claimed,
        TaskStatus::Submitted,
        TaskStatus::Completed,
    ];
    const TASK_EVENTS: [TaskEvent; 4] = [
        TaskEvent::Claim,
        TaskEvent::Submit,
        TaskEvent::Complete,
        TaskEvent::Return,
    ];

    #[test]
    fn task_table_has_exactly_four_legal_edges() {
        let legal: Vec<_> = TASK_STATES
            .iter()
            .flat_map(|s| TASK_EVENTS.iter().map(move |e| (*s, *e)))
            .filter_map(|(s, e)| s.transition(e).ok().map(|to| (s, e, to)))
            .collect();
        assert_eq!(
            legal,
            vec![
                (TaskStatus::Active, TaskEvent::Claim, TaskStatus::Claimed),
                (TaskStatus::Claimed, TaskEvent::Submit, TaskStatus::Submitted),
                (TaskStatus::Submitted, TaskEvent::Complete, TaskStatus::Completed),
                (TaskStatus::Submitted, TaskEvent::Return, TaskStatus::Claimed),
            ]
        );
    }

    #[test]
    fn completed_task_is_terminal() {
        for e in TASK_EVENTS {
            assert!(TaskStatus::Completed.transition(e).is_err());
        }
    }

    #[test]
    fn only_active_and_claimed_tasks_accept_offers() {
        assert!(TaskStatus::Active.accepts_offers());
        assert!(TaskStatus::Claimed.accepts_offers());
        assert!(!TaskStatus::Submitted.accepts_offers());
        assert!(!TaskStatus::Completed.accepts_offers());
    }

    #[test]
    fn offer_responses_require_pending() {
        for status in [
            OfferStatus::Accepted,
            OfferStatus::Rejected,
            OfferStatus::Countered,
            OfferStatus::RejectedByMaster,
        ] {
            assert!(status.transition(OfferEvent::Accept).is_err());
            assert!(status.transition(OfferEvent::Reject).is_err());
            assert!(status.transition(OfferEvent::Counter).is_err());
        }
        assert_eq!(
            OfferStatus::Pending.transition(OfferEvent::Supersede),
            Ok(OfferStatus::Rejected)
        );
    }

    #[test]
    fn suggestions_only_move_through_master_decision() {
        let s = OfferStatus::PendingMasterApproval;
        assert!(s.transition(OfferEvent::Accept).is_err());
        assert_eq!(s.transition(OfferEvent::MasterApprove), Ok(OfferStatus::Pending));
        assert_eq!(
            s.transition(OfferEvent::MasterReject),
            Ok(OfferStatus::RejectedByMaster)
        );
        assert!(OfferStatus::Pending
            .transition(OfferEvent::MasterApprove)
            .is_err());
    }

    #[test]
    fn reviewed_submission_cannot_be_reviewed_again() {
        let err = SubmissionStatus::Approved
            .transition(SubmissionEvent::AutoApprove)
            .unwrap_err();
        assert_eq!(err.machine, "submission");
        assert_eq!(err.from, "approved");
        assert_eq!(
            err.to_string(),
            "submission in state 'approved' cannot be auto-approved"
        );
    }

    #[test]
    fn submission_events_drive_task_events() {
        assert_eq!(SubmissionEvent::AutoApprove.task_event(), TaskEvent::Complete);
        assert_eq!(SubmissionEvent::RequestRevision.task_event(), TaskEvent::Return);
    }

    #[test]
    fn status_wire_names_are_snake_case() {
        assert_eq!(
            serde_json::to_value(OfferStatus::PendingMasterApproval).unwrap(),
            "pending_master_approval"
        );
        assert_eq!(
            serde_json::to_value(SubmissionStatus::RevisionRequested).unwrap(),
            "revision_requested"
        );
        assert_eq!(TaskStatus::parse("submitted"), Some(TaskStatus::Submitted));
        assert_eq!(TaskStatus::parse("all"), None);
    }
}
