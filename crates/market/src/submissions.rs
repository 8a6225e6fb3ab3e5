//! Work submissions and the poster's review of them.

use serde::{Deserialize, Serialize};
use suitedbot_core::{
    ProofMetadata, SettlementRecord, Submission, SubmissionEvent, SubmissionId, SubmissionStatus,
    Task, TaskId, UserId,
};
use suitedbot_storage::MarketStorage;
use time::OffsetDateTime;
use tracing::info;

use crate::{Clock, MarketError, Marketplace, Result};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewSubmission {
    pub content: Option<String>,
    #[serde(default)]
    pub attachment_url: Option<String>,
    #[serde(default)]
    pub proof_url: Option<String>,
    #[serde(default)]
    pub proof_metadata: Option<ProofMetadata>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewAction {
    Approve,
    Reject,
    Revision,
}

impl ReviewAction {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "approve" => Some(ReviewAction::Approve),
            "reject" => Some(ReviewAction::Reject),
            "revision" => Some(ReviewAction::Revision),
            _ => None,
        }
    }

    fn event(self) -> SubmissionEvent {
        match self {
            ReviewAction::Approve => SubmissionEvent::Approve,
            ReviewAction::Reject => SubmissionEvent::Reject,
            ReviewAction::Revision => SubmissionEvent::RequestRevision,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReviewOutcome {
    pub action: ReviewAction,
    pub submission: Submission,
    pub task: Task,
    /// Present when the review approved the submission.
    pub transaction: Option<SettlementRecord>,
}

impl ReviewOutcome {
    /// After an approval the poster may rate the worker.
    pub fn can_review_worker(&self) -> bool {
        self.action == ReviewAction::Approve
    }
}

/// Time left before the sweeper approves a pending submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AutoApproveCountdown {
    #[serde(with = "time::serde::rfc3339")]
    pub auto_approve_at: OffsetDateTime,
    pub hours_remaining: i64,
    pub minutes_remaining: i64,
    pub deadline_passed: bool,
    pub message: String,
}

impl AutoApproveCountdown {
    pub fn compute(auto_approve_at: OffsetDateTime, now: OffsetDateTime) -> Self {
        let left = auto_approve_at - now;
        if left.is_positive() {
            let hours = left.whole_hours();
            let minutes = left.whole_minutes() % 60;
            Self {
                auto_approve_at,
                hours_remaining: hours,
                minutes_remaining: minutes,
                deadline_passed: false,
                message: format!("Auto-approves in {hours}h {minutes}m if not reviewed"),
            }
        } else {
            Self {
                auto_approve_at,
                hours_remaining: 0,
                minutes_remaining: 0,
                deadline_passed: true,
                message: "Review deadline passed; auto-approval is due on the next sweep"
                    .to_string(),
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmissionForReview {
    pub submission: Submission,
    pub task: Task,
    /// Set only while the submission is pending.
    pub countdown: Option<AutoApproveCountdown>,
}

impl<S: MarketStorage, C: Clock> Marketplace<S, C> {
    /// Submit work on a claimed task and start the auto-approval countdown.
    pub async fn submit_work(
        &self,
        task_id: TaskId,
        submitter_id: UserId,
        input: NewSubmission,
    ) -> Result<Submission> {
        let content = input
            .content
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| MarketError::validation("Submission content is required"))?;

        let now = self.now();
        let submission = Submission {
            id: SubmissionId::new(),
            task_id,
            submitter_id,
            content,
            attachment_url: input.attachment_url,
            proof_url: input.proof_url,
            proof_metadata: input.proof_metadata.map(|m| ProofMetadata {
                uploaded_at: Some(now),
                ..m
            }),
            status: SubmissionStatus::Pending,
            reviewer_notes: None,
            auto_approve_at: Some(now + self.config.auto_approve_after),
            reviewed_at: None,
            created_at: now,
        };

        let mut snap = self.storage.begin_snapshot().await?;
        let result = self.submit_in(&mut snap, &submission, now).await;
        self.finish(snap, result).await?;

        info!(
            submission_id = %submission.id,
            task_id = %task_id,
            auto_approve_hours = self.config.auto_approve_hours(),
            "work submitted"
        );
        Ok(submission)
    }

    async fn submit_in(
        &self,
        snap: &mut S::Snapshot,
        submission: &Submission,
        now: OffsetDateTime,
    ) -> Result<()> {
        let mut task = self
            .storage
            .get_task_for_update(snap, submission.task_id)
            .await
            .map_err(|_| MarketError::not_found("Task not found"))?;
        if task.record.claimed_by != Some(submission.submitter_id) {
            return Err(MarketError::forbidden("Only the assigned user can submit work"));
        }
        task.record.record_submission(now)?;

        self.storage.insert_submission(snap, submission.clone()).await?;
        self.storage
            .update_task(snap, task.record, task.version)
            .await?;
        Ok(())
    }

    /// Approve, reject, or send back a pending submission. Approval
    /// completes the task and settles it in the same snapshot.
    pub async fn review_submission(
        &self,
        submission_id: SubmissionId,
        reviewer: UserId,
        action: ReviewAction,
        notes: Option<String>,
    ) -> Result<ReviewOutcome> {
        let mut snap = self.storage.begin_snapshot().await?;
        let result = self
            .review_in(&mut snap, submission_id, reviewer, action, notes)
            .await;
        let outcome = self.finish(snap, result).await?;

        info!(
            submission_id = %submission_id,
            task_id = %outcome.task.id,
            action = ?action,
            task_status = %outcome.task.status,
            "submission reviewed"
        );
        Ok(outcome)
    }

    async fn review_in(
        &self,
        snap: &mut S::Snapshot,
        submission_id: SubmissionId,
        reviewer: UserId,
        action: ReviewAction,
        notes: Option<String>,
    ) -> Result<ReviewOutcome> {
        let now = self.now();
        let mut submission = self
            .storage
            .get_submission_for_update(snap, submission_id)
            .await
            .map_err(|_| MarketError::not_found("Submission not found"))?;
        let mut task = self
            .storage
            .get_task_for_update(snap, submission.record.task_id)
            .await?;
        if task.record.poster_id != reviewer {
            return Err(MarketError::forbidden(
                "Only task poster can review submissions",
            ));
        }
        if submission.record.status != SubmissionStatus::Pending {
            return Err(MarketError::invalid_state(
                "Submission has already been reviewed",
            ));
        }

        let event = action.event();
        submission
            .record
            .review(event, notes.filter(|n| !n.is_empty()), now)?;
        task.record.apply_review(event, now)?;

        self.storage
            .update_submission(snap, submission.record.clone(), submission.version)
            .await?;
        self.storage
            .update_task(snap, task.record.clone(), task.version)
            .await?;

        let transaction = match action {
            ReviewAction::Approve => Some(
                self.settle_in(snap, &task.record, &submission.record, now)
                    .await?,
            ),
            ReviewAction::Reject | ReviewAction::Revision => None,
        };

        Ok(ReviewOutcome {
            action,
            submission: submission.record,
            task: task.record,
            transaction,
        })
    }

    /// A submission with its proof and the auto-approval countdown.
    /// Visible to the task poster and the submitter only.
    pub async fn get_submission_for_review(
        &self,
        submission_id: SubmissionId,
        viewer: UserId,
    ) -> Result<SubmissionForReview> {
        let submission = self
            .storage
            .get_submission(submission_id)
            .await
            .map_err(|_| MarketError::not_found("Submission not found"))?;
        let task = self.storage.get_task(submission.task_id).await?;
        if viewer != task.poster_id && viewer != submission.submitter_id {
            return Err(MarketError::forbidden(
                "Only the task poster or the submitter can view this submission",
            ));
        }

        let countdown = match (submission.status, submission.auto_approve_at) {
            (SubmissionStatus::Pending, Some(at)) => {
                Some(AutoApproveCountdown::compute(at, self.now()))
            }
            _ => None,
        };
        Ok(SubmissionForReview {
            submission,
            task,
            countdown,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;
    use time::Duration;

    #[test]
    fn countdown_reports_hours_and_minutes() {
        let deadline = datetime!(2026-06-03 12:00 UTC);
        let now = deadline - Duration::minutes(5 * 60 + 30) - Duration::seconds(20);
        let c = AutoApproveCountdown::compute(deadline, now);
        assert!(!c.deadline_passed);
        assert_eq!((c.hours_remaining, c.minutes_remaining), (5, 30));
        assert_eq!(c.message, "Auto-approves in 5h 30m if not reviewed");
    }

    #[test]
    fn countdown_at_or_after_deadline_has_passed() {
        let deadline = datetime!(2026-06-03 12:00 UTC);
        for now in [deadline, deadline + Duration::hours(3)] {
            let c = AutoApproveCountdown::compute(deadline, now);
            assert!(c.deadline_passed);
            assert_eq!((c.hours_remaining, c.minutes_remaining), (0, 0));
        }
    }

    #[test]
    fn action_names() {
        assert_eq!(ReviewAction::parse("revision"), Some(ReviewAction::Revision));
        assert_eq!(ReviewAction::parse("approved"), None);
        assert_eq!(
            ReviewAction::Revision.event(),
            SubmissionEvent::RequestRevision
        );
    }
}
