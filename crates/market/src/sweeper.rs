//! Auto-approval sweeper.
//!
//! Finds pending submissions whose review deadline has elapsed and approves
//! each one as if the poster had, settling the task in the same snapshot.
//! Items are processed one at a time in their own snapshot; a failure is
//! recorded against that submission and the sweep moves on.
//!
//! A manual review racing the sweeper on the same submission is resolved by
//! the submission's row version: whichever snapshot commits second fails with
//! a conflict and leaves no trace.

use serde::Serialize;
use suitedbot_core::{SubmissionEvent, SubmissionId};
use suitedbot_storage::MarketStorage;
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::{Clock, MarketError, Marketplace, Result};

/// Reviewer note written on every auto-approved submission.
pub const AUTO_APPROVE_NOTE: &str = "Auto-approved: poster did not review within deadline";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SweepFailure {
    pub submission_id: SubmissionId,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Submissions found past their deadline.
    pub processed: usize,
    pub approved: usize,
    pub errors: Vec<SweepFailure>,
}

impl SweepReport {
    pub fn message(&self) -> String {
        format!(
            "Auto-approved {}/{} submissions",
            self.approved, self.processed
        )
    }
}

impl<S: MarketStorage, C: Clock> Marketplace<S, C> {
    /// Run one sweep at the current time.
    ///
    /// Only the initial query can fail the sweep as a whole.
    pub async fn sweep(&self) -> Result<SweepReport> {
        let now = self.now();
        let due = self.storage.list_due_submissions(now).await?;
        let mut report = SweepReport {
            processed: due.len(),
            ..SweepReport::default()
        };

        for submission in due {
            match self.auto_approve(submission.id, now).await {
                Ok(()) => report.approved += 1,
                Err(e) => {
                    warn!(submission_id = %submission.id, error = %e, "auto-approval failed");
                    report.errors.push(SweepFailure {
                        submission_id: submission.id,
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            processed = report.processed,
            approved = report.approved,
            failed = report.errors.len(),
            "sweep finished"
        );
        Ok(report)
    }

    async fn auto_approve(&self, submission_id: SubmissionId, now: OffsetDateTime) -> Result<()> {
        let mut snap = self.storage.begin_snapshot().await?;
        let result = self.auto_approve_in(&mut snap, submission_id, now).await;
        self.finish(snap, result).await?;
        info!(submission_id = %submission_id, "submission auto-approved");
        Ok(())
    }

    async fn auto_approve_in(
        &self,
        snap: &mut S::Snapshot,
        submission_id: SubmissionId,
        now: OffsetDateTime,
    ) -> Result<()> {
        // Re-read inside the snapshot: the listing may be stale.
        let mut submission = self
            .storage
            .get_submission_for_update(snap, submission_id)
            .await?;
        if !submission.record.is_due(now) {
            return Err(MarketError::invalid_state(format!(
                "Submission is no longer awaiting auto-approval (status {})",
                submission.record.status
            )));
        }
        let mut task = self
            .storage
            .get_task_for_update(snap, submission.record.task_id)
            .await?;

        submission.record.review(
            SubmissionEvent::AutoApprove,
            Some(AUTO_APPROVE_NOTE.to_string()),
            now,
        )?;
        task.record.apply_review(SubmissionEvent::AutoApprove, now)?;

        self.storage
            .update_submission(snap, submission.record.clone(), submission.version)
            .await?;
        self.storage
            .update_task(snap, task.record.clone(), task.version)
            .await?;
        self.settle_in(snap, &task.record, &submission.record, now)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_message() {
        let report = SweepReport {
            processed: 3,
            approved: 2,
            errors: vec![SweepFailure {
                submission_id: SubmissionId::new(),
                error: "boom".into(),
            }],
        };
        assert_eq!(report.message(), "Auto-approved 2/3 submissions");
    }
}
