//! Settlement: the transaction record and escrow release for an approved
//! submission.
//!
//! Settlement never opens its own snapshot. It runs inside the snapshot of
//! the approval that triggered it, whether that approval came from the
//! poster or from the sweeper.

use suitedbot_core::{Budget, OfferStatus, SettlementRecord, Submission, Task, TransactionId};
use suitedbot_storage::MarketStorage;
use time::OffsetDateTime;
use tracing::debug;

use crate::{Clock, MarketError, Marketplace, Result};

impl<S: MarketStorage, C: Clock> Marketplace<S, C> {
    /// Record the payment for `task` and credit the worker.
    ///
    /// The store admits one transaction per task, so a second settlement of
    /// the same task fails with `Conflict` and the whole snapshot is discarded.
    /// Salt budgets were escrowed at task creation and are released to the
    /// worker here together with the completion counters. USDC moves on an
    /// external rail and only the record is written.
    pub(crate) async fn settle_in(
        &self,
        snap: &mut S::Snapshot,
        task: &Task,
        submission: &Submission,
        now: OffsetDateTime,
    ) -> Result<SettlementRecord> {
        let completer_id = task
            .claimed_by
            .ok_or_else(|| MarketError::invalid_state("Task has no worker to pay"))?;

        let accepted_offer = self
            .storage
            .list_task_offers_for_update(snap, task.id)
            .await?
            .into_iter()
            .find(|o| o.record.status == OfferStatus::Accepted)
            .map(|o| o.record.id);

        let record = SettlementRecord {
            id: TransactionId::new(),
            task_id: task.id,
            poster_id: task.poster_id,
            completer_id,
            offer_id: accepted_offer,
            submission_id: submission.id,
            amount: task.budget,
            created_at: now,
        };
        self.storage.insert_transaction(snap, record.clone()).await?;

        if let Budget::Salt(amount) = task.budget {
            let mut completer = self
                .storage
                .get_user_for_update(snap, completer_id)
                .await?;
            completer.record.salt_balance = completer
                .record
                .salt_balance
                .checked_add(amount)
                .ok_or_else(|| MarketError::conflict("Worker salt balance would overflow"))?;
            completer.record.tasks_completed = completer.record.tasks_completed.saturating_add(1);
            completer.record.reputation = completer
                .record
                .reputation
                .saturating_add(self.config.completion_reputation_award);
            self.storage
                .update_user(snap, completer.record, completer.version)
                .await?;
        }

        debug!(
            transaction_id = %record.id,
            task_id = %task.id,
            completer_id = %completer_id,
            amount = %record.amount,
            "settlement staged"
        );
        Ok(record)
    }
}
