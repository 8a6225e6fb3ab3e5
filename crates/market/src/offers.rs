//! Offers against a task and the poster's response to them.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use suitedbot_core::{Offer, OfferEvent, OfferId, OfferStatus, TaskId, TaskStatus, UserId};
use suitedbot_storage::MarketStorage;
use tracing::info;

use crate::{Clock, MarketError, Marketplace, Result};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewOffer {
    pub offer_text: Option<String>,
    #[serde(default)]
    pub price_salt: Option<Decimal>,
    #[serde(default)]
    pub price_usdc: Option<Decimal>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OfferAction {
    Accept,
    Reject,
    Counter,
}

impl OfferAction {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "accept" => Some(OfferAction::Accept),
            "reject" => Some(OfferAction::Reject),
            "counter" => Some(OfferAction::Counter),
            _ => None,
        }
    }
}

/// Body of a response to an offer.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OfferResponse {
    pub action: Option<String>,
    #[serde(default)]
    pub counter_text: Option<String>,
    #[serde(default)]
    pub counter_price_salt: Option<Decimal>,
    #[serde(default)]
    pub counter_price_usdc: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OfferResponseOutcome {
    pub action: OfferAction,
    /// The offer that was responded to, after the response.
    pub offer: Offer,
    /// Offers rejected because another offer was accepted.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub superseded: Vec<OfferId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counter_offer: Option<Offer>,
}

impl<S: MarketStorage, C: Clock> Marketplace<S, C> {
    /// Place an offer on a task that is still accepting offers.
    pub async fn create_offer(
        &self,
        task_id: TaskId,
        offerer_id: UserId,
        input: NewOffer,
    ) -> Result<Offer> {
        let offer_text = input
            .offer_text
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| MarketError::validation("Offer text is required"))?;

        let now = self.now();
        let offer = Offer {
            id: OfferId::new(),
            task_id,
            offerer_id,
            offer_text,
            price_salt: input.price_salt,
            price_usdc: input.price_usdc,
            status: OfferStatus::Pending,
            parent_offer_id: None,
            decided_by: None,
            decided_at: None,
            created_at: now,
            updated_at: now,
        };

        let mut snap = self.storage.begin_snapshot().await?;
        let result = self.place_offer_in(&mut snap, &offer).await;
        self.finish(snap, result).await?;

        info!(offer_id = %offer.id, task_id = %task_id, offerer_id = %offerer_id, "offer created");
        Ok(offer)
    }

    async fn place_offer_in(&self, snap: &mut S::Snapshot, offer: &Offer) -> Result<()> {
        let mut task = self
            .storage
            .get_task_for_update(snap, offer.task_id)
            .await
            .map_err(|_| MarketError::not_found("Task not found"))?;
        if !task.record.status.accepts_offers() {
            return Err(MarketError::invalid_state("Task is not accepting offers"));
        }
        if task.record.poster_id == offer.offerer_id {
            return Err(MarketError::forbidden("Cannot offer on your own task"));
        }
        self.storage
            .get_user_for_update(snap, offer.offerer_id)
            .await
            .map_err(|_| MarketError::not_found("User profile not found"))?;

        self.storage.insert_offer(snap, offer.clone()).await?;
        task.record.offer_count += 1;
        task.record.updated_at = offer.created_at;
        self.storage
            .update_task(snap, task.record, task.version)
            .await?;
        Ok(())
    }

    /// Accept, reject, or counter a pending offer.
    ///
    /// The task poster responds to offers made to them. A counter-offer is
    /// answered by the author of the offer it counters, and accepting one
    /// assigns the task to the non-poster side.
    pub async fn respond_to_offer(
        &self,
        offer_id: OfferId,
        caller: UserId,
        response: OfferResponse,
    ) -> Result<OfferResponseOutcome> {
        let action = response
            .action
            .as_deref()
            .and_then(OfferAction::parse)
            .ok_or_else(|| {
                MarketError::validation("Invalid action. Must be 'accept', 'reject', or 'counter'")
            })?;

        let mut snap = self.storage.begin_snapshot().await?;
        let result = self
            .respond_in(&mut snap, offer_id, caller, action, response)
            .await;
        let outcome = self.finish(snap, result).await?;

        info!(
            offer_id = %offer_id,
            task_id = %outcome.offer.task_id,
            action = ?action,
            superseded = outcome.superseded.len(),
            "offer responded"
        );
        Ok(outcome)
    }

    async fn respond_in(
        &self,
        snap: &mut S::Snapshot,
        offer_id: OfferId,
        caller: UserId,
        action: OfferAction,
        response: OfferResponse,
    ) -> Result<OfferResponseOutcome> {
        let now = self.now();
        let mut offer = self
            .storage
            .get_offer_for_update(snap, offer_id)
            .await
            .map_err(|_| MarketError::not_found("Offer not found"))?;
        let mut task = self
            .storage
            .get_task_for_update(snap, offer.record.task_id)
            .await
            .map_err(|_| MarketError::not_found("Task not found"))?;

        // The party the offer was made to. For a counter, that is whoever
        // wrote the offer it counters.
        let responder = match offer.record.parent_offer_id {
            Some(parent_id) => {
                self.storage
                    .get_offer_for_update(snap, parent_id)
                    .await?
                    .record
                    .offerer_id
            }
            None => task.record.poster_id,
        };
        // The non-poster side of the negotiation works the task on accept.
        let worker = if offer.record.offerer_id == task.record.poster_id {
            responder
        } else {
            offer.record.offerer_id
        };
        if caller != responder {
            return Err(MarketError::forbidden("Only task poster can respond to offers"));
        }
        if offer.record.status != OfferStatus::Pending {
            return Err(MarketError::invalid_state(
                "Offer has already been responded to",
            ));
        }

        let mut superseded = Vec::new();
        let mut counter_offer = None;
        match action {
            OfferAction::Accept => {
                if task.record.status != TaskStatus::Active {
                    return Err(MarketError::conflict("Task already claimed"));
                }
                offer.record.apply(OfferEvent::Accept, now)?;
                task.record.claim(worker, now)?;

                let others = self
                    .storage
                    .list_task_offers_for_update(snap, task.record.id)
                    .await?;
                for mut other in others {
                    if other.record.id == offer_id || other.record.status != OfferStatus::Pending
                    {
                        continue;
                    }
                    other.record.apply(OfferEvent::Supersede, now)?;
                    superseded.push(other.record.id);
                    self.storage
                        .update_offer(snap, other.record, other.version)
                        .await?;
                }
                self.storage
                    .update_task(snap, task.record, task.version)
                    .await?;
            }
            OfferAction::Reject => {
                offer.record.apply(OfferEvent::Reject, now)?;
            }
            OfferAction::Counter => {
                let text = response
                    .counter_text
                    .filter(|t| !t.trim().is_empty())
                    .ok_or_else(|| MarketError::validation("Counter offer text is required"))?;
                offer.record.apply(OfferEvent::Counter, now)?;
                let counter = Offer {
                    id: OfferId::new(),
                    task_id: task.record.id,
                    offerer_id: caller,
                    offer_text: text,
                    price_salt: response.counter_price_salt,
                    price_usdc: response.counter_price_usdc,
                    status: OfferStatus::Pending,
                    parent_offer_id: Some(offer_id),
                    decided_by: None,
                    decided_at: None,
                    created_at: now,
                    updated_at: now,
                };
                self.storage.insert_offer(snap, counter.clone()).await?;
                counter_offer = Some(counter);
            }
        }

        self.storage
            .update_offer(snap, offer.record.clone(), offer.version)
            .await?;
        Ok(OfferResponseOutcome {
            action,
            offer: offer.record,
            superseded,
            counter_offer,
        })
    }
}
