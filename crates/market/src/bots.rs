//! Bot delegation.
//!
//! A bot acts under its master's account. It scans open tasks, then either
//! suggests an offer, which waits for the master's decision before the
//! poster sees it, or places a regular offer directly on an open task.

use std::collections::HashMap;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use suitedbot_core::{
    Budget, Offer, OfferEvent, OfferId, OfferStatus, TargetType, Task, TaskId, TaskStatus,
    UserAccount, UserId, UserType,
};
use suitedbot_storage::{MarketStorage, StorageError, TaskFilter, Versioned};
use tracing::{debug, info};

use crate::{Clock, MarketError, Marketplace, Result};

const AUTO_ACCEPT_TEXT: &str = "I can complete this task for you.";

const SCAN_DEFAULT_LIMIT: usize = 20;
const SCAN_MAX_LIMIT: usize = 50;
/// Categories a bot is assumed to handle well.
const PREFERRED_CATEGORIES: [&str; 3] = ["code", "data", "research"];
/// Descriptions longer than this many characters earn a clarity bonus.
const DETAILED_DESCRIPTION_CHARS: usize = 100;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SuggestionInput {
    #[serde(default)]
    pub reasoning: Option<String>,
    #[serde(default)]
    pub price_salt: Option<Decimal>,
    #[serde(default)]
    pub price_usdc: Option<Decimal>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AutoAcceptInput {
    #[serde(default)]
    pub offer_text: Option<String>,
    #[serde(default)]
    pub price_salt: Option<Decimal>,
    #[serde(default)]
    pub price_usdc: Option<Decimal>,
}

/// A pending suggestion as shown to the bot's master.
#[derive(Debug, Clone, Serialize)]
pub struct SuggestionView {
    #[serde(flatten)]
    pub offer: Offer,
    pub bot_display_name: String,
    pub task_title: String,
}

/// Query-string filters for a task scan.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScanQuery {
    /// Defaults to `bot`; `all` disables the filter. Tasks open to `any`
    /// worker always match.
    pub target_type: Option<String>,
    pub limit: Option<u32>,
}

/// How attractive a task's budget is, with salt valued at a tenth of USDC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Recommendation {
    HighValue,
    MediumValue,
    LowValue,
}

impl Recommendation {
    pub fn for_task(task: &Task) -> Self {
        let value = comparable_value(&task.budget);
        if value >= Decimal::from(50) {
            Recommendation::HighValue
        } else if value >= Decimal::from(20) {
            Recommendation::MediumValue
        } else {
            Recommendation::LowValue
        }
    }
}

/// A task a bot could take, ranked for it.
#[derive(Debug, Clone, Serialize)]
pub struct ScannedTask {
    #[serde(flatten)]
    pub task: Task,
    /// `50..=100`.
    pub match_score: u32,
    pub recommendation: Recommendation,
}

fn comparable_value(budget: &Budget) -> Decimal {
    match budget {
        Budget::Usdc(amount) => *amount,
        Budget::Salt(amount) => *amount / Decimal::TEN,
    }
}

/// Base 50, plus a budget bonus (USDC up to 50, salt/10 up to 30), 10 for a
/// detailed description and 15 for a preferred category. Capped at 100.
pub fn match_score(task: &Task) -> u32 {
    let budget_bonus = match task.budget {
        Budget::Usdc(amount) => amount.min(Decimal::from(50)),
        Budget::Salt(amount) => (amount / Decimal::TEN).min(Decimal::from(30)),
    };
    let mut score = Decimal::from(50) + budget_bonus;
    if task.description.chars().count() > DETAILED_DESCRIPTION_CHARS {
        score += Decimal::TEN;
    }
    if PREFERRED_CATEGORIES.contains(&task.category.as_str()) {
        score += Decimal::from(15);
    }
    score
        .min(Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_u32()
        .unwrap_or(100)
}

impl<S: MarketStorage, C: Clock> Marketplace<S, C> {
    /// Active, unclaimed tasks `bot_id` did not post, newest first, each
    /// with its match score.
    pub async fn scan_tasks(&self, bot_id: UserId, query: &ScanQuery) -> Result<Vec<ScannedTask>> {
        let bot = self
            .storage
            .get_user(bot_id)
            .await
            .map_err(|_| MarketError::not_found("Bot user not found"))?;
        if bot.user_type != UserType::Bot {
            return Err(MarketError::forbidden("Only bot accounts can do this"));
        }
        let wanted = match query.target_type.as_deref().unwrap_or("bot") {
            "all" => None,
            t => Some(
                TargetType::parse(t)
                    .ok_or_else(|| MarketError::validation(format!("Unknown target type '{t}'")))?,
            ),
        };
        let limit = query.limit.map_or(SCAN_DEFAULT_LIMIT, |l| {
            usize::try_from(l).unwrap_or(SCAN_MAX_LIMIT).clamp(1, SCAN_MAX_LIMIT)
        });

        let filter = TaskFilter {
            status: Some(TaskStatus::Active),
            ..TaskFilter::default()
        };
        let scanned: Vec<ScannedTask> = self
            .storage
            .list_tasks(&filter)
            .await?
            .into_iter()
            .filter(|task| task.claimed_by.is_none() && task.poster_id != bot_id)
            .filter(|task| {
                wanted.map_or(true, |t| {
                    task.target_type == t || task.target_type == TargetType::Any
                })
            })
            .take(limit)
            .map(|task| ScannedTask {
                match_score: match_score(&task),
                recommendation: Recommendation::for_task(&task),
                task,
            })
            .collect();
        debug!(bot_id = %bot_id, found = scanned.len(), "task scan");
        Ok(scanned)
    }

    /// Propose an offer on `task_id` to the bot's master. Nothing reaches the
    /// poster until the master approves.
    pub async fn suggest_offer(
        &self,
        bot_id: UserId,
        task_id: TaskId,
        input: SuggestionInput,
    ) -> Result<Offer> {
        let mut snap = self.storage.begin_snapshot().await?;
        let result = self.suggest_in(&mut snap, bot_id, task_id, input).await;
        let offer = self.finish(snap, result).await?;
        info!(offer_id = %offer.id, task_id = %task_id, bot_id = %bot_id, "bot suggestion created");
        Ok(offer)
    }

    async fn suggest_in(
        &self,
        snap: &mut S::Snapshot,
        bot_id: UserId,
        task_id: TaskId,
        input: SuggestionInput,
    ) -> Result<Offer> {
        let bot = self.load_bot(snap, bot_id).await?;
        if bot.record.master_id.is_none() {
            return Err(MarketError::invalid_state(
                "Bot has no master to approve suggestions",
            ));
        }
        let task = self.load_open_task(snap, task_id, bot_id).await?;

        let now = self.now();
        let offer_text = input.reasoning.filter(|r| !r.trim().is_empty()).unwrap_or_else(|| {
            format!(
                "I found a task that matches my capabilities: \"{}\". Budget: {}. Do you approve?",
                task.record.title, task.record.budget
            )
        });
        let offer = Offer {
            id: OfferId::new(),
            task_id,
            offerer_id: bot_id,
            offer_text,
            price_salt: input.price_salt.or(task.record.budget.salt()),
            price_usdc: input.price_usdc.or(task.record.budget.usdc()),
            status: OfferStatus::PendingMasterApproval,
            parent_offer_id: None,
            decided_by: None,
            decided_at: None,
            created_at: now,
            updated_at: now,
        };
        self.storage.insert_offer(snap, offer.clone()).await?;
        Ok(offer)
    }

    /// The master approves or rejects a bot's suggestion. Approval turns it
    /// into a regular pending offer on the task.
    pub async fn decide_suggestion(
        &self,
        offer_id: OfferId,
        master_id: UserId,
        approve: bool,
    ) -> Result<Offer> {
        let mut snap = self.storage.begin_snapshot().await?;
        let result = self.decide_in(&mut snap, offer_id, master_id, approve).await;
        let offer = self.finish(snap, result).await?;
        info!(offer_id = %offer_id, master_id = %master_id, approve, "bot suggestion decided");
        Ok(offer)
    }

    async fn decide_in(
        &self,
        snap: &mut S::Snapshot,
        offer_id: OfferId,
        master_id: UserId,
        approve: bool,
    ) -> Result<Offer> {
        let not_found = || MarketError::not_found("Suggestion not found or already processed");
        let mut offer = self
            .storage
            .get_offer_for_update(snap, offer_id)
            .await
            .map_err(|_| not_found())?;
        if offer.record.status != OfferStatus::PendingMasterApproval {
            return Err(not_found());
        }
        let bot = self
            .storage
            .get_user_for_update(snap, offer.record.offerer_id)
            .await?;
        if bot.record.master_id != Some(master_id) {
            return Err(MarketError::forbidden(
                "Only the bot's master can decide this suggestion",
            ));
        }

        let now = self.now();
        if approve {
            let mut task = self
                .storage
                .get_task_for_update(snap, offer.record.task_id)
                .await?;
            if !task.record.status.accepts_offers() {
                return Err(MarketError::invalid_state("Task is not accepting offers"));
            }
            offer.record.apply(OfferEvent::MasterApprove, now)?;
            task.record.offer_count += 1;
            task.record.updated_at = now;
            self.storage
                .update_task(snap, task.record, task.version)
                .await?;
        } else {
            offer.record.apply(OfferEvent::MasterReject, now)?;
        }
        offer.record.decided_by = Some(master_id);
        offer.record.decided_at = Some(now);

        self.storage
            .update_offer(snap, offer.record.clone(), offer.version)
            .await?;
        Ok(offer.record)
    }

    /// Suggestions from `master_id`'s bots awaiting a decision, newest first.
    pub async fn list_suggestions(&self, master_id: UserId) -> Result<Vec<SuggestionView>> {
        let pending = self
            .storage
            .list_offers_by_status(OfferStatus::PendingMasterApproval)
            .await?;
        let mut bots: HashMap<UserId, Option<UserAccount>> = HashMap::new();
        let mut out = Vec::new();
        for offer in pending {
            if !bots.contains_key(&offer.offerer_id) {
                let bot = match self.storage.get_user(offer.offerer_id).await {
                    Ok(user) => Some(user),
                    Err(StorageError::NotFound { .. }) => None,
                    Err(e) => return Err(e.into()),
                };
                bots.insert(offer.offerer_id, bot);
            }
            let Some(Some(bot)) = bots.get(&offer.offerer_id) else {
                continue;
            };
            if bot.master_id != Some(master_id) {
                continue;
            }
            let bot_display_name = bot.display_name.clone();
            let task_title = match self.storage.get_task(offer.task_id).await {
                Ok(task) => task.title,
                Err(StorageError::NotFound { .. }) => continue,
                Err(e) => return Err(e.into()),
            };
            out.push(SuggestionView {
                offer,
                bot_display_name,
                task_title,
            });
        }
        Ok(out)
    }

    /// Place a bot offer directly on an open, unclaimed task.
    pub async fn auto_accept(
        &self,
        bot_id: UserId,
        task_id: TaskId,
        input: AutoAcceptInput,
    ) -> Result<Offer> {
        let mut snap = self.storage.begin_snapshot().await?;
        let result = self.auto_accept_in(&mut snap, bot_id, task_id, input).await;
        let offer = self.finish(snap, result).await?;
        info!(offer_id = %offer.id, task_id = %task_id, bot_id = %bot_id, "bot offer created");
        Ok(offer)
    }

    async fn auto_accept_in(
        &self,
        snap: &mut S::Snapshot,
        bot_id: UserId,
        task_id: TaskId,
        input: AutoAcceptInput,
    ) -> Result<Offer> {
        self.load_bot(snap, bot_id).await?;
        let mut task = self
            .storage
            .get_task_for_update(snap, task_id)
            .await
            .map_err(|_| MarketError::not_found("Task not found"))?;
        if task.record.claimed_by.is_some() {
            return Err(MarketError::conflict("Task already claimed"));
        }
        if task.record.status != TaskStatus::Active {
            return Err(MarketError::invalid_state("Task is not active"));
        }
        if task.record.poster_id == bot_id {
            return Err(MarketError::forbidden("Cannot offer on your own task"));
        }

        let now = self.now();
        let offer = Offer {
            id: OfferId::new(),
            task_id,
            offerer_id: bot_id,
            offer_text: input
                .offer_text
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| AUTO_ACCEPT_TEXT.to_string()),
            price_salt: input.price_salt.or(task.record.budget.salt()),
            price_usdc: input.price_usdc.or(task.record.budget.usdc()),
            status: OfferStatus::Pending,
            parent_offer_id: None,
            decided_by: None,
            decided_at: None,
            created_at: now,
            updated_at: now,
        };
        self.storage.insert_offer(snap, offer.clone()).await?;
        task.record.offer_count += 1;
        task.record.updated_at = now;
        self.storage
            .update_task(snap, task.record, task.version)
            .await?;
        Ok(offer)
    }

    async fn load_bot(
        &self,
        snap: &mut S::Snapshot,
        bot_id: UserId,
    ) -> Result<Versioned<UserAccount>> {
        let bot = self
            .storage
            .get_user_for_update(snap, bot_id)
            .await
            .map_err(|_| MarketError::not_found("Bot user not found"))?;
        if bot.record.user_type != UserType::Bot {
            return Err(MarketError::forbidden("Only bot accounts can do this"));
        }
        Ok(bot)
    }

    /// A task the bot may still offer on.
    async fn load_open_task(
        &self,
        snap: &mut S::Snapshot,
        task_id: TaskId,
        bot_id: UserId,
    ) -> Result<Versioned<Task>> {
        let task = self
            .storage
            .get_task_for_update(snap, task_id)
            .await
            .map_err(|_| MarketError::not_found("Task not found"))?;
        if !task.record.status.accepts_offers() {
            return Err(MarketError::invalid_state("Task is not accepting offers"));
        }
        if task.record.poster_id == bot_id {
            return Err(MarketError::forbidden("Cannot offer on your own task"));
        }
        Ok(task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::OffsetDateTime;

    fn task(budget: Budget, category: &str, description: &str) -> Task {
        let now = OffsetDateTime::UNIX_EPOCH;
        Task {
            id: TaskId::new(),
            poster_id: UserId::new(),
            title: "Scrape listings".into(),
            description: description.into(),
            category: category.into(),
            budget,
            target_type: TargetType::Bot,
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
    fn score_adds_budget_description_and_category_bonuses() {
        let plain = task(Budget::Salt(Decimal::from(40)), "general", "short");
        assert_eq!(match_score(&plain), 54);

        let long = "x".repeat(101);
        let detailed = task(Budget::Salt(Decimal::from(40)), "data", &long);
        assert_eq!(match_score(&detailed), 79);

        let exactly_100 = "x".repeat(100);
        assert_eq!(match_score(&task(Budget::Usdc(Decimal::from(5)), "misc", &exactly_100)), 55);
    }

    #[test]
    fn salt_bonus_caps_at_thirty() {
        let t = task(Budget::Salt(Decimal::from(10_000)), "general", "");
        assert_eq!(match_score(&t), 80);
    }

    #[test]
    fn score_caps_at_one_hundred() {
        let long = "y".repeat(500);
        let t = task(Budget::Usdc(Decimal::from(1_000)), "code", &long);
        assert_eq!(match_score(&t), 100);
    }

    #[test]
    fn fractional_bonus_rounds_half_up() {
        let t = task(Budget::Salt(Decimal::from(125)), "general", "");
        assert_eq!(match_score(&t), 63);
    }

    #[test]
    fn recommendation_tiers_value_salt_at_a_tenth() {
        let tier = |b| Recommendation::for_task(&task(b, "general", ""));
        assert_eq!(tier(Budget::Usdc(Decimal::from(50))), Recommendation::HighValue);
        assert_eq!(tier(Budget::Salt(Decimal::from(500))), Recommendation::HighValue);
        assert_eq!(tier(Budget::Usdc(Decimal::from(20))), Recommendation::MediumValue);
        assert_eq!(tier(Budget::Salt(Decimal::from(199))), Recommendation::LowValue);
        assert_eq!(serde_json::to_value(Recommendation::MediumValue).unwrap(), "medium-value");
    }
}
