//! Task registry: creation with escrow, listing, and the detail view.

use std::collections::HashMap;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use suitedbot_core::{
    Budget, Currency, Offer, Submission, TargetType, Task, TaskId, TaskStatus, UserId,
};
use suitedbot_storage::{MarketStorage, TaskFilter};
use time::OffsetDateTime;
use tracing::info;

use crate::{Clock, MarketError, Marketplace, Result};

const DEFAULT_CATEGORY: &str = "general";

/// Fields accepted when posting a task. Required fields are optional here so
/// that a missing one surfaces as a validation error rather than a parse error.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewTask {
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    pub budget: Option<Decimal>,
    pub currency: Option<String>,
    #[serde(default)]
    pub target_type: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub deadline: Option<OffsetDateTime>,
    #[serde(default)]
    pub required_tags: Option<Vec<String>>,
}

/// Listing filters as they arrive on the query string.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskQuery {
    /// Defaults to `active`; `all` disables the filter.
    pub status: Option<String>,
    /// `all` disables the filter.
    pub target_type: Option<String>,
    pub category: Option<String>,
}

impl TaskQuery {
    fn to_filter(&self) -> Result<TaskFilter> {
        let status = match self.status.as_deref().unwrap_or("active") {
            "all" => None,
            s => Some(
                TaskStatus::parse(s)
                    .ok_or_else(|| MarketError::validation(format!("Unknown task status '{s}'")))?,
            ),
        };
        let target_type = match self.target_type.as_deref() {
            None | Some("all") => None,
            Some(t) => Some(
                TargetType::parse(t)
                    .ok_or_else(|| MarketError::validation(format!("Unknown target type '{t}'")))?,
            ),
        };
        Ok(TaskFilter {
            status,
            target_type,
            category: self.category.clone().filter(|c| !c.is_empty()),
        })
    }
}

/// A task with its poster's display info.
#[derive(Debug, Clone, Serialize)]
pub struct TaskSummary {
    #[serde(flatten)]
    pub task: Task,
    pub poster_display_name: String,
    pub poster_type: String,
}

/// A task with its offers and submissions, newest first.
#[derive(Debug, Clone, Serialize)]
pub struct TaskDetail {
    #[serde(flatten)]
    pub summary: TaskSummary,
    pub offers: Vec<Offer>,
    pub submissions: Vec<Submission>,
}

impl<S: MarketStorage, C: Clock> Marketplace<S, C> {
    /// Post a task. Salt budgets are moved out of the poster's balance into
    /// escrow in the same snapshot that creates the task.
    pub async fn create_task(&self, poster_id: UserId, input: NewTask) -> Result<Task> {
        let title = input
            .title
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        let (Some(title), Some(amount), Some(currency)) = (title, input.budget, input.currency)
        else {
            return Err(MarketError::validation("Missing required fields"));
        };
        let budget = Budget::new(Currency::from_str(&currency)?, amount)?;
        let target_type = match input.target_type.as_deref() {
            None => TargetType::default(),
            Some(t) => TargetType::parse(t)
                .ok_or_else(|| MarketError::validation(format!("Unknown target type '{t}'")))?,
        };

        let now = self.now();
        let task = Task {
            id: TaskId::new(),
            poster_id,
            title,
            description: input.description.unwrap_or_default(),
            category: input
                .category
                .filter(|c| !c.is_empty())
                .unwrap_or_else(|| DEFAULT_CATEGORY.to_string()),
            budget,
            target_type,
            status: TaskStatus::Active,
            claimed_by: None,
            claimed_at: None,
            offer_count: 0,
            deadline: input.deadline,
            required_tags: input.required_tags.unwrap_or_default(),
            created_at: now,
            updated_at: now,
        };

        let mut snap = self.storage.begin_snapshot().await?;
        let result = self.post_task_in(&mut snap, &task).await;
        self.finish(snap, result).await?;

        info!(task_id = %task.id, poster_id = %poster_id, budget = %task.budget, "task created");
        Ok(task)
    }

    async fn post_task_in(&self, snap: &mut S::Snapshot, task: &Task) -> Result<()> {
        let mut poster = self
            .storage
            .get_user_for_update(snap, task.poster_id)
            .await
            .map_err(|_| MarketError::not_found("User profile not found"))?;

        if let Budget::Salt(amount) = task.budget {
            if poster.record.salt_balance < amount {
                return Err(MarketError::InsufficientFunds(
                    "Insufficient salt balance".to_string(),
                ));
            }
            poster.record.salt_balance -= amount;
        }
        poster.record.tasks_posted += 1;

        self.storage.insert_task(snap, task.clone()).await?;
        self.storage
            .update_user(snap, poster.record, poster.version)
            .await?;
        Ok(())
    }

    /// Tasks matching `query`, newest first.
    pub async fn list_tasks(&self, query: &TaskQuery) -> Result<Vec<TaskSummary>> {
        let filter = query.to_filter()?;
        let tasks = self.storage.list_tasks(&filter).await?;
        let mut posters: HashMap<UserId, (String, String)> = HashMap::new();
        let mut out = Vec::with_capacity(tasks.len());
        for task in tasks {
            if !posters.contains_key(&task.poster_id) {
                let info = self.poster_info(task.poster_id).await?;
                posters.insert(task.poster_id, info);
            }
            let (name, kind) = posters
                .get(&task.poster_id)
                .cloned()
                .unwrap_or_else(unknown_poster);
            out.push(TaskSummary {
                task,
                poster_display_name: name,
                poster_type: kind,
            });
        }
        Ok(out)
    }

    pub async fn get_task(&self, id: TaskId) -> Result<Task> {
        self.storage
            .get_task(id)
            .await
            .map_err(|_| MarketError::not_found("Task not found"))
    }

    pub async fn get_task_detail(&self, id: TaskId) -> Result<TaskDetail> {
        let task = self.get_task(id).await?;
        let (name, kind) = self.poster_info(task.poster_id).await?;
        let offers = self.storage.list_offers(id).await?;
        let submissions = self.storage.list_submissions(id).await?;
        Ok(TaskDetail {
            summary: TaskSummary {
                task,
                poster_display_name: name,
                poster_type: kind,
            },
            offers,
            submissions,
        })
    }

    async fn poster_info(&self, id: UserId) -> Result<(String, String)> {
        match self.storage.get_user(id).await {
            Ok(user) => Ok((user.display_name, user.user_type.as_str().to_string())),
            Err(suitedbot_storage::StorageError::NotFound { .. }) => Ok(unknown_poster()),
            Err(e) => Err(e.into()),
        }
    }
}

fn unknown_poster() -> (String, String) {
    ("Unknown".to_string(), "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_defaults_to_active_and_all_disables() {
        let f = TaskQuery::default().to_filter().unwrap();
        assert_eq!(f.status, Some(TaskStatus::Active));
        assert_eq!(f.target_type, None);

        let f = TaskQuery {
            status: Some("all".into()),
            target_type: Some("all".into()),
            category: Some(String::new()),
        }
        .to_filter()
        .unwrap();
        assert_eq!(f, TaskFilter::default());

        let err = TaskQuery {
            status: Some("archived".into()),
            ..TaskQuery::default()
        }
        .to_filter()
        .unwrap_err();
        assert!(matches!(err, MarketError::Validation(_)));
    }
}
