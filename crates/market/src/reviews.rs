//! Ratings between poster and worker after a task completes, and the poster
//! review statistics shown on a user's profile.

use std::collections::BTreeMap;
use std::fmt;

use rust_decimal::Decimal;
use serde::de::{self, IgnoredAny, MapAccess, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use suitedbot_core::{
    running_mean, Rating, ReviewDirection, ReviewId, SubmissionStatus, TaskId, TaskReview,
    TaskStatus, UserId, UserType,
};
use suitedbot_storage::MarketStorage;
use tracing::info;

use crate::{Clock, MarketError, Marketplace, Result};

const DEFAULT_PAGE_LIMIT: u32 = 20;
const MAX_PAGE_LIMIT: u32 = 50;

/// Rating fields accept any JSON value. Anything other than an integer reads
/// as absent, so a malformed sub-rating never rejects the review.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReviewInput {
    #[serde(default, deserialize_with = "lenient_int")]
    pub rating: Option<i64>,
    #[serde(default, deserialize_with = "lenient_int")]
    pub clarity_rating: Option<i64>,
    #[serde(default, deserialize_with = "lenient_int")]
    pub communication_rating: Option<i64>,
    #[serde(default, deserialize_with = "lenient_int")]
    pub payment_speed_rating: Option<i64>,
    #[serde(default)]
    pub would_work_again: Option<bool>,
    #[serde(default)]
    pub comment: Option<String>,
}

fn lenient_int<'de, D>(deserializer: D) -> std::result::Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer.deserialize_any(LenientInt)
}

struct LenientInt;

impl<'de> Visitor<'de> for LenientInt {
    type Value = Option<i64>;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("any JSON value")
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<Self::Value, E> {
        Ok(Some(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<Self::Value, E> {
        Ok(i64::try_from(v).ok())
    }

    fn visit_f64<E: de::Error>(self, _: f64) -> std::result::Result<Self::Value, E> {
        Ok(None)
    }

    fn visit_bool<E: de::Error>(self, _: bool) -> std::result::Result<Self::Value, E> {
        Ok(None)
    }

    fn visit_str<E: de::Error>(self, _: &str) -> std::result::Result<Self::Value, E> {
        Ok(None)
    }

    fn visit_unit<E: de::Error>(self) -> std::result::Result<Self::Value, E> {
        Ok(None)
    }

    fn visit_none<E: de::Error>(self) -> std::result::Result<Self::Value, E> {
        Ok(None)
    }

    fn visit_some<D: Deserializer<'de>>(self, d: D) -> std::result::Result<Self::Value, D::Error> {
        d.deserialize_any(LenientInt)
    }

    fn visit_seq<A>(self, mut seq: A) -> std::result::Result<Self::Value, A::Error>
    where
        A: SeqAccess<'de>,
    {
        while seq.next_element::<IgnoredAny>()?.is_some() {}
        Ok(None)
    }

    fn visit_map<A>(self, mut map: A) -> std::result::Result<Self::Value, A::Error>
    where
        A: MapAccess<'de>,
    {
        while map.next_entry::<IgnoredAny, IgnoredAny>()?.is_some() {}
        Ok(None)
    }
}

impl ReviewInput {
    fn rating(&self) -> Result<Rating> {
        let rating = self
            .rating
            .ok_or_else(|| MarketError::validation("Rating must be between 1 and 5"))?;
        Ok(Rating::new(rating)?)
    }

    fn into_review(
        self,
        task_id: TaskId,
        reviewer_id: UserId,
        reviewed_id: UserId,
        direction: ReviewDirection,
        now: time::OffsetDateTime,
    ) -> Result<TaskReview> {
        let rating = self.rating()?;
        Ok(TaskReview {
            id: ReviewId::new(),
            task_id,
            reviewer_id,
            reviewed_id,
            direction,
            rating,
            clarity_rating: Rating::lenient(self.clarity_rating),
            communication_rating: Rating::lenient(self.communication_rating),
            payment_speed_rating: Rating::lenient(self.payment_speed_rating),
            would_work_again: self.would_work_again.unwrap_or(true),
            comment: self.comment.filter(|c| !c.trim().is_empty()),
            created_at: now,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PosterProfile {
    pub id: UserId,
    pub display_name: String,
    pub user_type: UserType,
    pub poster_reputation: i64,
    pub poster_reviews_count: u32,
    pub avg_poster_rating: Decimal,
    pub tasks_posted: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PosterReviewStats {
    /// Review count per star, 1 through 5.
    pub rating_distribution: BTreeMap<u8, u32>,
    pub would_work_again_percent: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: u32,
    pub pages: u32,
}

impl Pagination {
    fn new(page: Option<u32>, limit: Option<u32>, total: usize) -> Self {
        let page = page.unwrap_or(1).max(1);
        let limit = limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT);
        let total = u32::try_from(total).unwrap_or(u32::MAX);
        Self {
            page,
            limit,
            total,
            pages: total.div_ceil(limit),
        }
    }

    fn offset(&self) -> usize {
        (self.page as usize - 1) * self.limit as usize
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PosterReviewsPage {
    pub user: PosterProfile,
    pub stats: PosterReviewStats,
    pub reviews: Vec<TaskReview>,
    pub pagination: Pagination,
}

/// Share of reviews answering "would work again", as a rounded percentage.
/// Zero when there are no reviews.
pub fn would_work_again_percent(yes: usize, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    // round(100 * yes / total), halves rounding up
    let pct = (200 * yes + total) / (2 * total);
    u32::try_from(pct).unwrap_or(100)
}

impl<S: MarketStorage, C: Clock> Marketplace<S, C> {
    /// The worker rates the poster of a task they completed.
    pub async fn review_poster(
        &self,
        task_id: TaskId,
        reviewer: UserId,
        input: ReviewInput,
    ) -> Result<TaskReview> {
        input.rating()?;
        let now = self.now();
        let mut snap = self.storage.begin_snapshot().await?;
        let result = self.review_poster_in(&mut snap, task_id, reviewer, input, now).await;
        let review = self.finish(snap, result).await?;
        info!(
            review_id = %review.id,
            task_id = %task_id,
            rating = review.rating.get(),
            "poster reviewed"
        );
        Ok(review)
    }

    async fn review_poster_in(
        &self,
        snap: &mut S::Snapshot,
        task_id: TaskId,
        reviewer: UserId,
        input: ReviewInput,
        now: time::OffsetDateTime,
    ) -> Result<TaskReview> {
        let task = self
            .storage
            .get_task_for_update(snap, task_id)
            .await
            .map_err(|_| MarketError::not_found("Task not found"))?
            .record;
        if task.status != TaskStatus::Completed {
            return Err(MarketError::invalid_state(
                "Can only review posters for completed tasks",
            ));
        }
        let was_worker = task.claimed_by == Some(reviewer)
            || self
                .storage
                .list_submissions(task_id)
                .await?
                .iter()
                .any(|s| s.submitter_id == reviewer && s.status == SubmissionStatus::Approved);
        if !was_worker {
            return Err(MarketError::forbidden(
                "Only the worker who completed this task can review the poster",
            ));
        }
        if task.poster_id == reviewer {
            return Err(MarketError::forbidden("Cannot review yourself"));
        }

        let review = input.into_review(
            task_id,
            reviewer,
            task.poster_id,
            ReviewDirection::WorkerReviewsPoster,
            now,
        )?;
        self.storage.insert_review(snap, review.clone()).await?;

        let mut poster = self.storage.get_user_for_update(snap, task.poster_id).await?;
        let user = &mut poster.record;
        user.avg_poster_rating =
            running_mean(user.avg_poster_rating, user.poster_reviews_count, review.rating);
        user.poster_reviews_count = user.poster_reviews_count.saturating_add(1);
        user.poster_reputation = user
            .poster_reputation
            .saturating_add(i64::from(review.rating.get()));
        self.storage
            .update_user(snap, poster.record, poster.version)
            .await?;
        Ok(review)
    }

    /// The poster rates the worker of a completed task.
    pub async fn review_worker(
        &self,
        task_id: TaskId,
        reviewer: UserId,
        input: ReviewInput,
    ) -> Result<TaskReview> {
        input.rating()?;
        let now = self.now();
        let mut snap = self.storage.begin_snapshot().await?;
        let result = self.review_worker_in(&mut snap, task_id, reviewer, input, now).await;
        let review = self.finish(snap, result).await?;
        info!(
            review_id = %review.id,
            task_id = %task_id,
            rating = review.rating.get(),
            "worker reviewed"
        );
        Ok(review)
    }

    async fn review_worker_in(
        &self,
        snap: &mut S::Snapshot,
        task_id: TaskId,
        reviewer: UserId,
        input: ReviewInput,
        now: time::OffsetDateTime,
    ) -> Result<TaskReview> {
        let task = self
            .storage
            .get_task_for_update(snap, task_id)
            .await
            .map_err(|_| MarketError::not_found("Task not found"))?
            .record;
        if task.status != TaskStatus::Completed {
            return Err(MarketError::invalid_state(
                "Can only review workers for completed tasks",
            ));
        }
        if task.poster_id != reviewer {
            return Err(MarketError::forbidden(
                "Only the task poster can review the worker",
            ));
        }
        let worker_id = task
            .claimed_by
            .ok_or_else(|| MarketError::invalid_state("Task has no worker to review"))?;
        if worker_id == reviewer {
            return Err(MarketError::forbidden("Cannot review yourself"));
        }

        let review = input.into_review(
            task_id,
            reviewer,
            worker_id,
            ReviewDirection::PosterReviewsWorker,
            now,
        )?;
        self.storage.insert_review(snap, review.clone()).await?;

        let mut worker = self.storage.get_user_for_update(snap, worker_id).await?;
        let user = &mut worker.record;
        user.avg_worker_rating =
            running_mean(user.avg_worker_rating, user.worker_reviews_count, review.rating);
        user.worker_reviews_count = user.worker_reviews_count.saturating_add(1);
        self.storage
            .update_user(snap, worker.record, worker.version)
            .await?;
        Ok(review)
    }

    /// All reviews written about a task, oldest first.
    pub async fn list_task_reviews(&self, task_id: TaskId) -> Result<Vec<TaskReview>> {
        self.get_task(task_id).await?;
        Ok(self.storage.list_task_reviews(task_id).await?)
    }

    /// Reviews a user has received as a poster, one page at a time, with the
    /// star distribution and "would work again" share over all of them.
    pub async fn poster_reviews(
        &self,
        user_id: UserId,
        page: Option<u32>,
        limit: Option<u32>,
    ) -> Result<PosterReviewsPage> {
        let user = self
            .storage
            .get_user(user_id)
            .await
            .map_err(|_| MarketError::not_found("User not found"))?;
        let all = self
            .storage
            .list_reviews_received(user_id, ReviewDirection::WorkerReviewsPoster)
            .await?;

        let mut rating_distribution: BTreeMap<u8, u32> =
            (Rating::MIN..=Rating::MAX).map(|star| (star, 0)).collect();
        for review in &all {
            *rating_distribution.entry(review.rating.get()).or_default() += 1;
        }
        let yes = all.iter().filter(|r| r.would_work_again).count();
        let stats = PosterReviewStats {
            rating_distribution,
            would_work_again_percent: would_work_again_percent(yes, all.len()),
        };

        let pagination = Pagination::new(page, limit, all.len());
        let reviews = all
            .into_iter()
            .skip(pagination.offset())
            .take(pagination.limit as usize)
            .collect();

        Ok(PosterReviewsPage {
            user: PosterProfile {
                id: user.id,
                display_name: user.display_name,
                user_type: user.user_type,
                poster_reputation: user.poster_reputation,
                poster_reviews_count: user.poster_reviews_count,
                avg_poster_rating: user.avg_poster_rating,
                tasks_posted: user.tasks_posted,
            },
            stats,
            reviews,
            pagination,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_is_zero_without_reviews() {
        assert_eq!(would_work_again_percent(0, 0), 0);
    }

    #[test]
    fn percent_rounds_half_up() {
        assert_eq!(would_work_again_percent(1, 1), 100);
        assert_eq!(would_work_again_percent(0, 4), 0);
        assert_eq!(would_work_again_percent(1, 3), 33);
        assert_eq!(would_work_again_percent(2, 3), 67);
        assert_eq!(would_work_again_percent(1, 8), 13);
        assert_eq!(would_work_again_percent(1, 200), 1);
    }

    #[test]
    fn pagination_clamps_limit_and_counts_pages() {
        let p = Pagination::new(None, None, 41);
        assert_eq!((p.page, p.limit, p.pages), (1, 20, 3));
        let p = Pagination::new(Some(0), Some(500), 120);
        assert_eq!((p.page, p.limit, p.pages, p.offset()), (1, 50, 3, 0));
        let p = Pagination::new(Some(3), Some(10), 0);
        assert_eq!((p.pages, p.offset()), (0, 20));
    }

    #[test]
    fn out_of_range_sub_ratings_are_dropped() {
        let input = ReviewInput {
            rating: Some(4),
            clarity_rating: Some(0),
            communication_rating: Some(5),
            payment_speed_rating: Some(9),
            ..ReviewInput::default()
        };
        let review = input
            .into_review(
                TaskId::new(),
                UserId::new(),
                UserId::new(),
                ReviewDirection::WorkerReviewsPoster,
                time::OffsetDateTime::UNIX_EPOCH,
            )
            .unwrap();
        assert_eq!(review.clarity_rating, None);
        assert_eq!(review.communication_rating.map(|r| r.get()), Some(5));
        assert_eq!(review.payment_speed_rating, None);
        assert!(review.would_work_again);
    }

    #[test]
    fn malformed_sub_ratings_read_as_absent() {
        let input: ReviewInput = serde_json::from_value(serde_json::json!({
            "rating": 4,
            "clarity_rating": "great",
            "communication_rating": 4.5,
            "payment_speed_rating": [3],
            "would_work_again": false,
        }))
        .unwrap();
        assert_eq!(input.rating, Some(4));
        assert_eq!(input.clarity_rating, None);
        assert_eq!(input.communication_rating, None);
        assert_eq!(input.payment_speed_rating, None);
        assert_eq!(input.would_work_again, Some(false));
    }

    #[test]
    fn non_integer_rating_is_validation() {
        let input: ReviewInput =
            serde_json::from_value(serde_json::json!({"rating": "5", "clarity_rating": null}))
                .unwrap();
        assert_eq!(input.clarity_rating, None);
        assert!(matches!(input.rating(), Err(MarketError::Validation(_))));
    }

    #[test]
    fn missing_or_invalid_rating_is_validation() {
        for rating in [None, Some(6), Some(0)] {
            let err = ReviewInput {
                rating,
                ..ReviewInput::default()
            }
            .into_review(
                TaskId::new(),
                UserId::new(),
                UserId::new(),
                ReviewDirection::WorkerReviewsPoster,
                time::OffsetDateTime::UNIX_EPOCH,
            )
            .unwrap_err();
            assert!(matches!(err, MarketError::Validation(_)));
        }
    }
}
