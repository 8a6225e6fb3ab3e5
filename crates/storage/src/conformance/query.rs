use std::future::Future;

use suitedbot_core::{
    OfferStatus, ReviewDirection, SubmissionEvent, TaskStatus, TargetType, UserId,
};

use super::{
    at, ensure, make_offer, make_review, make_submission, make_task, make_user, rating,
    seed_offer, seed_submission, seed_task, seed_user, TestResult,
};
use crate::{MarketStorage, TaskFilter};

pub(super) async fn run_query_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: MarketStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "query",
            "list_tasks_newest_first_and_filtered",
            list_tasks_newest_first_and_filtered(factory).await,
        ),
        TestResult::from_result(
            "query",
            "offers_listed_by_task_and_status",
            offers_listed_by_task_and_status(factory).await,
        ),
        TestResult::from_result(
            "query",
            "due_submissions_only_pending_and_elapsed",
            due_submissions_only_pending_and_elapsed(factory).await,
        ),
        TestResult::from_result(
            "query",
            "reviews_received_by_direction",
            reviews_received_by_direction(factory).await,
        ),
    ]
}

async fn list_tasks_newest_first_and_filtered<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: MarketStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let poster = UserId::new();
    let oldest = make_task(poster, "design", 0);
    let mut middle = make_task(poster, "writing", 1);
    middle.target_type = TargetType::Bot;
    let mut newest = make_task(poster, "design", 2);
    newest
        .claim(UserId::new(), at(3))
        .map_err(|e| e.to_string())?;
    for task in [&oldest, &middle, &newest] {
        seed_task(&storage, task).await?;
    }

    let all = storage
        .list_tasks(&TaskFilter::default())
        .await
        .map_err(|e| format!("list_tasks: {e}"))?;
    let ids: Vec<_> = all.iter().map(|t| t.id).collect();
    ensure(
        ids == vec![newest.id, middle.id, oldest.id],
        "unfiltered listing is not newest first",
    )?;

    let active_design = storage
        .list_tasks(&TaskFilter {
            status: Some(TaskStatus::Active),
            category: Some("design".to_string()),
            ..TaskFilter::default()
        })
        .await
        .map_err(|e| format!("list_tasks: {e}"))?;
    ensure(
        active_design.len() == 1 && active_design[0].id == oldest.id,
        format!("status+category filter returned {} tasks", active_design.len()),
    )?;

    let bots = storage
        .list_tasks(&TaskFilter {
            target_type: Some(TargetType::Bot),
            ..TaskFilter::default()
        })
        .await
        .map_err(|e| format!("list_tasks: {e}"))?;
    ensure(
        bots.len() == 1 && bots[0].id == middle.id,
        "target_type filter mismatch",
    )
}

async fn offers_listed_by_task_and_status<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: MarketStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let poster = UserId::new();
    let task = make_task(poster, "general", 0);
    let other = make_task(poster, "general", 1);
    seed_task(&storage, &task).await?;
    seed_task(&storage, &other).await?;

    let first = make_offer(&task, UserId::new(), OfferStatus::Pending);
    let second = make_offer(&task, UserId::new(), OfferStatus::PendingMasterApproval);
    let elsewhere = make_offer(&other, UserId::new(), OfferStatus::PendingMasterApproval);
    for offer in [&first, &second, &elsewhere] {
        seed_offer(&storage, offer).await?;
    }

    let on_task = storage
        .list_offers(task.id)
        .await
        .map_err(|e| format!("list_offers: {e}"))?;
    let ids: Vec<_> = on_task.iter().map(|o| o.id).collect();
    ensure(
        ids == vec![second.id, first.id],
        "task offers are not newest first",
    )?;

    let suggestions = storage
        .list_offers_by_status(OfferStatus::PendingMasterApproval)
        .await
        .map_err(|e| format!("list_offers_by_status: {e}"))?;
    let ids: Vec<_> = suggestions.iter().map(|o| o.id).collect();
    ensure(
        ids == vec![elsewhere.id, second.id],
        format!("unexpected suggestions listing: {ids:?}"),
    )
}

async fn due_submissions_only_pending_and_elapsed<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: MarketStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let worker = UserId::new();
    let task = make_task(UserId::new(), "general", 0);
    seed_task(&storage, &task).await?;

    let late = make_submission(&task, worker, at(30));
    let early = make_submission(&task, worker, at(10));
    let boundary = make_submission(&task, worker, at(60));
    let future = make_submission(&task, worker, at(61));
    let mut reviewed = make_submission(&task, worker, at(5));
    reviewed
        .review(SubmissionEvent::Reject, None, at(6))
        .map_err(|e| e.to_string())?;
    for sub in [&late, &early, &boundary, &future, &reviewed] {
        seed_submission(&storage, sub).await?;
    }

    let due = storage
        .list_due_submissions(at(60))
        .await
        .map_err(|e| format!("list_due_submissions: {e}"))?;
    let ids: Vec<_> = due.iter().map(|s| s.id).collect();
    ensure(
        ids == vec![early.id, late.id, boundary.id],
        format!("expected oldest deadline first, inclusive of now; got {ids:?}"),
    )
}

async fn reviews_received_by_direction<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: MarketStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let poster = make_user("poster");
    let worker = make_user("worker");
    seed_user(&storage, &poster).await?;
    seed_user(&storage, &worker).await?;
    let first_task = make_task(poster.id, "general", 0);
    let second_task = make_task(poster.id, "general", 1);
    seed_task(&storage, &first_task).await?;
    seed_task(&storage, &second_task).await?;

    let older = make_review(&first_task, worker.id, poster.id, rating(3)?);
    let newer = make_review(&second_task, worker.id, poster.id, rating(5)?);
    let mut of_worker = make_review(&first_task, poster.id, worker.id, rating(4)?);
    of_worker.direction = ReviewDirection::PosterReviewsWorker;

    for review in [older.clone(), newer.clone(), of_worker] {
        let mut snap = storage
            .begin_snapshot()
            .await
            .map_err(|e| format!("begin: {e}"))?;
        storage
            .insert_review(&mut snap, review)
            .await
            .map_err(|e| format!("insert_review: {e}"))?;
        storage
            .commit_snapshot(snap)
            .await
            .map_err(|e| format!("commit: {e}"))?;
    }

    let received = storage
        .list_reviews_received(poster.id, ReviewDirection::WorkerReviewsPoster)
        .await
        .map_err(|e| format!("list_reviews_received: {e}"))?;
    let ids: Vec<_> = received.iter().map(|r| r.id).collect();
    ensure(
        ids == vec![newer.id, older.id],
        "poster reviews are not newest first",
    )?;

    let as_poster_reviewing = storage
        .list_reviews_received(poster.id, ReviewDirection::PosterReviewsWorker)
        .await
        .map_err(|e| format!("list_reviews_received: {e}"))?;
    ensure(
        as_poster_reviewing.is_empty(),
        "direction filter leaked worker reviews",
    )
}
