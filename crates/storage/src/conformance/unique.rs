use std::future::Future;

use suitedbot_core::{ReviewDirection, SubmissionId};

use super::{
    ensure, make_review, make_task, make_transaction, make_user, rating, seed_task, seed_user,
    TestResult,
};
use crate::{MarketStorage, StorageError, REVIEW_PER_REVIEWER, TRANSACTION_PER_TASK};

pub(super) async fn run_unique_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: MarketStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "unique",
            "second_transaction_for_task_rejected",
            second_transaction_for_task_rejected(factory).await,
        ),
        TestResult::from_result(
            "unique",
            "second_transaction_in_same_snapshot_rejected",
            second_transaction_in_same_snapshot_rejected(factory).await,
        ),
        TestResult::from_result(
            "unique",
            "second_review_by_same_reviewer_rejected",
            second_review_by_same_reviewer_rejected(factory).await,
        ),
        TestResult::from_result(
            "unique",
            "reviews_by_both_parties_coexist",
            reviews_by_both_parties_coexist(factory).await,
        ),
    ]
}

async fn second_transaction_for_task_rejected<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: MarketStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let poster = make_user("poster");
    let worker = make_user("worker");
    let task = make_task(poster.id, "general", 0);
    seed_task(&storage, &task).await?;
    let submission_id = SubmissionId::new();

    let mut snap = storage
        .begin_snapshot()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    storage
        .insert_transaction(&mut snap, make_transaction(&task, submission_id, worker.id))
        .await
        .map_err(|e| format!("first insert: {e}"))?;
    storage
        .commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit: {e}"))?;

    let mut snap = storage
        .begin_snapshot()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    let result = storage
        .insert_transaction(&mut snap, make_transaction(&task, submission_id, worker.id))
        .await;
    let _ = storage.abort_snapshot(snap).await;

    match result {
        Err(StorageError::Duplicate { key }) if key == TRANSACTION_PER_TASK => Ok(()),
        other => Err(format!("expected Duplicate({TRANSACTION_PER_TASK}), got {other:?}")),
    }
}

async fn second_transaction_in_same_snapshot_rejected<S, F, Fut>(
    factory: &F,
) -> Result<(), String>
where
    S: MarketStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let poster = make_user("poster");
    let worker = make_user("worker");
    let task = make_task(poster.id, "general", 0);
    seed_task(&storage, &task).await?;

    let mut snap = storage
        .begin_snapshot()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    storage
        .insert_transaction(
            &mut snap,
            make_transaction(&task, SubmissionId::new(), worker.id),
        )
        .await
        .map_err(|e| format!("first insert: {e}"))?;
    let result = storage
        .insert_transaction(
            &mut snap,
            make_transaction(&task, SubmissionId::new(), worker.id),
        )
        .await;
    let _ = storage.abort_snapshot(snap).await;

    match result {
        Err(StorageError::Duplicate { key }) if key == TRANSACTION_PER_TASK => {}
        other => return Err(format!("expected Duplicate, got {other:?}")),
    }
    let txs = storage
        .list_transactions(task.id)
        .await
        .map_err(|e| format!("list_transactions: {e}"))?;
    ensure(txs.is_empty(), "aborted snapshot left a transaction behind")
}

async fn second_review_by_same_reviewer_rejected<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: MarketStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let poster = make_user("poster");
    let worker = make_user("worker");
    let task = make_task(poster.id, "general", 0);
    seed_task(&storage, &task).await?;

    let mut snap = storage
        .begin_snapshot()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    storage
        .insert_review(&mut snap, make_review(&task, worker.id, poster.id, rating(5)?))
        .await
        .map_err(|e| format!("first review: {e}"))?;
    storage
        .commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit: {e}"))?;

    let mut snap = storage
        .begin_snapshot()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    let result = storage
        .insert_review(&mut snap, make_review(&task, worker.id, poster.id, rating(1)?))
        .await;
    let _ = storage.abort_snapshot(snap).await;

    match result {
        Err(StorageError::Duplicate { key }) if key == REVIEW_PER_REVIEWER => {}
        other => return Err(format!("expected Duplicate({REVIEW_PER_REVIEWER}), got {other:?}")),
    }
    let reviews = storage
        .list_task_reviews(task.id)
        .await
        .map_err(|e| format!("list_task_reviews: {e}"))?;
    ensure(
        reviews.len() == 1 && reviews[0].rating.get() == 5,
        format!("expected the original review only, got {reviews:?}"),
    )
}

async fn reviews_by_both_parties_coexist<S, F, Fut>(factory: &F) -> Result<(), String>
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
    let task = make_task(poster.id, "general", 0);
    seed_task(&storage, &task).await?;

    let mut of_worker = make_review(&task, poster.id, worker.id, rating(4)?);
    of_worker.direction = ReviewDirection::PosterReviewsWorker;

    let mut snap = storage
        .begin_snapshot()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    storage
        .insert_review(&mut snap, make_review(&task, worker.id, poster.id, rating(5)?))
        .await
        .map_err(|e| format!("worker review: {e}"))?;
    storage
        .insert_review(&mut snap, of_worker)
        .await
        .map_err(|e| format!("poster review: {e}"))?;
    storage
        .commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit: {e}"))?;

    let reviews = storage
        .list_task_reviews(task.id)
        .await
        .map_err(|e| format!("list_task_reviews: {e}"))?;
    ensure(
        reviews.len() == 2,
        format!("expected 2 reviews, got {}", reviews.len()),
    )
}
