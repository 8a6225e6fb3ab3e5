use std::future::Future;

use suitedbot_core::{SubmissionEvent, TaskStatus};

use super::{
    at, ensure, make_submission, make_task, make_transaction, make_user, seed_submission,
    seed_task, seed_user, TestResult,
};
use crate::{MarketStorage, StorageError};

pub(super) async fn run_commit_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: MarketStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "commit",
            "committed_writes_visible_to_queries",
            committed_writes_visible_to_queries(factory).await,
        ),
        TestResult::from_result(
            "commit",
            "uncommitted_writes_invisible_to_queries",
            uncommitted_writes_invisible_to_queries(factory).await,
        ),
        TestResult::from_result(
            "commit",
            "aborted_snapshot_discards_all_writes",
            aborted_snapshot_discards_all_writes(factory).await,
        ),
        TestResult::from_result(
            "commit",
            "failed_commit_is_all_or_nothing",
            failed_commit_is_all_or_nothing(factory).await,
        ),
    ]
}

async fn committed_writes_visible_to_queries<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: MarketStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let poster = make_user("poster");
    let task = make_task(poster.id, "general", 0);

    let mut snap = storage
        .begin_snapshot()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    storage
        .insert_user(&mut snap, poster.clone())
        .await
        .map_err(|e| format!("insert user: {e}"))?;
    storage
        .insert_task(&mut snap, task.clone())
        .await
        .map_err(|e| format!("insert task: {e}"))?;
    storage
        .commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit: {e}"))?;

    storage
        .get_user(poster.id)
        .await
        .map_err(|e| format!("user not visible after commit: {e}"))?;
    storage
        .get_task(task.id)
        .await
        .map_err(|e| format!("task not visible after commit: {e}"))?;
    Ok(())
}

async fn uncommitted_writes_invisible_to_queries<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: MarketStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let poster = make_user("poster");
    seed_user(&storage, &poster).await?;

    let mut snap = storage
        .begin_snapshot()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    let mut row = storage
        .get_user_for_update(&mut snap, poster.id)
        .await
        .map_err(|e| format!("get_user_for_update: {e}"))?;
    row.record.tasks_posted = 7;
    storage
        .update_user(&mut snap, row.record, row.version)
        .await
        .map_err(|e| format!("update_user: {e}"))?;

    let outside = storage
        .get_user(poster.id)
        .await
        .map_err(|e| format!("get_user: {e}"))?;
    let _ = storage.abort_snapshot(snap).await;

    ensure(
        outside.tasks_posted == 0,
        format!(
            "uncommitted update leaked: tasks_posted = {}",
            outside.tasks_posted
        ),
    )
}

async fn aborted_snapshot_discards_all_writes<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: MarketStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let poster = make_user("poster");
    seed_user(&storage, &poster).await?;
    let task = make_task(poster.id, "general", 0);

    let mut snap = storage
        .begin_snapshot()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    storage
        .insert_task(&mut snap, task.clone())
        .await
        .map_err(|e| format!("insert task: {e}"))?;
    let mut row = storage
        .get_user_for_update(&mut snap, poster.id)
        .await
        .map_err(|e| format!("get_user_for_update: {e}"))?;
    row.record.tasks_posted += 1;
    storage
        .update_user(&mut snap, row.record, row.version)
        .await
        .map_err(|e| format!("update_user: {e}"))?;
    storage
        .abort_snapshot(snap)
        .await
        .map_err(|e| format!("abort: {e}"))?;

    match storage.get_task(task.id).await {
        Err(StorageError::NotFound { .. }) => {}
        other => return Err(format!("aborted task insert visible: {other:?}")),
    }
    let user = storage
        .get_user(poster.id)
        .await
        .map_err(|e| format!("get_user: {e}"))?;
    ensure(user.tasks_posted == 0, "aborted user update visible")
}

/// A settlement snapshot updates the submission and task and inserts the
/// transaction. A rival snapshot settles the same task first, so the
/// transaction insert collides at commit and none of the first snapshot's
/// writes may land.
async fn failed_commit_is_all_or_nothing<S, F, Fut>(factory: &F) -> Result<(), String>
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
    let mut task = make_task(poster.id, "general", 0);
    task.claim(worker.id, at(1)).map_err(|e| e.to_string())?;
    task.record_submission(at(2)).map_err(|e| e.to_string())?;
    seed_task(&storage, &task).await?;
    let submission = make_submission(&task, worker.id, at(60));
    seed_submission(&storage, &submission).await?;

    let mut slow = storage
        .begin_snapshot()
        .await
        .map_err(|e| format!("begin slow: {e}"))?;
    let mut fast = storage
        .begin_snapshot()
        .await
        .map_err(|e| format!("begin fast: {e}"))?;

    let mut sub_row = storage
        .get_submission_for_update(&mut slow, submission.id)
        .await
        .map_err(|e| format!("get submission: {e}"))?;
    sub_row
        .record
        .review(SubmissionEvent::Approve, None, at(3))
        .map_err(|e| e.to_string())?;
    storage
        .update_submission(&mut slow, sub_row.record, sub_row.version)
        .await
        .map_err(|e| format!("update submission: {e}"))?;
    let mut task_row = storage
        .get_task_for_update(&mut slow, task.id)
        .await
        .map_err(|e| format!("get task: {e}"))?;
    task_row
        .record
        .apply_review(SubmissionEvent::Approve, at(3))
        .map_err(|e| e.to_string())?;
    storage
        .update_task(&mut slow, task_row.record, task_row.version)
        .await
        .map_err(|e| format!("update task: {e}"))?;
    storage
        .insert_transaction(&mut slow, make_transaction(&task, submission.id, worker.id))
        .await
        .map_err(|e| format!("insert transaction (slow): {e}"))?;

    storage
        .insert_transaction(&mut fast, make_transaction(&task, submission.id, worker.id))
        .await
        .map_err(|e| format!("insert transaction (fast): {e}"))?;
    storage
        .commit_snapshot(fast)
        .await
        .map_err(|e| format!("commit fast: {e}"))?;

    match storage.commit_snapshot(slow).await {
        Err(StorageError::Duplicate { .. }) | Err(StorageError::ConcurrentConflict { .. }) => {}
        other => return Err(format!("expected slow commit to fail, got {other:?}")),
    }

    let stored_task = storage
        .get_task(task.id)
        .await
        .map_err(|e| format!("get_task: {e}"))?;
    ensure(
        stored_task.status == TaskStatus::Submitted,
        format!("task status moved to {}", stored_task.status),
    )?;
    let stored_sub = storage
        .get_submission(submission.id)
        .await
        .map_err(|e| format!("get_submission: {e}"))?;
    ensure(
        stored_sub.auto_approve_at.is_some(),
        "submission review leaked from failed commit",
    )?;
    let txs = storage
        .list_transactions(task.id)
        .await
        .map_err(|e| format!("list_transactions: {e}"))?;
    ensure(
        txs.len() == 1,
        format!("expected 1 transaction, got {}", txs.len()),
    )
}
