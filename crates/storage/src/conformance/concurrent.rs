use std::future::Future;
use std::sync::Arc;

use suitedbot_core::{SubmissionEvent, SubmissionStatus};

use super::{
    at, ensure, make_submission, make_task, make_transaction, make_user, seed_submission,
    seed_task, seed_user, TestResult,
};
use crate::{MarketStorage, StorageError};

/// Number of concurrent tasks to spawn in each test.
const N: usize = 10;

pub(super) async fn run_concurrent_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: MarketStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "concurrent",
            "concurrent_reviews_exactly_one_wins",
            concurrent_reviews_exactly_one_wins(factory).await,
        ),
        TestResult::from_result(
            "concurrent",
            "concurrent_settlements_exactly_one_wins",
            concurrent_settlements_exactly_one_wins(factory).await,
        ),
        TestResult::from_result(
            "concurrent",
            "concurrent_updates_different_rows_all_succeed",
            concurrent_updates_different_rows_all_succeed(factory).await,
        ),
    ]
}

/// Outcome of one racer: `Ok(true)` committed, `Ok(false)` lost on a
/// conflict or uniqueness check.
fn tally(outcomes: Vec<Result<bool, String>>) -> Result<(usize, usize), String> {
    let mut winners = 0usize;
    let mut losers = 0usize;
    for outcome in outcomes {
        if outcome? {
            winners += 1;
        } else {
            losers += 1;
        }
    }
    Ok((winners, losers))
}

async fn join_all(
    handles: Vec<tokio::task::JoinHandle<Result<bool, StorageError>>>,
) -> Vec<Result<bool, String>> {
    let mut out = Vec::with_capacity(handles.len());
    for handle in handles {
        out.push(match handle.await {
            Ok(r) => r.map_err(|e| format!("storage error: {e}")),
            Err(e) => Err(format!("task panic: {e}")),
        });
    }
    out
}

fn is_lost_race(err: &StorageError) -> bool {
    matches!(
        err,
        StorageError::ConcurrentConflict { .. } | StorageError::Duplicate { .. }
    )
}

// ── Manual review racing the sweeper ────────────────────────────────────────

/// N tasks each open a snapshot and try to move the same pending submission
/// out of `pending` from version 0. Exactly one commit lands.
async fn concurrent_reviews_exactly_one_wins<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: MarketStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);
    let poster = make_user("poster");
    let worker = make_user("worker");
    seed_user(storage.as_ref(), &poster).await?;
    seed_user(storage.as_ref(), &worker).await?;
    let task = make_task(poster.id, "general", 0);
    seed_task(storage.as_ref(), &task).await?;
    let submission = make_submission(&task, worker.id, at(60));
    seed_submission(storage.as_ref(), &submission).await?;

    let mut handles = Vec::new();
    for i in 0..N {
        let s = storage.clone();
        let mut record = submission.clone();
        handles.push(tokio::spawn(async move {
            let event = if i % 2 == 0 {
                SubmissionEvent::Approve
            } else {
                SubmissionEvent::AutoApprove
            };
            record
                .review(event, Some(format!("racer-{i}")), at(61))
                .map_err(|e| StorageError::Backend(e.to_string()))?;
            let mut snap = s.begin_snapshot().await?;
            let result = match s.update_submission(&mut snap, record, 0).await {
                Ok(_) => s.commit_snapshot(snap).await,
                Err(e) => {
                    let _ = s.abort_snapshot(snap).await;
                    Err(e)
                }
            };
            match result {
                Ok(()) => Ok(true),
                Err(e) if is_lost_race(&e) => Ok(false),
                Err(e) => Err(e),
            }
        }));
    }

    let (winners, losers) = tally(join_all(handles).await)?;
    ensure(
        winners == 1,
        format!("expected exactly 1 winner, got {winners}"),
    )?;
    ensure(
        losers == N - 1,
        format!("expected {} losers, got {losers}", N - 1),
    )?;

    let stored = storage
        .get_submission(submission.id)
        .await
        .map_err(|e| format!("get_submission: {e}"))?;
    ensure(
        stored.status == SubmissionStatus::Approved,
        format!("final status {}", stored.status),
    )
}

// ── Double settlement ───────────────────────────────────────────────────────

/// N tasks each insert a settlement record for the same task. The unique key
/// admits exactly one.
async fn concurrent_settlements_exactly_one_wins<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: MarketStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);
    let poster = make_user("poster");
    let worker = make_user("worker");
    seed_user(storage.as_ref(), &poster).await?;
    let task = make_task(poster.id, "general", 0);
    seed_task(storage.as_ref(), &task).await?;
    let submission = make_submission(&task, worker.id, at(60));

    let mut handles = Vec::new();
    for _ in 0..N {
        let s = storage.clone();
        let record = make_transaction(&task, submission.id, worker.id);
        handles.push(tokio::spawn(async move {
            let mut snap = s.begin_snapshot().await?;
            let result = match s.insert_transaction(&mut snap, record).await {
                Ok(()) => s.commit_snapshot(snap).await,
                Err(e) => {
                    let _ = s.abort_snapshot(snap).await;
                    Err(e)
                }
            };
            match result {
                Ok(()) => Ok(true),
                Err(e) if is_lost_race(&e) => Ok(false),
                Err(e) => Err(e),
            }
        }));
    }

    let (winners, _) = tally(join_all(handles).await)?;
    ensure(
        winners == 1,
        format!("expected exactly 1 winner, got {winners}"),
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

// ── No false conflicts ──────────────────────────────────────────────────────

/// N tasks each update a different user. All should succeed.
async fn concurrent_updates_different_rows_all_succeed<S, F, Fut>(
    factory: &F,
) -> Result<(), String>
where
    S: MarketStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);
    let mut users = Vec::new();
    for i in 0..N {
        let user = make_user(&format!("user-{i}"));
        seed_user(storage.as_ref(), &user).await?;
        users.push(user);
    }

    let mut handles = Vec::new();
    for user in users.iter().cloned() {
        let s = storage.clone();
        handles.push(tokio::spawn(async move {
            let mut snap = s.begin_snapshot().await?;
            let mut row = s.get_user_for_update(&mut snap, user.id).await?;
            row.record.tasks_completed += 1;
            s.update_user(&mut snap, row.record, row.version).await?;
            match s.commit_snapshot(snap).await {
                Ok(()) => Ok(true),
                Err(e) if is_lost_race(&e) => Ok(false),
                Err(e) => Err(e),
            }
        }));
    }

    let (winners, losers) = tally(join_all(handles).await)?;
    ensure(
        winners == N && losers == 0,
        format!("expected {N} winners, got {winners} ({losers} false conflicts)"),
    )?;
    for user in &users {
        let stored = storage
            .get_user(user.id)
            .await
            .map_err(|e| format!("get_user: {e}"))?;
        ensure(
            stored.tasks_completed == 1,
            format!("{} has tasks_completed {}", user.display_name, stored.tasks_completed),
        )?;
    }
    Ok(())
}
