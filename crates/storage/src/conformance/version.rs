use std::future::Future;

use rust_decimal::Decimal;

use super::{ensure, make_task, make_user, seed_task, seed_user, TestResult};
use crate::{MarketStorage, StorageError};

pub(super) async fn run_version_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: MarketStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "version",
            "update_increments_version",
            update_increments_version(factory).await,
        ),
        TestResult::from_result(
            "version",
            "stale_version_rejected",
            stale_version_rejected(factory).await,
        ),
        TestResult::from_result(
            "version",
            "interleaved_snapshots_second_commit_conflicts",
            interleaved_snapshots_second_commit_conflicts(factory).await,
        ),
        TestResult::from_result(
            "version",
            "update_missing_row_not_found",
            update_missing_row_not_found(factory).await,
        ),
    ]
}

async fn update_increments_version<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: MarketStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let poster = make_user("poster");
    seed_user(&storage, &poster).await?;
    let task = make_task(poster.id, "general", 0);
    seed_task(&storage, &task).await?;

    for expected in 1..=3i64 {
        let mut snap = storage
            .begin_snapshot()
            .await
            .map_err(|e| format!("begin: {e}"))?;
        let mut row = storage
            .get_task_for_update(&mut snap, task.id)
            .await
            .map_err(|e| format!("get_task_for_update: {e}"))?;
        row.record.offer_count += 1;
        let new_version = storage
            .update_task(&mut snap, row.record, row.version)
            .await
            .map_err(|e| format!("update_task: {e}"))?;
        storage
            .commit_snapshot(snap)
            .await
            .map_err(|e| format!("commit: {e}"))?;
        ensure(
            new_version == expected,
            format!("expected version {expected}, got {new_version}"),
        )?;
    }

    let stored = storage
        .get_task(task.id)
        .await
        .map_err(|e| format!("get_task: {e}"))?;
    ensure(
        stored.offer_count == 3,
        format!("expected offer_count 3, got {}", stored.offer_count),
    )
}

async fn stale_version_rejected<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: MarketStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let user = make_user("ada");
    seed_user(&storage, &user).await?;

    let mut snap = storage
        .begin_snapshot()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    let mut row = storage
        .get_user_for_update(&mut snap, user.id)
        .await
        .map_err(|e| format!("get_user_for_update: {e}"))?;
    row.record.salt_balance = Decimal::from(1);
    let result = storage.update_user(&mut snap, row.record, 5).await;
    let _ = storage.abort_snapshot(snap).await;

    match result {
        Err(StorageError::ConcurrentConflict {
            table: "users",
            expected_version: 5,
            ..
        }) => Ok(()),
        other => Err(format!("expected ConcurrentConflict, got {other:?}")),
    }
}

/// Two snapshots read the same row at version 0 and both update it. The first
/// commit wins and the second must fail, either at update or at commit.
async fn interleaved_snapshots_second_commit_conflicts<S, F, Fut>(
    factory: &F,
) -> Result<(), String>
where
    S: MarketStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let user = make_user("ada");
    seed_user(&storage, &user).await?;

    let mut first = storage
        .begin_snapshot()
        .await
        .map_err(|e| format!("begin first: {e}"))?;
    let mut second = storage
        .begin_snapshot()
        .await
        .map_err(|e| format!("begin second: {e}"))?;

    let mut a = storage
        .get_user_for_update(&mut first, user.id)
        .await
        .map_err(|e| format!("read first: {e}"))?;
    let mut b = storage
        .get_user_for_update(&mut second, user.id)
        .await
        .map_err(|e| format!("read second: {e}"))?;

    a.record.salt_balance += Decimal::from(10);
    storage
        .update_user(&mut first, a.record, a.version)
        .await
        .map_err(|e| format!("update first: {e}"))?;
    storage
        .commit_snapshot(first)
        .await
        .map_err(|e| format!("commit first: {e}"))?;

    b.record.salt_balance += Decimal::from(20);
    let outcome = match storage.update_user(&mut second, b.record, b.version).await {
        Ok(_) => storage.commit_snapshot(second).await,
        Err(e) => {
            let _ = storage.abort_snapshot(second).await;
            Err(e)
        }
    };
    match outcome {
        Err(StorageError::ConcurrentConflict { .. }) => {}
        other => return Err(format!("expected ConcurrentConflict, got {other:?}")),
    }

    let stored = storage
        .get_user(user.id)
        .await
        .map_err(|e| format!("get_user: {e}"))?;
    ensure(
        stored.salt_balance == Decimal::from(510),
        format!("lost update: balance is {}", stored.salt_balance),
    )
}

async fn update_missing_row_not_found<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: MarketStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let ghost = make_user("ghost");

    let mut snap = storage
        .begin_snapshot()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    let result = storage.update_user(&mut snap, ghost, 0).await;
    let _ = storage.abort_snapshot(snap).await;

    match result {
        Err(StorageError::NotFound { table: "users", .. }) => Ok(()),
        other => Err(format!("expected NotFound, got {other:?}")),
    }
}
