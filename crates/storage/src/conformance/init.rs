use std::future::Future;

use suitedbot_core::{SubmissionId, TaskId, UserId};

use super::{
    ensure, make_task, make_user, seed_task, seed_user, TestResult,
};
use crate::{MarketStorage, StorageError};

pub(super) async fn run_init_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: MarketStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "init",
            "insert_user_starts_at_version_0",
            insert_user_starts_at_version_0(factory).await,
        ),
        TestResult::from_result(
            "init",
            "insert_duplicate_user_already_exists",
            insert_duplicate_user_already_exists(factory).await,
        ),
        TestResult::from_result(
            "init",
            "insert_task_round_trips_fields",
            insert_task_round_trips_fields(factory).await,
        ),
        TestResult::from_result(
            "init",
            "missing_rows_not_found",
            missing_rows_not_found(factory).await,
        ),
    ]
}

async fn insert_user_starts_at_version_0<S, F, Fut>(factory: &F) -> Result<(), String>
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
    let row = storage
        .get_user_for_update(&mut snap, user.id)
        .await
        .map_err(|e| format!("get_user_for_update: {e}"))?;
    storage
        .abort_snapshot(snap)
        .await
        .map_err(|e| format!("abort: {e}"))?;

    ensure(
        row.version == 0,
        format!("expected version 0, got {}", row.version),
    )?;
    ensure(row.record == user, "stored user differs from inserted user")
}

async fn insert_duplicate_user_already_exists<S, F, Fut>(factory: &F) -> Result<(), String>
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
    let result = storage.insert_user(&mut snap, user.clone()).await;
    let _ = storage.abort_snapshot(snap).await;

    match result {
        Err(StorageError::AlreadyExists { table: "users", .. }) => Ok(()),
        Err(e) => Err(format!("expected AlreadyExists on users, got {e}")),
        Ok(()) => Err("duplicate insert succeeded".to_string()),
    }
}

async fn insert_task_round_trips_fields<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: MarketStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;
    let poster = make_user("poster");
    seed_user(&storage, &poster).await?;
    let mut task = make_task(poster.id, "design", 0);
    task.required_tags = vec!["figma".to_string()];
    seed_task(&storage, &task).await?;

    let stored = storage
        .get_task(task.id)
        .await
        .map_err(|e| format!("get_task: {e}"))?;
    ensure(stored == task, format!("stored task differs: {stored:?}"))
}

async fn missing_rows_not_found<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: MarketStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = factory().await;

    match storage.get_user(UserId::new()).await {
        Err(StorageError::NotFound { table: "users", .. }) => {}
        other => return Err(format!("get_user on empty store: {other:?}")),
    }
    match storage.get_task(TaskId::new()).await {
        Err(StorageError::NotFound { table: "tasks", .. }) => {}
        other => return Err(format!("get_task on empty store: {other:?}")),
    }

    let mut snap = storage
        .begin_snapshot()
        .await
        .map_err(|e| format!("begin: {e}"))?;
    let result = storage
        .get_submission_for_update(&mut snap, SubmissionId::new())
        .await;
    let _ = storage.abort_snapshot(snap).await;
    match result {
        Err(StorageError::NotFound {
            table: "submissions",
            ..
        }) => Ok(()),
        other => Err(format!("get_submission_for_update on empty store: {other:?}")),
    }
}
