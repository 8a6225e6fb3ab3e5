//! In-process [`MarketStorage`] backend.
//!
//! A snapshot clones the live tables at `begin_snapshot` and reads from that
//! copy, so it never observes writes committed after it began. Each mutation
//! is applied to the copy immediately and also recorded as a replayable
//! operation. `commit_snapshot` replays the operations against the live tables
//! under one lock, re-running every version and uniqueness check, and
//! publishes the result only if all of them pass.

use std::collections::HashMap;
use std::fmt::Display;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use suitedbot_core::{
    Offer, OfferId, OfferStatus, ReviewDirection, SettlementRecord, Submission, SubmissionId,
    Task, TaskId, TaskReview, UserAccount, UserId,
};
use time::OffsetDateTime;

use crate::error::{StorageError, REVIEW_PER_REVIEWER, TRANSACTION_PER_TASK};
use crate::record::{TaskFilter, Versioned};
use crate::traits::MarketStorage;

#[derive(Debug, Clone)]
struct Row<T> {
    record: T,
    version: i64,
    /// Insertion order, used for newest-first listings.
    seq: u64,
}

#[derive(Debug, Clone, Default)]
struct Tables {
    users: HashMap<UserId, Row<UserAccount>>,
    tasks: HashMap<TaskId, Row<Task>>,
    offers: HashMap<OfferId, Row<Offer>>,
    submissions: HashMap<SubmissionId, Row<Submission>>,
    transactions: Vec<SettlementRecord>,
    reviews: Vec<TaskReview>,
    next_seq: u64,
}

/// A versioned table keyed by the record's id.
trait TableRow: Clone + Send + Sync + 'static {
    type Key: Copy + Eq + Hash + Display + Send + Sync + 'static;
    const TABLE: &'static str;

    fn key(&self) -> Self::Key;
    fn rows(tables: &Tables) -> &HashMap<Self::Key, Row<Self>>;
    fn rows_mut(tables: &mut Tables) -> &mut HashMap<Self::Key, Row<Self>>;
}

macro_rules! table_row {
    ($record:ty, $key:ty, $field:ident, $name:literal) => {
        impl TableRow for $record {
            type Key = $key;
            const TABLE: &'static str = $name;

            fn key(&self) -> $key {
                self.id
            }

            fn rows(tables: &Tables) -> &HashMap<$key, Row<Self>> {
                &tables.$field
            }

            fn rows_mut(tables: &mut Tables) -> &mut HashMap<$key, Row<Self>> {
                &mut tables.$field
            }
        }
    };
}

table_row!(UserAccount, UserId, users, "users");
table_row!(Task, TaskId, tasks, "tasks");
table_row!(Offer, OfferId, offers, "offers");
table_row!(Submission, SubmissionId, submissions, "submissions");

impl Tables {
    fn insert<T: TableRow>(&mut self, record: T) -> Result<(), StorageError> {
        let key = record.key();
        let seq = self.next_seq;
        let rows = T::rows_mut(self);
        if rows.contains_key(&key) {
            return Err(StorageError::AlreadyExists {
                table: T::TABLE,
                id: key.to_string(),
            });
        }
        rows.insert(
            key,
            Row {
                record,
                version: 0,
                seq,
            },
        );
        self.next_seq += 1;
        Ok(())
    }

    fn get<T: TableRow>(&self, key: T::Key) -> Result<Versioned<T>, StorageError> {
        T::rows(self)
            .get(&key)
            .map(|row| Versioned {
                record: row.record.clone(),
                version: row.version,
            })
            .ok_or_else(|| StorageError::NotFound {
                table: T::TABLE,
                id: key.to_string(),
            })
    }

    fn update<T: TableRow>(
        &mut self,
        record: T,
        expected_version: i64,
    ) -> Result<i64, StorageError> {
        let key = record.key();
        let row = T::rows_mut(self)
            .get_mut(&key)
            .ok_or_else(|| StorageError::NotFound {
                table: T::TABLE,
                id: key.to_string(),
            })?;
        if row.version != expected_version {
            return Err(StorageError::ConcurrentConflict {
                table: T::TABLE,
                id: key.to_string(),
                expected_version,
            });
        }
        row.record = record;
        row.version += 1;
        Ok(row.version)
    }

    /// Rows matching `pred`, newest first.
    fn newest_first<T: TableRow>(&self, pred: impl Fn(&T) -> bool) -> Vec<Versioned<T>> {
        let mut rows: Vec<&Row<T>> = T::rows(self).values().filter(|r| pred(&r.record)).collect();
        rows.sort_by(|a, b| b.seq.cmp(&a.seq));
        rows.into_iter()
            .map(|r| Versioned {
                record: r.record.clone(),
                version: r.version,
            })
            .collect()
    }

    fn append_transaction(&mut self, record: SettlementRecord) -> Result<(), StorageError> {
        if self.transactions.iter().any(|t| t.id == record.id) {
            return Err(StorageError::AlreadyExists {
                table: "transactions",
                id: record.id.to_string(),
            });
        }
        if self.transactions.iter().any(|t| t.task_id == record.task_id) {
            return Err(StorageError::Duplicate {
                key: TRANSACTION_PER_TASK,
            });
        }
        self.transactions.push(record);
        Ok(())
    }

    fn append_review(&mut self, review: TaskReview) -> Result<(), StorageError> {
        if self.reviews.iter().any(|r| r.id == review.id) {
            return Err(StorageError::AlreadyExists {
                table: "task_reviews",
                id: review.id.to_string(),
            });
        }
        if self
            .reviews
            .iter()
            .any(|r| r.task_id == review.task_id && r.reviewer_id == review.reviewer_id)
        {
            return Err(StorageError::Duplicate {
                key: REVIEW_PER_REVIEWER,
            });
        }
        self.reviews.push(review);
        Ok(())
    }
}

type Op = Box<dyn Fn(&mut Tables) -> Result<(), StorageError> + Send>;

/// Snapshot type for [`MemoryStorage`].
pub struct MemorySnapshot {
    view: Tables,
    ops: Vec<Op>,
}

impl MemorySnapshot {
    /// Apply `op` to this snapshot's view now and record it for replay at commit.
    fn stage<R>(
        &mut self,
        op: impl Fn(&mut Tables) -> Result<R, StorageError> + Send + 'static,
    ) -> Result<R, StorageError> {
        let out = op(&mut self.view)?;
        self.ops
            .push(Box::new(move |tables: &mut Tables| op(tables).map(|_| ())));
        Ok(out)
    }
}

/// In-memory marketplace store. Cloning shares the same tables.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    live: Arc<Mutex<Tables>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>, StorageError> {
        self.live
            .lock()
            .map_err(|_| StorageError::Backend("memory store lock poisoned".to_string()))
    }
}

#[async_trait]
impl MarketStorage for MemoryStorage {
    type Snapshot = MemorySnapshot;

    async fn begin_snapshot(&self) -> Result<MemorySnapshot, StorageError> {
        let view = self.lock()?.clone();
        Ok(MemorySnapshot {
            view,
            ops: Vec::new(),
        })
    }

    async fn commit_snapshot(&self, snapshot: MemorySnapshot) -> Result<(), StorageError> {
        if snapshot.ops.is_empty() {
            return Ok(());
        }
        let mut live = self.lock()?;
        let mut next = live.clone();
        for op in &snapshot.ops {
            op(&mut next)?;
        }
        *live = next;
        Ok(())
    }

    async fn abort_snapshot(&self, _snapshot: MemorySnapshot) -> Result<(), StorageError> {
        Ok(())
    }

    async fn insert_user(
        &self,
        snapshot: &mut MemorySnapshot,
        user: UserAccount,
    ) -> Result<(), StorageError> {
        snapshot.stage(move |t| t.insert(user.clone()))
    }

    async fn get_user_for_update(
        &self,
        snapshot: &mut MemorySnapshot,
        id: UserId,
    ) -> Result<Versioned<UserAccount>, StorageError> {
        snapshot.view.get(id)
    }

    async fn update_user(
        &self,
        snapshot: &mut MemorySnapshot,
        user: UserAccount,
        expected_version: i64,
    ) -> Result<i64, StorageError> {
        snapshot.stage(move |t| t.update(user.clone(), expected_version))
    }

    async fn insert_task(
        &self,
        snapshot: &mut MemorySnapshot,
        task: Task,
    ) -> Result<(), StorageError> {
        snapshot.stage(move |t| t.insert(task.clone()))
    }

    async fn get_task_for_update(
        &self,
        snapshot: &mut MemorySnapshot,
        id: TaskId,
    ) -> Result<Versioned<Task>, StorageError> {
        snapshot.view.get(id)
    }

    async fn update_task(
        &self,
        snapshot: &mut MemorySnapshot,
        task: Task,
        expected_version: i64,
    ) -> Result<i64, StorageError> {
        snapshot.stage(move |t| t.update(task.clone(), expected_version))
    }

    async fn insert_offer(
        &self,
        snapshot: &mut MemorySnapshot,
        offer: Offer,
    ) -> Result<(), StorageError> {
        snapshot.stage(move |t| t.insert(offer.clone()))
    }

    async fn get_offer_for_update(
        &self,
        snapshot: &mut MemorySnapshot,
        id: OfferId,
    ) -> Result<Versioned<Offer>, StorageError> {
        snapshot.view.get(id)
    }

    async fn list_task_offers_for_update(
        &self,
        snapshot: &mut MemorySnapshot,
        task_id: TaskId,
    ) -> Result<Vec<Versioned<Offer>>, StorageError> {
        Ok(snapshot
            .view
            .newest_first::<Offer>(|o| o.task_id == task_id))
    }

    async fn update_offer(
        &self,
        snapshot: &mut MemorySnapshot,
        offer: Offer,
        expected_version: i64,
    ) -> Result<i64, StorageError> {
        snapshot.stage(move |t| t.update(offer.clone(), expected_version))
    }

    async fn insert_submission(
        &self,
        snapshot: &mut MemorySnapshot,
        submission: Submission,
    ) -> Result<(), StorageError> {
        snapshot.stage(move |t| t.insert(submission.clone()))
    }

    async fn get_submission_for_update(
        &self,
        snapshot: &mut MemorySnapshot,
        id: SubmissionId,
    ) -> Result<Versioned<Submission>, StorageError> {
        snapshot.view.get(id)
    }

    async fn update_submission(
        &self,
        snapshot: &mut MemorySnapshot,
        submission: Submission,
        expected_version: i64,
    ) -> Result<i64, StorageError> {
        snapshot.stage(move |t| t.update(submission.clone(), expected_version))
    }

    async fn insert_transaction(
        &self,
        snapshot: &mut MemorySnapshot,
        record: SettlementRecord,
    ) -> Result<(), StorageError> {
        snapshot.stage(move |t| t.append_transaction(record.clone()))
    }

    async fn insert_review(
        &self,
        snapshot: &mut MemorySnapshot,
        review: TaskReview,
    ) -> Result<(), StorageError> {
        snapshot.stage(move |t| t.append_review(review.clone()))
    }

    async fn get_user(&self, id: UserId) -> Result<UserAccount, StorageError> {
        self.lock()?.get::<UserAccount>(id).map(|v| v.record)
    }

    async fn get_task(&self, id: TaskId) -> Result<Task, StorageError> {
        self.lock()?.get::<Task>(id).map(|v| v.record)
    }

    async fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>, StorageError> {
        Ok(into_records(
            self.lock()?.newest_first::<Task>(|t| filter.matches(t)),
        ))
    }

    async fn get_offer(&self, id: OfferId) -> Result<Offer, StorageError> {
        self.lock()?.get::<Offer>(id).map(|v| v.record)
    }

    async fn list_offers(&self, task_id: TaskId) -> Result<Vec<Offer>, StorageError> {
        Ok(into_records(
            self.lock()?.newest_first::<Offer>(|o| o.task_id == task_id),
        ))
    }

    async fn list_offers_by_status(&self, status: OfferStatus) -> Result<Vec<Offer>, StorageError> {
        Ok(into_records(
            self.lock()?.newest_first::<Offer>(|o| o.status == status),
        ))
    }

    async fn get_submission(&self, id: SubmissionId) -> Result<Submission, StorageError> {
        self.lock()?.get::<Submission>(id).map(|v| v.record)
    }

    async fn list_submissions(&self, task_id: TaskId) -> Result<Vec<Submission>, StorageError> {
        Ok(into_records(
            self.lock()?
                .newest_first::<Submission>(|s| s.task_id == task_id),
        ))
    }

    async fn list_due_submissions(
        &self,
        now: OffsetDateTime,
    ) -> Result<Vec<Submission>, StorageError> {
        let mut due = into_records(self.lock()?.newest_first::<Submission>(|s| s.is_due(now)));
        due.reverse();
        due.sort_by_key(|s| s.auto_approve_at);
        Ok(due)
    }

    async fn list_transactions(
        &self,
        task_id: TaskId,
    ) -> Result<Vec<SettlementRecord>, StorageError> {
        Ok(self
            .lock()?
            .transactions
            .iter()
            .filter(|t| t.task_id == task_id)
            .cloned()
            .collect())
    }

    async fn list_task_reviews(&self, task_id: TaskId) -> Result<Vec<TaskReview>, StorageError> {
        Ok(self
            .lock()?
            .reviews
            .iter()
            .filter(|r| r.task_id == task_id)
            .cloned()
            .collect())
    }

    async fn list_reviews_received(
        &self,
        user_id: UserId,
        direction: ReviewDirection,
    ) -> Result<Vec<TaskReview>, StorageError> {
        Ok(self
            .lock()?
            .reviews
            .iter()
            .rev()
            .filter(|r| r.reviewed_id == user_id && r.direction == direction)
            .cloned()
            .collect())
    }
}

fn into_records<T>(rows: Vec<Versioned<T>>) -> Vec<T> {
    rows.into_iter().map(|v| v.record).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use suitedbot_core::UserType;
    use time::macros::datetime;

    fn user(name: &str) -> UserAccount {
        UserAccount::new(name, UserType::Human, datetime!(2026-01-01 00:00 UTC))
    }

    #[tokio::test]
    async fn snapshot_reads_its_own_writes_before_commit() {
        let store = MemoryStorage::new();
        let u = user("ada");
        let mut snap = store.begin_snapshot().await.unwrap();
        store.insert_user(&mut snap, u.clone()).await.unwrap();

        let seen = store.get_user_for_update(&mut snap, u.id).await.unwrap();
        assert_eq!(seen.version, 0);
        assert!(store.get_user(u.id).await.is_err());

        store.commit_snapshot(snap).await.unwrap();
        assert_eq!(store.get_user(u.id).await.unwrap(), u);
    }

    #[tokio::test]
    async fn failed_commit_publishes_nothing() {
        let store = MemoryStorage::new();
        let u = user("ada");
        let mut seed = store.begin_snapshot().await.unwrap();
        store.insert_user(&mut seed, u.clone()).await.unwrap();
        store.commit_snapshot(seed).await.unwrap();

        let mut a = store.begin_snapshot().await.unwrap();
        let mut b = store.begin_snapshot().await.unwrap();

        let mut ua = store.get_user_for_update(&mut a, u.id).await.unwrap();
        ua.record.salt_balance = Decimal::from(10);
        store.update_user(&mut a, ua.record, ua.version).await.unwrap();
        let extra = user("bob");
        store.insert_user(&mut a, extra.clone()).await.unwrap();

        let mut ub = store.get_user_for_update(&mut b, u.id).await.unwrap();
        ub.record.salt_balance = Decimal::from(20);
        store.update_user(&mut b, ub.record, ub.version).await.unwrap();
        store.commit_snapshot(b).await.unwrap();

        let err = store.commit_snapshot(a).await.unwrap_err();
        assert!(matches!(err, StorageError::ConcurrentConflict { table: "users", .. }));
        assert_eq!(store.get_user(u.id).await.unwrap().salt_balance, Decimal::from(20));
        assert!(store.get_user(extra.id).await.is_err());
    }
}
