//! In-memory vote store for tests and local runs without Postgres.
//!
//! Units of work hold one store-wide lock and stage their writes on a copy of
//! the state, so they are serialized and all-or-nothing like the Postgres
//! transactions they stand in for. Score writes can be made to fail on demand
//! to exercise rollback.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, MutexGuard, OwnedMutexGuard};
use uuid::Uuid;

use crate::{
    error::VoteError,
    models::{VoteDirection, VoteRecord, VoteTarget},
    services::vote_store::{TargetResolver, VoteStore, VoteUnitOfWork},
};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    scores: HashMap<VoteTarget, i32>,
    votes: HashMap<(Uuid, Uuid), VoteRecord>,
}

pub struct MemoryVoteStore {
    state: Arc<Mutex<MemoryState>>,
    lock_timeout: Duration,
    failing_score_writes: Arc<AtomicUsize>,
    batch_reads: AtomicUsize,
}

impl MemoryVoteStore {
    pub fn new(lock_timeout: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState::default())),
            lock_timeout,
            failing_score_writes: Arc::new(AtomicUsize::new(0)),
            batch_reads: AtomicUsize::new(0),
        }
    }

    /// Registers a target with a score of zero.
    pub async fn insert_target(&self, target: VoteTarget) -> Result<(), VoteError> {
        self.lock().await?.scores.insert(target, 0);
        Ok(())
    }

    /// Removes a target together with every vote cast on it.
    pub async fn remove_target(&self, target: VoteTarget) -> Result<u64, VoteError> {
        let mut state = self.lock().await?;
        state.scores.remove(&target);
        let before = state.votes.len();
        state.votes.retain(|_, vote| vote.target_id != target.id);
        Ok((before - state.votes.len()) as u64)
    }

    pub async fn votes_for_target(&self, target_id: Uuid) -> Result<Vec<VoteRecord>, VoteError> {
        let state = self.lock().await?;
        Ok(state
            .votes
            .values()
            .filter(|vote| vote.target_id == target_id)
            .cloned()
            .collect())
    }

    /// Makes the next `count` score writes fail with `VoteError::Storage`.
    pub fn fail_next_score_writes(&self, count: usize) {
        self.failing_score_writes.store(count, Ordering::SeqCst);
    }

    /// Number of `find_votes` calls served so far.
    pub fn batch_reads(&self) -> usize {
        self.batch_reads.load(Ordering::SeqCst)
    }

    async fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, VoteError> {
        tokio::time::timeout(self.lock_timeout, self.state.lock())
            .await
            .map_err(|_| VoteError::Contention("timed out waiting for the store lock".to_string()))
    }
}

struct MemoryUnitOfWork {
    guard: OwnedMutexGuard<MemoryState>,
    staged: MemoryState,
    failing_score_writes: Arc<AtomicUsize>,
}

#[async_trait]
impl TargetResolver for MemoryVoteStore {
    async fn exists(&self, target: VoteTarget) -> Result<bool, VoteError> {
        Ok(self.lock().await?.scores.contains_key(&target))
    }

    async fn get_score(&self, target: VoteTarget) -> Result<Option<i32>, VoteError> {
        Ok(self.lock().await?.scores.get(&target).copied())
    }
}

#[async_trait]
impl VoteStore for MemoryVoteStore {
    async fn begin(&self) -> Result<Box<dyn VoteUnitOfWork>, VoteError> {
        let guard = tokio::time::timeout(self.lock_timeout, self.state.clone().lock_owned())
            .await
            .map_err(|_| {
                VoteError::Contention("timed out waiting for the store lock".to_string())
            })?;
        let staged = (*guard).clone();

        Ok(Box::new(MemoryUnitOfWork {
            guard,
            staged,
            failing_score_writes: Arc::clone(&self.failing_score_writes),
        }))
    }

    async fn find_vote(
        &self,
        user_id: Uuid,
        target_id: Uuid,
    ) -> Result<Option<VoteRecord>, VoteError> {
        Ok(self.lock().await?.votes.get(&(user_id, target_id)).cloned())
    }

    async fn find_votes(
        &self,
        user_id: Uuid,
        target_ids: &[Uuid],
    ) -> Result<Vec<VoteRecord>, VoteError> {
        self.batch_reads.fetch_add(1, Ordering::SeqCst);
        let state = self.lock().await?;
        Ok(target_ids
            .iter()
            .filter_map(|target_id| state.votes.get(&(user_id, *target_id)).cloned())
            .collect())
    }
}

#[async_trait]
impl VoteUnitOfWork for MemoryUnitOfWork {
    async fn lock_target(&mut self, target: VoteTarget) -> Result<Option<i32>, VoteError> {
        Ok(self.staged.scores.get(&target).copied())
    }

    async fn find_vote(
        &mut self,
        user_id: Uuid,
        target_id: Uuid,
    ) -> Result<Option<VoteRecord>, VoteError> {
        Ok(self.staged.votes.get(&(user_id, target_id)).cloned())
    }

    async fn upsert_vote(
        &mut self,
        user_id: Uuid,
        target: VoteTarget,
        direction: VoteDirection,
    ) -> Result<VoteRecord, VoteError> {
        let now = Utc::now();
        let vote = self
            .staged
            .votes
            .entry((user_id, target.id))
            .and_modify(|vote| {
                vote.direction = direction;
                vote.updated_at = now;
            })
            .or_insert_with(|| VoteRecord {
                user_id,
                target_id: target.id,
                target_kind: target.kind,
                direction,
                created_at: now,
                updated_at: now,
            });

        Ok(vote.clone())
    }

    async fn apply_delta(&mut self, target: VoteTarget, delta: i32) -> Result<i32, VoteError> {
        let injected = self
            .failing_score_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(VoteError::Storage("injected score write failure".to_string()));
        }

        let score = self
            .staged
            .scores
            .get_mut(&target)
            .ok_or(VoteError::TargetNotFound(target))?;
        *score += delta;
        Ok(*score)
    }

    async fn commit(self: Box<Self>) -> Result<(), VoteError> {
        let MemoryUnitOfWork {
            mut guard, staged, ..
        } = *self;
        *guard = staged;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn dropped_unit_of_work_leaves_no_trace() {
        let store = MemoryVoteStore::new(Duration::from_secs(1));
        let target = VoteTarget::post(Uuid::new_v4());
        let user_id = Uuid::new_v4();
        store.insert_target(target).await.unwrap();

        {
            let mut unit = store.begin().await.unwrap();
            unit.upsert_vote(user_id, target, VoteDirection::Up)
                .await
                .unwrap();
            assert_eq!(unit.apply_delta(target, 1).await.unwrap(), 1);
        }

        assert_eq!(store.get_score(target).await.unwrap(), Some(0));
        assert!(store.find_vote(user_id, target.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn open_unit_of_work_blocks_a_second_one() {
        let store = MemoryVoteStore::new(Duration::from_millis(20));
        let _held = store.begin().await.unwrap();

        let second = store.begin().await;
        assert!(matches!(second, Err(VoteError::Contention(_))));
    }

    #[tokio::test]
    async fn removing_a_target_drops_its_votes() {
        let store = MemoryVoteStore::new(Duration::from_secs(1));
        let kept = VoteTarget::comment(Uuid::new_v4());
        let removed = VoteTarget::post(Uuid::new_v4());
        store.insert_target(kept).await.unwrap();
        store.insert_target(removed).await.unwrap();

        let mut unit = store.begin().await.unwrap();
        for target in [kept, removed] {
            unit.upsert_vote(Uuid::new_v4(), target, VoteDirection::Down)
                .await
                .unwrap();
            unit.apply_delta(target, -1).await.unwrap();
        }
        unit.commit().await.unwrap();

        assert_eq!(store.remove_target(removed).await.unwrap(), 1);
        assert!(!store.exists(removed).await.unwrap());
        assert!(store.votes_for_target(removed.id).await.unwrap().is_empty());
        assert_eq!(store.votes_for_target(kept.id).await.unwrap().len(), 1);
        assert_eq!(store.get_score(kept).await.unwrap(), Some(-1));
    }
}
