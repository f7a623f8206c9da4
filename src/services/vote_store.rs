//! Storage seams for the voting core.
//!
//! A [`VoteStore`] hands out [`VoteUnitOfWork`]s: every ledger and score write
//! of one vote transition goes through a single unit, and nothing it did is
//! visible unless [`VoteUnitOfWork::commit`] succeeds. Dropping a unit without
//! committing rolls it back.
use std::time::Duration;

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::{
    error::VoteError,
    models::{VoteDirection, VoteRecord, VoteTarget},
    services::{score_service, vote_ledger},
};

/// Read side of the post/comment storage.
#[async_trait]
pub trait TargetResolver: Send + Sync {
    async fn exists(&self, target: VoteTarget) -> Result<bool, VoteError>;

    /// Current score, or `None` when the target does not exist.
    async fn get_score(&self, target: VoteTarget) -> Result<Option<i32>, VoteError>;
}

#[async_trait]
pub trait VoteUnitOfWork: Send {
    /// Locks `target` for the rest of the unit and returns its score, or
    /// `None` when it does not exist.
    async fn lock_target(&mut self, target: VoteTarget) -> Result<Option<i32>, VoteError>;

    async fn find_vote(
        &mut self,
        user_id: Uuid,
        target_id: Uuid,
    ) -> Result<Option<VoteRecord>, VoteError>;

    async fn upsert_vote(
        &mut self,
        user_id: Uuid,
        target: VoteTarget,
        direction: VoteDirection,
    ) -> Result<VoteRecord, VoteError>;

    /// Adds `delta` to the target's score and returns the new score.
    async fn apply_delta(&mut self, target: VoteTarget, delta: i32) -> Result<i32, VoteError>;

    async fn commit(self: Box<Self>) -> Result<(), VoteError>;
}

#[async_trait]
pub trait VoteStore: TargetResolver {
    /// Starts a unit of work. Fails with `VoteError::Contention` when one
    /// cannot be opened within the store's lock timeout.
    async fn begin(&self) -> Result<Box<dyn VoteUnitOfWork>, VoteError>;

    async fn find_vote(
        &self,
        user_id: Uuid,
        target_id: Uuid,
    ) -> Result<Option<VoteRecord>, VoteError>;

    async fn find_votes(
        &self,
        user_id: Uuid,
        target_ids: &[Uuid],
    ) -> Result<Vec<VoteRecord>, VoteError>;
}

#[derive(Clone)]
pub struct PgVoteStore {
    pool: PgPool,
    lock_timeout: Duration,
}

impl PgVoteStore {
    pub fn new(pool: PgPool, lock_timeout: Duration) -> Self {
        Self { pool, lock_timeout }
    }
}

pub struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl TargetResolver for PgVoteStore {
    async fn exists(&self, target: VoteTarget) -> Result<bool, VoteError> {
        score_service::target_exists(&self.pool, target).await
    }

    async fn get_score(&self, target: VoteTarget) -> Result<Option<i32>, VoteError> {
        score_service::get_score(&self.pool, target).await
    }
}

#[async_trait]
impl VoteStore for PgVoteStore {
    async fn begin(&self) -> Result<Box<dyn VoteUnitOfWork>, VoteError> {
        let mut tx = self.pool.begin().await?;

        // Row locks taken later in this transaction give up after this long
        // with SQLSTATE 55P03.
        sqlx::query("SELECT set_config('lock_timeout', $1, true)")
            .bind(format!("{}ms", self.lock_timeout.as_millis()))
            .execute(&mut *tx)
            .await?;

        Ok(Box::new(PgUnitOfWork { tx }))
    }

    async fn find_vote(
        &self,
        user_id: Uuid,
        target_id: Uuid,
    ) -> Result<Option<VoteRecord>, VoteError> {
        vote_ledger::find_vote(&self.pool, user_id, target_id).await
    }

    async fn find_votes(
        &self,
        user_id: Uuid,
        target_ids: &[Uuid],
    ) -> Result<Vec<VoteRecord>, VoteError> {
        vote_ledger::find_votes_for_targets(&self.pool, user_id, target_ids).await
    }
}

#[async_trait]
impl VoteUnitOfWork for PgUnitOfWork {
    async fn lock_target(&mut self, target: VoteTarget) -> Result<Option<i32>, VoteError> {
        score_service::lock_target(&mut *self.tx, target).await
    }

    async fn find_vote(
        &mut self,
        user_id: Uuid,
        target_id: Uuid,
    ) -> Result<Option<VoteRecord>, VoteError> {
        vote_ledger::find_vote(&mut *self.tx, user_id, target_id).await
    }

    async fn upsert_vote(
        &mut self,
        user_id: Uuid,
        target: VoteTarget,
        direction: VoteDirection,
    ) -> Result<VoteRecord, VoteError> {
        vote_ledger::upsert_vote(&mut self.tx, user_id, target, direction).await
    }

    async fn apply_delta(&mut self, target: VoteTarget, delta: i32) -> Result<i32, VoteError> {
        score_service::apply_delta(&mut *self.tx, target, delta).await
    }

    async fn commit(self: Box<Self>) -> Result<(), VoteError> {
        let PgUnitOfWork { tx } = *self;
        tx.commit().await?;
        Ok(())
    }
}
