//! Vote transitions.
//!
//! Each request reads the caller's current vote, decides the transition and
//! writes ledger and score inside one unit of work. Repeating the current
//! direction is rejected without touching anything; there is no retraction.
use std::time::Duration;

use uuid::Uuid;

use crate::{
    config::Config,
    error::VoteError,
    models::{Caller, VoteDirection, VoteOutcome, VoteResponse, VoteTarget, VoteTransition},
    services::vote_store::VoteStore,
};

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Multiplied by the attempt number before each retry.
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_attempts: config.vote_max_attempts.max(1),
            backoff: config.vote_retry_backoff(),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(25),
        }
    }
}

pub struct VoteService<S> {
    store: S,
    retry: RetryPolicy,
}

impl<S: VoteStore> VoteService<S> {
    pub fn new(store: S, retry: RetryPolicy) -> Self {
        Self { store, retry }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Returns `Ok(true)` when ledger and score were updated and `Ok(false)`
    /// when the caller already holds a vote in that direction.
    pub async fn cast_vote(
        &self,
        caller: Caller,
        target: VoteTarget,
        value: i32,
    ) -> Result<bool, VoteError> {
        match self
            .apply_vote(caller, target, VoteDirection::from_value(value))
            .await
        {
            Ok(_) => Ok(true),
            Err(VoteError::DuplicateVoteRequest) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Like [`cast_vote`](Self::cast_vote), but reports the resulting score
    /// and the caller's standing vote.
    pub async fn vote(
        &self,
        caller: Caller,
        target: VoteTarget,
        value: i32,
    ) -> Result<VoteResponse, VoteError> {
        let direction = VoteDirection::from_value(value);

        match self.apply_vote(caller, target, direction).await {
            Ok(outcome) => Ok(VoteResponse {
                success: true,
                score: outcome.score,
                vote_status: Some(outcome.record.direction.value()),
            }),
            Err(VoteError::DuplicateVoteRequest) => {
                let score = self
                    .store
                    .get_score(target)
                    .await?
                    .ok_or(VoteError::TargetNotFound(target))?;

                Ok(VoteResponse {
                    success: false,
                    score,
                    vote_status: Some(direction.value()),
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Applies one transition, retrying the whole unit of work on contention.
    ///
    /// A repeated direction comes back as `VoteError::DuplicateVoteRequest`.
    pub async fn apply_vote(
        &self,
        caller: Caller,
        target: VoteTarget,
        direction: VoteDirection,
    ) -> Result<VoteOutcome, VoteError> {
        let user_id = caller.require()?;
        let mut attempt = 1;

        loop {
            match self.try_apply(user_id, target, direction).await {
                Err(err) if err.is_retryable() && attempt < self.retry.max_attempts => {
                    tracing::warn!(
                        "Vote contention on {:?} {} (attempt {}/{}): {}",
                        target.kind,
                        target.id,
                        attempt,
                        self.retry.max_attempts,
                        err
                    );
                    tokio::time::sleep(self.retry.backoff * attempt).await;
                    attempt += 1;
                }
                Err(VoteError::DuplicateVote) => {
                    tracing::error!(
                        "Second vote row for user {} on {:?} {}",
                        user_id,
                        target.kind,
                        target.id
                    );
                    return Err(VoteError::DuplicateVote);
                }
                result => return result,
            }
        }
    }

    async fn try_apply(
        &self,
        user_id: Uuid,
        target: VoteTarget,
        direction: VoteDirection,
    ) -> Result<VoteOutcome, VoteError> {
        // Dropping `unit` on any early return rolls it back.
        let mut unit = self.store.begin().await?;

        if unit.lock_target(target).await?.is_none() {
            return Err(VoteError::TargetNotFound(target));
        }

        let previous = unit
            .find_vote(user_id, target.id)
            .await?
            .map(|vote| vote.direction);
        let transition = VoteTransition::decide(previous, direction);
        let Some(delta) = transition.delta() else {
            return Err(VoteError::DuplicateVoteRequest);
        };

        let record = unit.upsert_vote(user_id, target, direction).await?;
        let score = unit.apply_delta(record.target(), delta).await?;
        unit.commit().await?;

        tracing::debug!(
            "Vote {:?} by {} on {:?} {}: score now {}",
            transition,
            user_id,
            target.kind,
            target.id,
            score
        );

        Ok(VoteOutcome {
            record,
            previous,
            score,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::memory_vote_store::MemoryVoteStore;

    async fn service_with_post() -> (VoteService<MemoryVoteStore>, VoteTarget) {
        let store = MemoryVoteStore::new(Duration::from_secs(1));
        let target = VoteTarget::post(Uuid::new_v4());
        store.insert_target(target).await.unwrap();
        (VoteService::new(store, RetryPolicy::default()), target)
    }

    #[tokio::test]
    async fn outcome_reports_previous_direction() {
        let (service, target) = service_with_post().await;
        let caller = Caller::User(Uuid::new_v4());

        let first = service
            .apply_vote(caller, target, VoteDirection::Down)
            .await
            .unwrap();
        assert_eq!(first.previous, None);
        assert_eq!(first.score, -1);

        let flipped = service
            .apply_vote(caller, target, VoteDirection::Up)
            .await
            .unwrap();
        assert_eq!(flipped.previous, Some(VoteDirection::Down));
        assert_eq!(flipped.record.direction, VoteDirection::Up);
        assert_eq!(flipped.score, 1);
    }

    #[tokio::test]
    async fn repeated_vote_response_keeps_score() {
        let (service, target) = service_with_post().await;
        let caller = Caller::User(Uuid::new_v4());

        let first = service.vote(caller, target, 1).await.unwrap();
        assert!(first.success);
        assert_eq!(first.score, 1);
        assert_eq!(first.vote_status, Some(1));

        let repeat = service.vote(caller, target, 1).await.unwrap();
        assert!(!repeat.success);
        assert_eq!(repeat.score, 1);
        assert_eq!(repeat.vote_status, Some(1));
    }

    #[tokio::test]
    async fn retry_budget_of_one_fails_fast() {
        let store = MemoryVoteStore::new(Duration::from_millis(10));
        let target = VoteTarget::post(Uuid::new_v4());
        store.insert_target(target).await.unwrap();
        let service = VoteService::new(
            store,
            RetryPolicy {
                max_attempts: 1,
                backoff: Duration::from_millis(1),
            },
        );

        let _held = service.store().begin().await.unwrap();
        let result = service
            .apply_vote(Caller::User(Uuid::new_v4()), target, VoteDirection::Up)
            .await;
        assert!(matches!(result, Err(VoteError::Contention(_))));
    }
}
