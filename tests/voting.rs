//! Voting behaviour against the in-memory store.

use std::sync::Arc;
use std::time::Duration;

use board_votes::error::VoteError;
use board_votes::models::{Caller, VoteDirection, VoteTarget};
use board_votes::services::memory_vote_store::MemoryVoteStore;
use board_votes::services::vote_service::{RetryPolicy, VoteService};
use board_votes::services::vote_store::{TargetResolver, VoteStore};
use uuid::Uuid;

fn service(lock_timeout: Duration, retry: RetryPolicy) -> VoteService<MemoryVoteStore> {
    VoteService::new(MemoryVoteStore::new(lock_timeout), retry)
}

async fn board_with_post() -> (VoteService<MemoryVoteStore>, VoteTarget) {
    let service = service(Duration::from_secs(5), RetryPolicy::default());
    let post = VoteTarget::post(Uuid::new_v4());
    service.store().insert_target(post).await.unwrap();
    (service, post)
}

async fn score(service: &VoteService<MemoryVoteStore>, target: VoteTarget) -> i32 {
    service.store().get_score(target).await.unwrap().unwrap()
}

/// Score must equal the sum of the directions recorded for the target.
async fn assert_consistent(service: &VoteService<MemoryVoteStore>, target: VoteTarget) {
    let votes = service.store().votes_for_target(target.id).await.unwrap();
    let sum: i32 = votes
        .iter()
        .map(|vote| i32::from(vote.direction.value()))
        .sum();
    assert_eq!(score(service, target).await, sum);
}

async fn direction_of(
    service: &VoteService<MemoryVoteStore>,
    user_id: Uuid,
    target: VoteTarget,
) -> Option<VoteDirection> {
    service
        .store()
        .find_vote(user_id, target.id)
        .await
        .unwrap()
        .map(|vote| vote.direction)
}

#[tokio::test]
async fn walkthrough_of_two_voters() {
    let (service, post) = board_with_post().await;
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();

    assert!(service.cast_vote(Caller::User(alice), post, 1).await.unwrap());
    assert_eq!(score(&service, post).await, 1);
    assert_eq!(direction_of(&service, alice, post).await, Some(VoteDirection::Up));

    assert!(!service.cast_vote(Caller::User(alice), post, 1).await.unwrap());
    assert_eq!(score(&service, post).await, 1);

    assert!(service.cast_vote(Caller::User(alice), post, -1).await.unwrap());
    assert_eq!(score(&service, post).await, -1);
    assert_eq!(direction_of(&service, alice, post).await, Some(VoteDirection::Down));

    assert!(service.cast_vote(Caller::User(bob), post, -1).await.unwrap());
    assert_eq!(score(&service, post).await, -2);
    assert_eq!(direction_of(&service, bob, post).await, Some(VoteDirection::Down));

    assert!(service.cast_vote(Caller::User(bob), post, 1).await.unwrap());
    assert_eq!(score(&service, post).await, 0);
    assert_eq!(direction_of(&service, bob, post).await, Some(VoteDirection::Up));

    assert_consistent(&service, post).await;
}

#[tokio::test]
async fn repeated_downvote_is_rejected_without_changes() {
    let (service, post) = board_with_post().await;
    let caller = Caller::User(Uuid::new_v4());

    assert!(service.cast_vote(caller, post, -1).await.unwrap());
    let before = service.store().votes_for_target(post.id).await.unwrap();

    assert!(!service.cast_vote(caller, post, -1).await.unwrap());
    assert_eq!(score(&service, post).await, -1);
    assert_eq!(service.store().votes_for_target(post.id).await.unwrap(), before);

    let repeat = service
        .apply_vote(caller, post, VoteDirection::Down)
        .await;
    assert!(matches!(repeat, Err(VoteError::DuplicateVoteRequest)));
}

#[tokio::test]
async fn flip_moves_score_by_two() {
    let (service, post) = board_with_post().await;
    let caller = Caller::User(Uuid::new_v4());
    let start = score(&service, post).await;

    service.cast_vote(caller, post, 1).await.unwrap();
    let after_up = score(&service, post).await;
    service.cast_vote(caller, post, -1).await.unwrap();
    let after_down = score(&service, post).await;

    assert_eq!(after_down - after_up, -2);
    assert_eq!(after_down - start, -1);
    assert_eq!(service.store().votes_for_target(post.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn values_other_than_one_count_as_downvotes() {
    let (service, post) = board_with_post().await;

    for value in [0, 2, -7] {
        let caller = Caller::User(Uuid::new_v4());
        assert!(service.cast_vote(caller, post, value).await.unwrap());
        assert_eq!(
            direction_of(&service, caller.user_id().unwrap(), post).await,
            Some(VoteDirection::Down)
        );
    }

    assert_eq!(score(&service, post).await, -3);
}

#[tokio::test]
async fn posts_and_comments_keep_separate_scores() {
    let (service, post) = board_with_post().await;
    let comment = VoteTarget::comment(Uuid::new_v4());
    service.store().insert_target(comment).await.unwrap();
    let caller = Caller::User(Uuid::new_v4());

    service.cast_vote(caller, post, 1).await.unwrap();
    service.cast_vote(caller, comment, -1).await.unwrap();

    assert_eq!(score(&service, post).await, 1);
    assert_eq!(score(&service, comment).await, -1);
    assert_consistent(&service, post).await;
    assert_consistent(&service, comment).await;
}

#[tokio::test]
async fn anonymous_caller_is_rejected() {
    let (service, post) = board_with_post().await;

    let result = service.cast_vote(Caller::Anonymous, post, 1).await;
    assert!(matches!(result, Err(VoteError::Unauthenticated)));
    assert_eq!(score(&service, post).await, 0);
}

#[tokio::test]
async fn unknown_target_is_rejected_before_any_write() {
    let (service, _) = board_with_post().await;
    let missing = VoteTarget::comment(Uuid::new_v4());
    let caller = Caller::User(Uuid::new_v4());

    let result = service.cast_vote(caller, missing, 1).await;
    assert!(matches!(result, Err(VoteError::TargetNotFound(t)) if t == missing));
    assert!(service.store().votes_for_target(missing.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn deleted_target_takes_its_votes_along() {
    let (service, post) = board_with_post().await;
    for _ in 0..3 {
        service
            .cast_vote(Caller::User(Uuid::new_v4()), post, 1)
            .await
            .unwrap();
    }

    assert_eq!(service.store().remove_target(post).await.unwrap(), 3);
    let result = service.cast_vote(Caller::User(Uuid::new_v4()), post, 1).await;
    assert!(matches!(result, Err(VoteError::TargetNotFound(_))));
}

#[tokio::test]
async fn failed_score_write_on_first_vote_rolls_back() {
    let (service, post) = board_with_post().await;
    let user_id = Uuid::new_v4();

    service.store().fail_next_score_writes(1);
    let result = service.cast_vote(Caller::User(user_id), post, 1).await;

    assert!(matches!(result, Err(VoteError::Storage(_))));
    assert_eq!(score(&service, post).await, 0);
    assert_eq!(direction_of(&service, user_id, post).await, None);

    // The failure is not sticky: the same request now goes through.
    assert!(service.cast_vote(Caller::User(user_id), post, 1).await.unwrap());
    assert_eq!(score(&service, post).await, 1);
}

#[tokio::test]
async fn failed_score_write_on_flip_keeps_previous_vote() {
    let (service, post) = board_with_post().await;
    let user_id = Uuid::new_v4();
    service.cast_vote(Caller::User(user_id), post, 1).await.unwrap();

    service.store().fail_next_score_writes(1);
    let result = service.cast_vote(Caller::User(user_id), post, -1).await;

    assert!(matches!(result, Err(VoteError::Storage(_))));
    assert_eq!(score(&service, post).await, 1);
    assert_eq!(direction_of(&service, user_id, post).await, Some(VoteDirection::Up));
    assert_consistent(&service, post).await;
}

#[tokio::test]
async fn concurrent_first_votes_all_count() {
    const VOTERS: usize = 64;

    let (service, post) = board_with_post().await;
    let service = Arc::new(service);

    let mut handles = Vec::with_capacity(VOTERS);
    for _ in 0..VOTERS {
        let service = Arc::clone(&service);
        handles.push(tokio::spawn(async move {
            service.cast_vote(Caller::User(Uuid::new_v4()), post, 1).await
        }));
    }
    for handle in handles {
        assert!(handle.await.unwrap().unwrap());
    }

    assert_eq!(score(&service, post).await, VOTERS as i32);
    assert_eq!(
        service.store().votes_for_target(post.id).await.unwrap().len(),
        VOTERS
    );
}

#[tokio::test]
async fn racing_requests_from_one_caller_serialize() {
    let (service, post) = board_with_post().await;
    let service = Arc::new(service);
    let caller = Caller::User(Uuid::new_v4());

    let mut handles = Vec::new();
    for value in [1, 1, -1, 1, -1, -1, 1, -1] {
        let service = Arc::clone(&service);
        handles.push(tokio::spawn(
            async move { service.cast_vote(caller, post, value).await },
        ));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let votes = service.store().votes_for_target(post.id).await.unwrap();
    assert_eq!(votes.len(), 1);
    assert_eq!(score(&service, post).await, i32::from(votes[0].direction.value()));
}

#[tokio::test]
async fn contention_is_retried_until_the_lock_frees_up() {
    let service = Arc::new(service(
        Duration::from_millis(30),
        RetryPolicy {
            max_attempts: 10,
            backoff: Duration::from_millis(20),
        },
    ));
    let post = VoteTarget::post(Uuid::new_v4());
    service.store().insert_target(post).await.unwrap();

    let held = service.store().begin().await.unwrap();
    let voter = {
        let service = Arc::clone(&service);
        tokio::spawn(async move {
            service
                .cast_vote(Caller::User(Uuid::new_v4()), post, 1)
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(60)).await;
    drop(held);

    assert!(voter.await.unwrap().unwrap());
    assert_eq!(score(&service, post).await, 1);
}

#[tokio::test]
async fn contention_surfaces_after_the_retry_budget() {
    let service = service(
        Duration::from_millis(10),
        RetryPolicy {
            max_attempts: 3,
            backoff: Duration::from_millis(1),
        },
    );
    let post = VoteTarget::post(Uuid::new_v4());
    service.store().insert_target(post).await.unwrap();

    let _held = service.store().begin().await.unwrap();
    let result = service
        .cast_vote(Caller::User(Uuid::new_v4()), post, 1)
        .await;

    assert!(matches!(result, Err(VoteError::Contention(_))));
}
