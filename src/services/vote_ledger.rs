use sqlx::PgExecutor;
use uuid::Uuid;

use crate::{
    error::VoteError,
    models::{VoteDirection, VoteRecord, VoteTarget},
};

pub async fn find_vote<'e, E: PgExecutor<'e>>(
    executor: E,
    user_id: Uuid,
    target_id: Uuid,
) -> Result<Option<VoteRecord>, VoteError> {
    let vote = sqlx::query_as::<_, VoteRecord>(
        r#"
        SELECT user_id, target_id, target_kind, direction, created_at, updated_at
        FROM votes
        WHERE user_id = $1 AND target_id = $2
        "#,
    )
    .bind(user_id)
    .bind(target_id)
    .fetch_optional(executor)
    .await?;

    Ok(vote)
}

/// The viewer's votes among `target_ids`, in no particular order.
pub async fn find_votes_for_targets<'e, E: PgExecutor<'e>>(
    executor: E,
    user_id: Uuid,
    target_ids: &[Uuid],
) -> Result<Vec<VoteRecord>, VoteError> {
    if target_ids.is_empty() {
        return Ok(Vec::new());
    }

    let votes = sqlx::query_as::<_, VoteRecord>(
        r#"
        SELECT user_id, target_id, target_kind, direction, created_at, updated_at
        FROM votes
        WHERE user_id = $1 AND target_id = ANY($2)
        "#,
    )
    .bind(user_id)
    .bind(target_ids)
    .fetch_all(executor)
    .await?;

    Ok(votes)
}

/// Overwrites the direction of an existing row, otherwise inserts one.
///
/// The insert branch is only reached when no row exists for the pair. A
/// unique violation there means a second writer slipped past the target
/// lock and surfaces as `VoteError::DuplicateVote`.
pub async fn upsert_vote(
    conn: &mut sqlx::PgConnection,
    user_id: Uuid,
    target: VoteTarget,
    direction: VoteDirection,
) -> Result<VoteRecord, VoteError> {
    let updated = sqlx::query_as::<_, VoteRecord>(
        r#"
        UPDATE votes
        SET direction = $3, updated_at = NOW()
        WHERE user_id = $1 AND target_id = $2
        RETURNING user_id, target_id, target_kind, direction, created_at, updated_at
        "#,
    )
    .bind(user_id)
    .bind(target.id)
    .bind(direction)
    .fetch_optional(&mut *conn)
    .await?;

    if let Some(vote) = updated {
        return Ok(vote);
    }

    let inserted = sqlx::query_as::<_, VoteRecord>(
        r#"
        INSERT INTO votes (user_id, target_id, target_kind, direction, created_at, updated_at)
        VALUES ($1, $2, $3, $4, NOW(), NOW())
        RETURNING user_id, target_id, target_kind, direction, created_at, updated_at
        "#,
    )
    .bind(user_id)
    .bind(target.id)
    .bind(target.kind)
    .bind(direction)
    .fetch_one(&mut *conn)
    .await?;

    Ok(inserted)
}

pub async fn delete_all_for_target<'e, E: PgExecutor<'e>>(
    executor: E,
    target_id: Uuid,
) -> Result<u64, VoteError> {
    let result = sqlx::query("DELETE FROM votes WHERE target_id = $1")
        .bind(target_id)
        .execute(executor)
        .await?;

    Ok(result.rows_affected())
}

pub async fn delete_all_for_post_comments<'e, E: PgExecutor<'e>>(
    executor: E,
    post_id: Uuid,
) -> Result<u64, VoteError> {
    let result = sqlx::query(
        r#"
        DELETE FROM votes
        WHERE target_kind = 'comment'
          AND target_id IN (SELECT id FROM comments WHERE post_id = $1)
        "#,
    )
    .bind(post_id)
    .execute(executor)
    .await?;

    Ok(result.rows_affected())
}
