use sqlx::PgExecutor;

use crate::{error::VoteError, models::VoteTarget};

/// Row-locks the target until the surrounding transaction ends.
///
/// Returns the current score, or `None` when the target does not exist.
pub async fn lock_target<'e, E: PgExecutor<'e>>(
    executor: E,
    target: VoteTarget,
) -> Result<Option<i32>, VoteError> {
    let query = format!(
        "SELECT score FROM {} WHERE id = $1 FOR UPDATE",
        target.kind.table()
    );

    let score = sqlx::query_scalar::<_, i32>(&query)
        .bind(target.id)
        .fetch_optional(executor)
        .await?;

    Ok(score)
}

pub async fn apply_delta<'e, E: PgExecutor<'e>>(
    executor: E,
    target: VoteTarget,
    delta: i32,
) -> Result<i32, VoteError> {
    let query = format!(
        "UPDATE {} SET score = score + $2 WHERE id = $1 RETURNING score",
        target.kind.table()
    );

    sqlx::query_scalar::<_, i32>(&query)
        .bind(target.id)
        .bind(delta)
        .fetch_optional(executor)
        .await?
        .ok_or(VoteError::TargetNotFound(target))
}

pub async fn get_score<'e, E: PgExecutor<'e>>(
    executor: E,
    target: VoteTarget,
) -> Result<Option<i32>, VoteError> {
    let query = format!("SELECT score FROM {} WHERE id = $1", target.kind.table());

    let score = sqlx::query_scalar::<_, i32>(&query)
        .bind(target.id)
        .fetch_optional(executor)
        .await?;

    Ok(score)
}

pub async fn target_exists<'e, E: PgExecutor<'e>>(
    executor: E,
    target: VoteTarget,
) -> Result<bool, VoteError> {
    let query = format!(
        "SELECT EXISTS(SELECT 1 FROM {} WHERE id = $1)",
        target.kind.table()
    );

    let exists = sqlx::query_scalar::<_, bool>(&query)
        .bind(target.id)
        .fetch_one(executor)
        .await?;

    Ok(exists)
}
