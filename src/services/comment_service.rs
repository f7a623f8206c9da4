use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    models::{Comment, CreateCommentRequest},
    services::vote_ledger,
};

pub async fn create_comment(
    db: &PgPool,
    author_id: Uuid,
    payload: &CreateCommentRequest,
) -> Result<Uuid> {
    let comment_id = Uuid::new_v4();
    let now = chrono::Utc::now();

    sqlx::query(
        r#"
        INSERT INTO comments (id, post_id, text, author_id, score, created_at, updated_at)
        VALUES ($1, $2, $3, $4, 0, $5, $6)
        "#,
    )
    .bind(comment_id)
    .bind(payload.post_id)
    .bind(&payload.text)
    .bind(author_id)
    .bind(now)
    .bind(now)
    .execute(db)
    .await
    .map_err(|err| {
        // The post can be deleted between the caller's check and this insert.
        if err
            .as_database_error()
            .is_some_and(|db_err| db_err.is_foreign_key_violation())
        {
            AppError::NotFound("Post not found".to_string())
        } else {
            AppError::Database(err)
        }
    })?;

    Ok(comment_id)
}

pub async fn get_comment_by_id(db: &PgPool, comment_id: Uuid) -> Result<Option<Comment>> {
    let comment = sqlx::query_as::<_, Comment>(
        r#"
        SELECT id, post_id, text, author_id, score, created_at, updated_at
        FROM comments
        WHERE id = $1
        "#,
    )
    .bind(comment_id)
    .fetch_optional(db)
    .await?;

    Ok(comment)
}

/// Newest first.
pub async fn get_post_comments(
    db: &PgPool,
    post_id: Uuid,
    limit: i64,
    offset: i64,
) -> Result<Vec<Comment>> {
    let comments = sqlx::query_as::<_, Comment>(
        r#"
        SELECT id, post_id, text, author_id, score, created_at, updated_at
        FROM comments
        WHERE post_id = $1
        ORDER BY created_at DESC, id DESC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(post_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(db)
    .await?;

    Ok(comments)
}

/// Deletes a comment and the votes cast on it in one transaction.
pub async fn delete_comment(db: &PgPool, comment_id: Uuid) -> Result<bool> {
    let mut tx = db.begin().await?;

    let locked: Option<Uuid> =
        sqlx::query_scalar("SELECT id FROM comments WHERE id = $1 FOR UPDATE")
            .bind(comment_id)
            .fetch_optional(&mut *tx)
            .await?;
    if locked.is_none() {
        return Ok(false);
    }

    let votes = vote_ledger::delete_all_for_target(&mut *tx, comment_id).await?;

    sqlx::query("DELETE FROM comments WHERE id = $1")
        .bind(comment_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    tracing::info!("Deleted comment {} with {} votes", comment_id, votes);

    Ok(true)
}
