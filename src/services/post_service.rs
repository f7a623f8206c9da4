use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    error::Result,
    models::{CreatePostRequest, Post, UpdatePostRequest},
    services::vote_ledger,
};

const POST_SELECT: &str = r#"
    SELECT
        p.id, p.title, p.text, p.author_id, p.score, p.created_at, p.updated_at,
        (SELECT COUNT(*) FROM comments c WHERE c.post_id = p.id) AS comment_count
    FROM posts p
"#;

pub async fn create_post(
    db: &PgPool,
    author_id: Uuid,
    payload: &CreatePostRequest,
) -> Result<Uuid> {
    let post_id = Uuid::new_v4();
    let now = chrono::Utc::now();

    sqlx::query(
        r#"
        INSERT INTO posts (id, title, text, author_id, score, created_at, updated_at)
        VALUES ($1, $2, $3, $4, 0, $5, $6)
        "#,
    )
    .bind(post_id)
    .bind(&payload.title)
    .bind(&payload.text)
    .bind(author_id)
    .bind(now)
    .bind(now)
    .execute(db)
    .await?;

    Ok(post_id)
}

pub async fn get_post_by_id(db: &PgPool, post_id: Uuid) -> Result<Option<Post>> {
    let query = format!("{} WHERE p.id = $1", POST_SELECT);
    let post = sqlx::query_as::<_, Post>(&query)
        .bind(post_id)
        .fetch_optional(db)
        .await?;

    Ok(post)
}

/// Newest first.
pub async fn get_posts(db: &PgPool, limit: i64, offset: i64) -> Result<Vec<Post>> {
    let query = format!(
        "{} ORDER BY p.created_at DESC, p.id DESC LIMIT $1 OFFSET $2",
        POST_SELECT
    );
    let posts = sqlx::query_as::<_, Post>(&query)
        .bind(limit)
        .bind(offset)
        .fetch_all(db)
        .await?;

    Ok(posts)
}

pub async fn get_posts_count(db: &PgPool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM posts")
        .fetch_one(db)
        .await?;

    Ok(count)
}

/// Score is never touched here; it only moves through votes.
pub async fn update_post(db: &PgPool, post_id: Uuid, payload: &UpdatePostRequest) -> Result<()> {
    sqlx::query("UPDATE posts SET title = $2, text = $3, updated_at = NOW() WHERE id = $1")
        .bind(post_id)
        .bind(&payload.title)
        .bind(&payload.text)
        .execute(db)
        .await?;

    Ok(())
}

/// Deletes a post, its comments and every vote cast on either.
///
/// The post and comment rows are locked first, so a vote transaction that is
/// waiting on them finds the target gone instead of leaving an orphan vote.
pub async fn delete_post(db: &PgPool, post_id: Uuid) -> Result<bool> {
    let mut tx = db.begin().await?;

    let locked: Option<Uuid> = sqlx::query_scalar("SELECT id FROM posts WHERE id = $1 FOR UPDATE")
        .bind(post_id)
        .fetch_optional(&mut *tx)
        .await?;
    if locked.is_none() {
        return Ok(false);
    }

    sqlx::query("SELECT id FROM comments WHERE post_id = $1 FOR UPDATE")
        .bind(post_id)
        .execute(&mut *tx)
        .await?;

    let comment_votes = vote_ledger::delete_all_for_post_comments(&mut *tx, post_id).await?;
    let post_votes = vote_ledger::delete_all_for_target(&mut *tx, post_id).await?;

    // Comments go with the post through ON DELETE CASCADE.
    sqlx::query("DELETE FROM posts WHERE id = $1")
        .bind(post_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    tracing::info!(
        "Deleted post {} with {} post votes and {} comment votes",
        post_id,
        post_votes,
        comment_votes
    );

    Ok(true)
}
