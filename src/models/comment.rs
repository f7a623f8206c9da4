use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Comment {
    pub id: Uuid,
    pub post_id: Uuid,
    pub text: String,
    pub author_id: Uuid,
    pub score: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// Create comment request
#[derive(Debug, Deserialize)]
pub struct CreateCommentRequest {
    pub text: String,
    pub post_id: Uuid,
}

// Comment response with the viewer's vote
#[derive(Debug, Serialize)]
pub struct CommentResponse {
    pub id: Uuid,
    pub post_id: Uuid,
    pub text: String,
    pub author_id: Uuid,
    pub score: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub vote_status: Option<i16>,
}

impl CommentResponse {
    pub fn new(comment: Comment, vote_status: Option<i16>) -> Self {
        Self {
            id: comment.id,
            post_id: comment.post_id,
            text: comment.text,
            author_id: comment.author_id,
            score: comment.score,
            created_at: comment.created_at,
            updated_at: comment.updated_at,
            vote_status,
        }
    }
}
