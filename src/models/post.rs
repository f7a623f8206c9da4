use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

const SNIPPET_LENGTH: usize = 75;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Post {
    pub id: Uuid,
    pub title: String,
    pub text: String,
    pub author_id: Uuid,
    pub score: i32,
    pub comment_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// Create post request
#[derive(Debug, Deserialize)]
pub struct CreatePostRequest {
    pub title: String,
    pub text: String,
}

// Update post request
#[derive(Debug, Deserialize)]
pub struct UpdatePostRequest {
    pub title: String,
    pub text: String,
}

// Post response with the viewer's vote
#[derive(Debug, Serialize)]
pub struct PostResponse {
    pub id: Uuid,
    pub title: String,
    pub text: String,
    pub text_snippet: String,
    pub author_id: Uuid,
    pub score: i32,
    pub comment_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub vote_status: Option<i16>,
}

impl PostResponse {
    pub fn new(post: Post, vote_status: Option<i16>) -> Self {
        let text_snippet = post.text.chars().take(SNIPPET_LENGTH).collect();
        Self {
            id: post.id,
            title: post.title,
            text: post.text,
            text_snippet,
            author_id: post.author_id,
            score: post.score,
            comment_count: post.comment_count,
            created_at: post.created_at,
            updated_at: post.updated_at,
            vote_status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snippet_is_cut_on_characters() {
        let now = Utc::now();
        let post = Post {
            id: Uuid::new_v4(),
            title: "title".to_string(),
            text: "é".repeat(100),
            author_id: Uuid::new_v4(),
            score: 3,
            comment_count: 0,
            created_at: now,
            updated_at: now,
        };

        let response = PostResponse::new(post, Some(1));
        assert_eq!(response.text_snippet.chars().count(), SNIPPET_LENGTH);
        assert_eq!(response.vote_status, Some(1));
        assert_eq!(response.score, 3);
    }
}
