use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use serde::Deserialize;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::{
    AppState,
    auth::{AuthUser, OptionalAuthUser},
    error::{AppError, Result},
    handlers::votes::vote_on_target,
    models::{
        Caller, CommentResponse, CreatePostRequest, PostResponse, UpdatePostRequest, VoteDirection,
        VoteRequest, VoteResponse, VoteTarget,
    },
    services::{comment_service, post_service, vote_loader::VoteStatusLoader},
};

#[derive(Debug, Deserialize)]
pub struct GetPostsQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl GetPostsQuery {
    /// Page, page size and row offset. The offset is widened so no page
    /// number can overflow it.
    fn window(&self, default_limit: u32) -> (u32, u32, i64) {
        let page = self.page.unwrap_or(1).max(1);
        let limit = self.limit.unwrap_or(default_limit).clamp(1, 100); // Max 100 per page
        let offset = i64::from(page - 1) * i64::from(limit);
        (page, limit, offset)
    }
}

fn page_count(total: i64, limit: u32) -> i64 {
    let limit = i64::from(limit.max(1));
    (total.max(0) + limit - 1) / limit
}

pub async fn create_post(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(payload): Json<CreatePostRequest>,
) -> Result<(StatusCode, Json<Value>)> {
    let post_id = post_service::create_post(&state.db, auth_user.user_id, &payload).await?;

    tracing::info!("Post {} created by {}", post_id, auth_user.user_id);

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Post created successfully",
            "post_id": post_id
        })),
    ))
}

pub async fn get_posts(
    State(state): State<AppState>,
    Query(params): Query<GetPostsQuery>,
    auth_user: OptionalAuthUser,
) -> Result<Json<Value>> {
    let (page, limit, offset) = params.window(25);

    let posts = post_service::get_posts(&state.db, i64::from(limit), offset).await?;
    let total_count = post_service::get_posts_count(&state.db).await?;

    let mut loader = VoteStatusLoader::new(state.votes.store(), Caller::from(auth_user));
    let post_ids: Vec<Uuid> = posts.iter().map(|post| post.id).collect();
    let statuses = loader.load_many(&post_ids).await?;

    let posts: Vec<PostResponse> = posts
        .into_iter()
        .zip(statuses)
        .map(|(post, status)| PostResponse::new(post, status.map(VoteDirection::value)))
        .collect();

    Ok(Json(json!({
        "posts": posts,
        "pagination": {
            "page": page,
            "limit": limit,
            "total": total_count,
            "pages": page_count(total_count, limit)
        }
    })))
}

/// A post with its newest comments, both carrying the viewer's votes.
pub async fn get_post(
    State(state): State<AppState>,
    Path(post_id): Path<Uuid>,
    Query(params): Query<GetPostsQuery>,
    auth_user: OptionalAuthUser,
) -> Result<Json<Value>> {
    let post = post_service::get_post_by_id(&state.db, post_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Post not found".to_string()))?;

    let (_, limit, offset) = params.window(50);
    let comments =
        comment_service::get_post_comments(&state.db, post_id, i64::from(limit), offset).await?;

    let mut loader = VoteStatusLoader::new(state.votes.store(), Caller::from(auth_user));
    let post_status = loader.load(post.id).await?;
    let comment_ids: Vec<Uuid> = comments.iter().map(|comment| comment.id).collect();
    let comment_statuses = loader.load_many(&comment_ids).await?;

    let comments: Vec<CommentResponse> = comments
        .into_iter()
        .zip(comment_statuses)
        .map(|(comment, status)| CommentResponse::new(comment, status.map(VoteDirection::value)))
        .collect();

    Ok(Json(json!({
        "post": PostResponse::new(post, post_status.map(VoteDirection::value)),
        "comments": comments
    })))
}

pub async fn update_post(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(post_id): Path<Uuid>,
    Json(payload): Json<UpdatePostRequest>,
) -> Result<Json<PostResponse>> {
    let post = post_service::get_post_by_id(&state.db, post_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Post not found".to_string()))?;

    if post.author_id != auth_user.user_id {
        return Err(AppError::Authorization(
            "Not authorized to update this post".to_string(),
        ));
    }

    post_service::update_post(&state.db, post_id, &payload).await?;

    let updated = post_service::get_post_by_id(&state.db, post_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Post not found".to_string()))?;
    let vote_status = VoteStatusLoader::new(state.votes.store(), Caller::User(auth_user.user_id))
        .load(post_id)
        .await?;

    Ok(Json(PostResponse::new(
        updated,
        vote_status.map(VoteDirection::value),
    )))
}

pub async fn delete_post(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(post_id): Path<Uuid>,
) -> Result<Json<Value>> {
    let post = post_service::get_post_by_id(&state.db, post_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Post not found".to_string()))?;

    if post.author_id != auth_user.user_id {
        return Err(AppError::Authorization(
            "Not authorized to delete this post".to_string(),
        ));
    }

    let deleted = post_service::delete_post(&state.db, post_id).await?;

    Ok(Json(json!({
        "deleted": deleted
    })))
}

pub async fn vote_post(
    State(state): State<AppState>,
    auth_user: OptionalAuthUser,
    Path(post_id): Path<Uuid>,
    Json(payload): Json<VoteRequest>,
) -> Result<Json<VoteResponse>> {
    let response = vote_on_target(&state, auth_user, VoteTarget::post(post_id), payload.value).await?;
    Ok(Json(response))
}
