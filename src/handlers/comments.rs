use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use serde_json::{Value, json};
use uuid::Uuid;

use crate::{
    AppState,
    auth::{AuthUser, OptionalAuthUser},
    error::{AppError, Result},
    handlers::votes::vote_on_target,
    models::{CreateCommentRequest, VoteRequest, VoteResponse, VoteTarget},
    services::{comment_service, vote_store::TargetResolver},
};

pub async fn create_comment(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(payload): Json<CreateCommentRequest>,
) -> Result<(StatusCode, Json<Value>)> {
    // Check that the post exists
    if !state
        .votes
        .store()
        .exists(VoteTarget::post(payload.post_id))
        .await?
    {
        return Err(AppError::NotFound("Post not found".to_string()));
    }

    let comment_id =
        comment_service::create_comment(&state.db, auth_user.user_id, &payload).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "Comment created successfully",
            "comment_id": comment_id
        })),
    ))
}

pub async fn delete_comment(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(comment_id): Path<Uuid>,
) -> Result<Json<Value>> {
    let comment = comment_service::get_comment_by_id(&state.db, comment_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Comment not found".to_string()))?;

    if comment.author_id != auth_user.user_id {
        return Err(AppError::Authorization(
            "Not authorized to delete this comment".to_string(),
        ));
    }

    let deleted = comment_service::delete_comment(&state.db, comment_id).await?;

    Ok(Json(json!({
        "deleted": deleted
    })))
}

pub async fn vote_comment(
    State(state): State<AppState>,
    auth_user: OptionalAuthUser,
    Path(comment_id): Path<Uuid>,
    Json(payload): Json<VoteRequest>,
) -> Result<Json<VoteResponse>> {
    let response = vote_on_target(
        &state,
        auth_user,
        VoteTarget::comment(comment_id),
        payload.value,
    )
    .await?;
    Ok(Json(response))
}
