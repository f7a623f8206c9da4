use crate::{
    AppState,
    auth::OptionalAuthUser,
    error::{AppError, Result},
    models::{Caller, VoteResponse, VoteTarget},
};

/// Shared body of the post and comment vote routes.
pub async fn vote_on_target(
    state: &AppState,
    auth_user: OptionalAuthUser,
    target: VoteTarget,
    value: i32,
) -> Result<VoteResponse> {
    let caller = Caller::from(auth_user);
    let user_id = caller.require()?;

    // Rate limiting for voting
    let rate_limit_key = format!("vote:{}", user_id);
    if !state
        .redis
        .check_rate_limit(&rate_limit_key, state.config.vote_rate_limit, 3600)
        .await?
    {
        return Err(AppError::RateLimit);
    }

    let response = state.votes.vote(caller, target, value).await?;
    Ok(response)
}
