use axum::{RequestPartsExt, extract::FromRequestParts, http::request::Parts};
use axum_extra::{
    TypedHeader,
    headers::{Authorization, authorization::Bearer},
};
use jsonwebtoken::{DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    AppState,
    error::{AppError, Result},
    models::Caller,
};

/// Access token claims. Tokens are issued elsewhere; this service only
/// verifies them.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user_id
    pub exp: i64,
    pub iat: i64,
    pub jti: String, // session id, must still exist in Redis
}

impl Claims {
    pub fn verify(token: &str, jwt_secret: &str) -> Result<Self> {
        let token_data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(jwt_secret.as_ref()),
            &Validation::default(),
        )?;

        Ok(token_data.claims)
    }

    pub fn user_id(&self) -> Result<Uuid> {
        Uuid::parse_str(&self.sub)
            .map_err(|_| AppError::Authentication("Invalid user ID in token".to_string()))
    }
}

#[derive(Debug)]
pub struct AuthUser {
    pub user_id: Uuid,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        let TypedHeader(Authorization(bearer)) = parts
            .extract::<TypedHeader<Authorization<Bearer>>>()
            .await
            .map_err(|_| AppError::Authentication("Missing authorization header".to_string()))?;

        let claims = Claims::verify(bearer.token(), &state.config.jwt_secret)?;

        // Check if session is still valid in Redis
        match state.redis.get_session(&claims.jti).await? {
            Some(stored_user_id) if stored_user_id == claims.sub => {}
            Some(_) => return Err(AppError::Authentication("Invalid session".to_string())),
            None => return Err(AppError::Authentication("Session expired".to_string())),
        }

        Ok(AuthUser {
            user_id: claims.user_id()?,
        })
    }
}

// Optional auth user (for endpoints that work with or without auth)
#[derive(Debug)]
pub struct OptionalAuthUser(pub Option<AuthUser>);

impl FromRequestParts<AppState> for OptionalAuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        match AuthUser::from_request_parts(parts, state).await {
            Ok(user) => Ok(OptionalAuthUser(Some(user))),
            Err(_) => Ok(OptionalAuthUser(None)),
        }
    }
}

impl From<OptionalAuthUser> for Caller {
    fn from(auth_user: OptionalAuthUser) -> Self {
        match auth_user.0 {
            Some(user) => Caller::User(user.user_id),
            None => Caller::Anonymous,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use jsonwebtoken::{EncodingKey, Header, encode};

    const SECRET: &str = "test-secret";

    fn token_for(sub: &str, expires_in: Duration) -> String {
        let now = Utc::now();
        let claims = Claims {
            sub: sub.to_string(),
            exp: (now + expires_in).timestamp(),
            iat: now.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET.as_ref()),
        )
        .unwrap()
    }

    #[test]
    fn verifies_token_and_extracts_user() {
        let user_id = Uuid::new_v4();
        let token = token_for(&user_id.to_string(), Duration::hours(1));

        let claims = Claims::verify(&token, SECRET).unwrap();
        assert_eq!(claims.user_id().unwrap(), user_id);
    }

    #[test]
    fn rejects_wrong_secret_and_expired_tokens() {
        let user_id = Uuid::new_v4().to_string();

        let token = token_for(&user_id, Duration::hours(1));
        assert!(matches!(
            Claims::verify(&token, "other-secret"),
            Err(AppError::Jwt(_))
        ));

        let expired = token_for(&user_id, Duration::hours(-2));
        assert!(matches!(
            Claims::verify(&expired, SECRET),
            Err(AppError::Jwt(_))
        ));
    }

    #[test]
    fn malformed_subject_is_an_authentication_error() {
        let token = token_for("not-a-uuid", Duration::hours(1));
        let claims = Claims::verify(&token, SECRET).unwrap();
        assert!(matches!(
            claims.user_id(),
            Err(AppError::Authentication(_))
        ));
    }

    #[test]
    fn missing_user_becomes_anonymous_caller() {
        let user_id = Uuid::new_v4();
        assert_eq!(
            Caller::from(OptionalAuthUser(Some(AuthUser { user_id }))),
            Caller::User(user_id)
        );
        assert_eq!(Caller::from(OptionalAuthUser(None)), Caller::Anonymous);
    }
}
