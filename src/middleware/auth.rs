use axum::{extract::FromRequestParts, http::header};
use jsonwebtoken::{DecodingKey, Validation, decode};
use std::str::FromStr;
use uuid::Uuid;

use crate::{dto::auth::Claims, error::AppError, lifecycle::Role};

#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub role: Role,
}

pub fn ensure_role(user: &AuthUser, role: Role) -> Result<(), AppError> {
    if user.role != role {
        return Err(AppError::Forbidden);
    }
    Ok(())
}

pub fn ensure_customer(user: &AuthUser) -> Result<(), AppError> {
    ensure_role(user, Role::Customer)
}

pub fn ensure_restaurant(user: &AuthUser) -> Result<(), AppError> {
    ensure_role(user, Role::Restaurant)
}

pub fn ensure_rider(user: &AuthUser) -> Result<(), AppError> {
    ensure_role(user, Role::Rider)
}

/// Decode a bearer token into an [`AuthUser`]. Shared between the HTTP
/// extractor and the websocket handshake, which carries the token as a
/// query parameter.
pub fn decode_token(token: &str) -> Result<AuthUser, AppError> {
    let secret = std::env::var("JWT_SECRET")
        .map_err(|_| AppError::Internal(anyhow::anyhow!("JWT_SECRET is not set")))?;

    let decoded = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| AppError::Unauthorized)?;

    let user_id = Uuid::parse_str(&decoded.claims.sub).map_err(|_| AppError::Unauthorized)?;
    let role = Role::from_str(&decoded.claims.role).map_err(|_| AppError::Unauthorized)?;

    Ok(AuthUser { user_id, role })
}

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;
    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(header::AUTHORIZATION)
            .ok_or_else(|| AppError::BadRequest("Missing Authorization header".into()))?;

        let auth_str = auth_header
            .to_str()
            .map_err(|_| AppError::BadRequest("Invalid Authorization header".into()))?;

        if !auth_str.starts_with("Bearer ") {
            return Err(AppError::BadRequest("Invalid Authorization scheme".into()));
        }
        let token = auth_str.trim_start_matches("Bearer ").trim();

        decode_token(token)
    }
}
