use axum::http::{header, HeaderMap};

use crate::auth::token::TokenKeys;
use crate::db::models::User;
use crate::error::{AppError, AppResult};
use crate::users::UserRepository;

/// Token from `Authorization: Bearer <token>`, if present and non-empty.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Resolve the caller behind a bearer token.
///
/// No token, or a token failing signature/expiry checks, is
/// `Unauthenticated`; a good token naming no live user is `Unauthorized`.
pub async fn verify_bearer(
    keys: &TokenKeys,
    users: &dyn UserRepository,
    headers: &HeaderMap,
) -> AppResult<User> {
    let token = bearer_token(headers).ok_or(AppError::Unauthenticated)?;

    let user_id = keys.verify(token).map_err(|e| {
        tracing::debug!("Rejected bearer token: {}", e);
        AppError::from(e)
    })?;

    users.find_by_id(user_id).await?.ok_or_else(|| {
        tracing::debug!(user_id, "Bearer token names no live user");
        AppError::Unauthorized
    })
}
