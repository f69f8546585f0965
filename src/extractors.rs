use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::auth::verifier::verify_bearer;
use crate::db::models::User;
use crate::error::AppError;
use crate::state::AppState;

/// The authenticated caller, resolved once per request and passed explicitly
/// into every operation that needs an identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser {
    pub id: i64,
    pub username: String,
    pub image: Option<String>,
    pub is_admin: bool,
}

impl From<User> for CurrentUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            image: user.image,
            is_admin: user.is_admin,
        }
    }
}

/// Extractor that requires a valid bearer token.
/// 401 without a usable token, 403 when the token names no live user.
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<CurrentUser>() {
            return Ok(user.clone());
        }

        let user: CurrentUser = verify_bearer(&state.tokens, state.users.as_ref(), &parts.headers)
            .await?
            .into();
        parts.extensions.insert(user.clone());
        Ok(user)
    }
}

/// An authenticated caller holding the admin role.
///
/// Built from `CurrentUser`, so anonymous requests are rejected with 401
/// before the role is ever looked at.
#[derive(Debug, Clone)]
pub struct AdminUser(pub CurrentUser);

impl FromRequestParts<AppState> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = CurrentUser::from_request_parts(parts, state).await?;
        if !user.is_admin {
            tracing::debug!(user_id = user.id, "Admin route refused");
            return Err(AppError::Forbidden);
        }
        Ok(AdminUser(user))
    }
}
