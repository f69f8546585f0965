use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::auth::google::DynIdentityProvider;
use crate::auth::password::{hash_password, verify_password};
use crate::auth::provision::provision_user;
use crate::db::models::{NewUser, User};
use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::state::AppState;

pub const MIN_PASSWORD_CHARS: usize = 8;

// -- Request / response types --

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub username: String,
    pub password: String,
    pub image: Option<String>,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub error: Option<String>,
}

#[derive(Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: User,
}

fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}

fn identity_provider(state: &AppState) -> AppResult<&DynIdentityProvider> {
    state.identity_provider.as_ref().ok_or(AppError::NotFound)
}

// -- Local credentials --

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<AuthResponse>)> {
    let email = req.email.trim().to_lowercase();
    let username = req.username.trim().to_string();
    if email.is_empty() || username.is_empty() {
        return Err(AppError::InvalidArgument(
            "Email and username are required".to_string(),
        ));
    }
    if req.password.chars().count() < MIN_PASSWORD_CHARS {
        return Err(AppError::InvalidArgument(format!(
            "Password must be at least {MIN_PASSWORD_CHARS} characters"
        )));
    }

    // bcrypt blocks for tens of milliseconds per hash
    let cost = state.config.auth.bcrypt_cost;
    let password = req.password;
    let password_hash = tokio::task::spawn_blocking(move || hash_password(&password, cost))
        .await
        .map_err(|e| AppError::Internal(format!("hashing task failed: {e}")))?
        .map_err(|e| AppError::Internal(format!("password hashing failed: {e}")))?;

    let user = state
        .users
        .insert(&NewUser {
            email,
            username,
            image: req.image.filter(|i| !i.trim().is_empty()),
            password_hash,
        })
        .await?;
    tracing::info!(user_id = user.id, username = %user.username, "Registered user");

    let token = state.tokens.issue(user.id)?;
    Ok((StatusCode::CREATED, Json(AuthResponse { token, user })))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    let email = req.email.trim().to_lowercase();
    let user = state
        .users
        .find_by_email(&email)
        .await?
        .ok_or(AppError::Unauthenticated)?;

    let hash = user.password_hash.clone();
    let password = req.password;
    let valid = tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .map_err(|e| AppError::Internal(format!("verify task failed: {e}")))?;
    if !valid {
        tracing::debug!(user_id = user.id, "Login refused");
        return Err(AppError::Unauthenticated);
    }

    let token = state.tokens.issue(user.id)?;
    Ok(Json(AuthResponse { token, user }))
}

pub async fn me(State(state): State<AppState>, user: CurrentUser) -> AppResult<Json<User>> {
    let user = state
        .users
        .find_by_id(user.id)
        .await?
        .ok_or(AppError::Unauthorized)?;
    Ok(Json(user))
}

// -- Google sign-on --

pub async fn google_start(State(state): State<AppState>) -> AppResult<Response> {
    let url = identity_provider(&state)?.authorize_url()?;
    Ok(found(url.as_str()))
}

pub async fn google_callback(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
) -> AppResult<Response> {
    let provider = identity_provider(&state)?;
    let oauth = state.config.oauth.as_ref().ok_or(AppError::NotFound)?;

    if let Some(error) = query.error {
        tracing::debug!(%error, "Sign-on declined at provider");
        return Err(AppError::Unauthenticated);
    }
    let code = query
        .code
        .filter(|c| !c.is_empty())
        .ok_or_else(|| AppError::InvalidArgument("Missing authorization code".to_string()))?;

    let profile = provider.exchange_code(&code).await?;
    let user = provision_user(
        state.users.as_ref(),
        &profile,
        state.config.provisioning.max_username_attempts,
    )
    .await?;
    let token = state.tokens.issue(user.id)?;

    let mut redirect = Url::parse(&oauth.client_redirect)
        .map_err(|e| AppError::Internal(format!("bad client_redirect: {e}")))?;
    redirect.query_pairs_mut().append_pair("token", &token);
    Ok(found(redirect.as_str()))
}
