use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::db::models::{Comment, Friend, LikeTarget, Notification, Report};
use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct CommentRequest {
    pub body: String,
}

#[derive(Deserialize)]
pub struct ReportRequest {
    pub reason: String,
}

#[derive(Serialize)]
pub struct LikeResponse {
    pub liked: bool,
    pub count: i64,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/posts/{id}/comments", post(create_comment))
        .route("/posts/{id}/likes", post(like_post))
        .route("/posts/{id}/reports", post(report_post))
        .route("/comments/{id}/likes", post(like_comment))
        .route("/friends/{user_id}", post(add_friend).delete(remove_friend))
        .route("/notifications", get(list_notifications))
}

async fn create_comment(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    Json(req): Json<CommentRequest>,
) -> AppResult<(StatusCode, Json<Comment>)> {
    let comment = state.posts.comment(&id, &user, &req.body).await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

async fn like_post(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Json<LikeResponse>> {
    let id = id.parse().map_err(|_| AppError::NotFound)?;
    let (liked, count) = state.posts.toggle_like(LikeTarget::Post(id), &user).await?;
    Ok(Json(LikeResponse { liked, count }))
}

async fn like_comment(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Json<LikeResponse>> {
    let id = id.parse().map_err(|_| AppError::NotFound)?;
    let (liked, count) = state
        .posts
        .toggle_like(LikeTarget::Comment(id), &user)
        .await?;
    Ok(Json(LikeResponse { liked, count }))
}

async fn report_post(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    Json(req): Json<ReportRequest>,
) -> AppResult<(StatusCode, Json<Report>)> {
    let report = state.posts.report(&id, &user, &req.reason).await?;
    Ok((StatusCode::CREATED, Json(report)))
}

/// The caller starts following `user_id`'s posts.
async fn add_friend(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(user_id): Path<String>,
) -> AppResult<Json<Friend>> {
    let user_id: i64 = user_id.parse().map_err(|_| AppError::NotFound)?;
    if user_id == user.id {
        return Err(AppError::InvalidArgument(
            "Cannot add yourself as a friend".to_string(),
        ));
    }
    let friend = state.notifications.add_friend(user_id, user.id).await?;
    Ok(Json(friend))
}

async fn remove_friend(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(user_id): Path<String>,
) -> AppResult<Json<Value>> {
    let user_id: i64 = user_id.parse().map_err(|_| AppError::NotFound)?;
    let removed = state.notifications.remove_friend(user_id, user.id).await?;
    Ok(Json(json!({ "success": removed })))
}

async fn list_notifications(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Json<Vec<Notification>>> {
    Ok(Json(state.notifications.list_for_user(user.id).await?))
}
