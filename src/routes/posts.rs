use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{delete, get};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::db::models::{FeedPage, FeedPost, Post, PostDetail};
use crate::error::AppResult;
use crate::extractors::{AdminUser, CurrentUser};
use crate::posts::domain::PageParams;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct CreatePostRequest {
    pub image: String,
    #[serde(default)]
    pub caption: String,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/posts", get(list_posts).post(create_post))
        .route("/posts/all", get(list_all_posts))
        .route("/posts/admin/{id}", delete(admin_delete_post))
        .route("/posts/{id}", get(post_detail).delete(delete_post))
}

async fn list_posts(
    State(state): State<AppState>,
    Query(params): Query<PageParams>,
) -> AppResult<Json<FeedPage>> {
    Ok(Json(state.posts.list_page(&params).await?))
}

async fn list_all_posts(State(state): State<AppState>) -> AppResult<Json<Vec<FeedPost>>> {
    Ok(Json(state.posts.list_all().await?))
}

async fn post_detail(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<PostDetail>> {
    Ok(Json(state.posts.detail(&id).await?))
}

async fn create_post(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(req): Json<CreatePostRequest>,
) -> AppResult<(StatusCode, Json<Post>)> {
    let post = state.posts.create(&user, &req.image, &req.caption).await?;
    Ok((StatusCode::CREATED, Json(post)))
}

async fn delete_post(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    state.posts.delete_own(&id, &user).await?;
    Ok(Json(json!({ "success": true })))
}

async fn admin_delete_post(
    State(state): State<AppState>,
    admin: AdminUser,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    state.posts.delete_as_admin(&id, &admin).await?;
    Ok(Json(json!({ "success": true })))
}
