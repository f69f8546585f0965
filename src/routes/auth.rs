use axum::routing::{get, post};
use axum::Router;

use crate::auth::handlers;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(handlers::register))
        .route("/auth/login", post(handlers::login))
        .route("/auth/google", get(handlers::google_start))
        .route("/auth/google/callback", get(handlers::google_callback))
        .route("/users/me", get(handlers::me))
}
