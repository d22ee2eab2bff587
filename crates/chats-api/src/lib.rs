pub mod auth;
mod convert;
pub mod error;
pub mod messages;
pub mod middleware;
pub mod password;
pub mod profiles;
pub mod tokens;

use std::sync::Arc;

use axum::{
    Json, Router,
    middleware::from_fn_with_state,
    response::IntoResponse,
    routing::{get, post},
};
use tracing::error;

use chats_db::Database;

use crate::error::ApiError;
use crate::middleware::require_auth;
use crate::tokens::TokenService;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub tokens: TokenService,
}

/// All routes, with the auth gate on everything except registration, token
/// issuance and the health check.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/user/register", post(auth::register))
        .route("/user/login", post(auth::login))
        .route("/user/refresh", post(auth::refresh))
        .route("/health", get(health));

    let protected_routes = Router::new()
        .route(
            "/user/profile",
            get(profiles::list_profiles).post(profiles::create_profile),
        )
        .route(
            "/user/profile/{id}",
            get(profiles::get_profile)
                .put(profiles::update_profile)
                .patch(profiles::update_profile)
                .delete(profiles::delete_profile),
        )
        .route(
            "/message",
            get(messages::list_messages).post(messages::create_message),
        )
        .route(
            "/message/{id}",
            get(messages::get_message)
                .put(messages::update_message)
                .patch(messages::update_message)
                .delete(messages::delete_message),
        )
        .route_layer(from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Run store work (and password hashing) off the async runtime.
pub(crate) async fn blocking<F, T>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&AppStateInner) -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal(anyhow::anyhow!("blocking task failed: {}", e))
        })?
}
