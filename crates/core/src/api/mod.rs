pub mod auth;
pub mod chat;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

/// Build the full API router.
///
/// Every route here is one of the chat RPCs, gated behind the bearer-
/// token middleware (`auth::require_api_token`) when `server.api_token` /
/// `server.api_token_env` resolves to a token at boot; otherwise the
/// middleware is a no-op passthrough.
pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/chat", post(chat::chat))
        .route("/chat/abort", post(chat::abort))
        .route("/chat/approve", post(chat::approve))
        .route(
            "/chat/approval-mode",
            get(chat::get_approval_mode).post(chat::set_approval_mode),
        )
        .route("/chat/run-config", get(chat::get_run_config).post(chat::patch_run_config))
        .route("/chat/thinking", get(chat::get_thinking).post(chat::patch_thinking))
        .route("/chat/undo", post(chat::undo))
        .route("/chat/actions", get(chat::actions))
        .route_layer(middleware::from_fn_with_state(state, auth::require_api_token))
}
