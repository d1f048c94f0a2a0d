//! Bearer-token auth middleware for protected routes.
//!
//! The token is hashed once at boot (`AppState::api_token_hash`) and every
//! request is compared against the digest in constant time, so neither the
//! configured token nor a partial match timing difference leaks through
//! response latency.

use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Json};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::state::AppState;

pub async fn require_api_token(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> impl IntoResponse {
    let Some(expected) = &state.api_token_hash else {
        // Auth disabled at boot — let every request through.
        return next.run(request).await.into_response();
    };

    let presented = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    let Some(token) = presented else {
        return unauthorized();
    };

    let digest = Sha256::digest(token.as_bytes());
    if digest.ct_eq(expected.as_ref()).into() {
        next.run(request).await.into_response()
    } else {
        unauthorized()
    }
}

fn unauthorized() -> axum::response::Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({ "error": "missing or invalid bearer token" })),
    )
        .into_response()
}
