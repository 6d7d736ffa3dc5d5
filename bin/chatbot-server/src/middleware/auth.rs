use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::debug;

use crate::error::ServerError;
use crate::state::AppState;

/// The authenticated caller, inserted as a request extension by
/// [`require_auth`].
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: String,
}

/// Reject requests without a valid `Authorization: Bearer <token>` header.
pub async fn require_auth(State(state): State<Arc<AppState>>, mut req: Request, next: Next) -> Response {
    let token = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split_once(' '))
        .map(|(_, token)| token.trim())
        .filter(|token| !token.is_empty());

    let Some(token) = token else {
        return ServerError::Unauthorized("Access token required".into()).into_response();
    };
    let Some(user_id) = state.tokens.verify(token) else {
        debug!("rejected bearer token");
        return ServerError::Forbidden("Invalid or expired token".into()).into_response();
    };

    req.extensions_mut().insert(AuthUser { id: user_id });
    next.run(req).await
}
