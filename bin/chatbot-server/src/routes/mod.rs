//! Axum router construction.
//!
//! [`build`] assembles the complete application router:
//! - Middleware layers (CORS, per-request trace id)
//! - Optional Swagger UI / OpenAPI document (disable with `CHATBOT_ENABLE_SWAGGER=false`)
//! - `/health`, `/api/chat`, `/api/auth/*`
//! - Bearer-protected `/api/chats` and `/api/auth/me`

mod auth;
mod chat;
mod chats;
pub mod doc;
mod health;

use std::sync::Arc;

use axum::{Router, middleware};
use utoipa_swagger_ui::SwaggerUi;

use crate::middleware::auth::require_auth;
use crate::middleware::{cors, trace};
use crate::state::AppState;

pub use chat::EMPTY_MODEL_REPLY;

/// Build the complete Axum [`Router`] for the application.
pub fn build(state: Arc<AppState>) -> Router {
    let protected = Router::new()
        .merge(chats::router())
        .merge(auth::protected_router())
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    let mut app = Router::new()
        .merge(health::router())
        .merge(chat::router(state.config.max_upload_bytes()))
        .merge(auth::public_router())
        .merge(protected);

    if state.config.enable_swagger {
        app = app.merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", doc::get_docs()));
    }

    app
        .layer(cors::cors_layer(&state))
        .layer(middleware::from_fn(trace::trace_middleware))
        .with_state(state)
}

// ── Tests ──────────────────────────────────────────────────────────────────────
