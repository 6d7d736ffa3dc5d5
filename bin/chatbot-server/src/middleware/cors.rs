use crate::state::AppState;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

pub fn cors_layer(state: &Arc<AppState>) -> CorsLayer {
    let origins: Vec<axum::http::HeaderValue> = state
        .config
        .cors_allowed_origins
        .as_deref()
        .unwrap_or_default()
        .split(',')
        .filter_map(|s| s.trim().parse().ok())
        .filter(|v: &axum::http::HeaderValue| !v.is_empty())
        .collect();

    let layer = CorsLayer::new().allow_headers(Any).allow_methods(Any);
    if origins.is_empty() {
        // Wildcard; set CHATBOT_CORS_ORIGINS in production.
        layer.allow_origin(Any)
    } else {
        layer.allow_origin(origins)
    }
}
