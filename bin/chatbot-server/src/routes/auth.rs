//! Account registration and login.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use chatbot_core::UserProfile;
use chatbot_core::time::now_millis;
use tracing::info;
use utoipa::OpenApi;
use uuid::Uuid;
use validator::Validate;

use crate::auth::{hash_password, verify_password};
use crate::db::{UserRecord, UserStore};
use crate::error::ServerError;
use crate::middleware::auth::AuthUser;
use crate::schemas::auth::{AuthResponse, LoginRequest, RegisterRequest};
use crate::schemas::validation_message;
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    paths(register, login, me),
    components(schemas(RegisterRequest, LoginRequest, AuthResponse, UserProfile))
)]
pub struct AuthApi;

pub fn public_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
}

pub fn protected_router() -> Router<Arc<AppState>> {
    Router::new().route("/api/auth/me", get(me))
}

#[utoipa::path(
    post,
    path = "/api/auth/register",
    tag = "auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = AuthResponse),
        (status = 400, description = "Invalid name, email or password"),
        (status = 409, description = "Email already registered"),
    )
)]
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), ServerError> {
    let req = RegisterRequest {
        name: req.name.trim().to_owned(),
        email: normalize_email(&req.email),
        password: req.password,
    };
    req.validate().map_err(|e| ServerError::BadRequest(validation_message(&e)))?;

    let password = req.password;
    let rounds = state.config.password_rounds;
    let password_hash = tokio::task::spawn_blocking(move || hash_password(&password, rounds))
        .await
        .map_err(|e| ServerError::Internal(format!("password hashing failed: {e}")))?;

    let user = UserRecord {
        id: Uuid::new_v4().to_string(),
        name: req.name,
        email: req.email,
        password_hash,
        created_at: now_millis(),
    };
    if !state.store.insert_user(user.clone()).await? {
        return Err(ServerError::Conflict("User already exists".into()));
    }
    info!(user_id = %user.id, "user registered");

    let token = issue_token(&state, &user.id)?;
    Ok((StatusCode::CREATED, Json(AuthResponse { token, user: user.to_profile() })))
}

#[utoipa::path(
    post,
    path = "/api/auth/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Signed in", body = AuthResponse),
        (status = 400, description = "Malformed credentials"),
        (status = 401, description = "Wrong email or password"),
    )
)]
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, ServerError> {
    let email = normalize_email(&req.email);
    let req = LoginRequest { email, password: req.password };
    req.validate().map_err(|e| ServerError::BadRequest(validation_message(&e)))?;

    let invalid = || ServerError::Unauthorized("Invalid email or password".into());
    let user = state.store.find_user_by_email(&req.email).await?.ok_or_else(invalid)?;

    let stored = user.password_hash.clone();
    let password = req.password;
    let ok = tokio::task::spawn_blocking(move || verify_password(&password, &stored))
        .await
        .map_err(|e| ServerError::Internal(format!("password check failed: {e}")))?;
    if !ok {
        return Err(invalid());
    }
    info!(user_id = %user.id, "user signed in");

    let token = issue_token(&state, &user.id)?;
    Ok(Json(AuthResponse { token, user: user.to_profile() }))
}

/// Profile of the token's owner.
#[utoipa::path(
    get,
    path = "/api/auth/me",
    tag = "auth",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Current user", body = UserProfile),
        (status = 401, description = "Missing token"),
        (status = 403, description = "Invalid or expired token"),
    )
)]
pub async fn me(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<AuthUser>,
) -> Result<Json<UserProfile>, ServerError> {
    let user = state
        .store
        .find_user(&caller.id)
        .await?
        .ok_or_else(|| ServerError::NotFound("User not found".into()))?;
    Ok(Json(user.to_profile()))
}

// ── private helpers ──────────────────────────────────────────────────────────

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn issue_token(state: &AppState, user_id: &str) -> Result<String, ServerError> {
    state
        .tokens
        .issue(user_id)
        .map_err(|e| ServerError::Internal(format!("token signing failed: {e}")))
}
