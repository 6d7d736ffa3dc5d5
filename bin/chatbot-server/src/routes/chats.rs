//! Per-user chat storage.  Every route requires a bearer token; chats owned
//! by someone else answer 404.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Extension, Json, Router};
use chatbot_core::Message;
use chatbot_core::time::now_millis;
use tracing::info;
use utoipa::OpenApi;
use uuid::Uuid;
use validator::Validate;

use crate::db::{ChatRecord, ChatStore};
use crate::error::ServerError;
use crate::middleware::auth::AuthUser;
use crate::schemas::chats::{ChatDocument, CreateChatRequest, DeleteChatResponse, UpdateChatRequest};
use crate::schemas::validation_message;
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    paths(list_chats, create_chat, get_chat, update_chat, delete_chat),
    components(schemas(ChatDocument, CreateChatRequest, UpdateChatRequest, DeleteChatResponse, Message))
)]
pub struct ChatsApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/chats", get(list_chats).post(create_chat))
        .route("/api/chats/{id}", get(get_chat).put(update_chat).delete(delete_chat))
}

fn not_found() -> ServerError {
    ServerError::NotFound("Chat not found".into())
}

#[utoipa::path(
    get,
    path = "/api/chats",
    tag = "chats",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Chats, most recently modified first", body = Vec<ChatDocument>),
        (status = 401, description = "Missing token"),
        (status = 403, description = "Invalid or expired token"),
    )
)]
pub async fn list_chats(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<AuthUser>,
) -> Result<Json<Vec<ChatDocument>>, ServerError> {
    let chats = state.store.list_chats(&caller.id).await?;
    Ok(Json(chats.iter().map(ChatRecord::to_response).collect()))
}

#[utoipa::path(
    post,
    path = "/api/chats",
    tag = "chats",
    security(("bearer" = [])),
    request_body = CreateChatRequest,
    responses(
        (status = 201, description = "Chat created", body = ChatDocument),
        (status = 400, description = "Missing name"),
    )
)]
pub async fn create_chat(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<AuthUser>,
    Json(req): Json<CreateChatRequest>,
) -> Result<(StatusCode, Json<ChatDocument>), ServerError> {
    let req = CreateChatRequest { name: req.name.trim().to_owned(), ..req };
    req.validate().map_err(|e| ServerError::BadRequest(validation_message(&e)))?;

    let now = now_millis();
    let chat = ChatRecord {
        id: Uuid::new_v4().simple().to_string(),
        user_id: caller.id,
        name: req.name,
        messages: req.messages,
        created_at: now,
        last_modified: now,
    };
    state.store.insert_chat(chat.clone()).await?;
    info!(chat_id = %chat.id, messages = chat.messages.len(), "chat created");
    Ok((StatusCode::CREATED, Json(chat.to_response())))
}

#[utoipa::path(
    get,
    path = "/api/chats/{id}",
    tag = "chats",
    security(("bearer" = [])),
    params(("id" = String, Path, description = "Chat id")),
    responses(
        (status = 200, description = "The chat", body = ChatDocument),
        (status = 404, description = "Chat not found"),
    )
)]
pub async fn get_chat(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<ChatDocument>, ServerError> {
    let chat = state.store.get_chat(&caller.id, &id).await?.ok_or_else(not_found)?;
    Ok(Json(chat.to_response()))
}

/// Rename and/or replace the transcript.  `lastModified` only moves when the
/// transcript changes.
#[utoipa::path(
    put,
    path = "/api/chats/{id}",
    tag = "chats",
    security(("bearer" = [])),
    params(("id" = String, Path, description = "Chat id")),
    request_body = UpdateChatRequest,
    responses(
        (status = 200, description = "Updated chat", body = ChatDocument),
        (status = 400, description = "Empty name"),
        (status = 404, description = "Chat not found"),
    )
)]
pub async fn update_chat(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<AuthUser>,
    Path(id): Path<String>,
    Json(req): Json<UpdateChatRequest>,
) -> Result<Json<ChatDocument>, ServerError> {
    let req = UpdateChatRequest { name: req.name.map(|n| n.trim().to_owned()), ..req };
    req.validate().map_err(|e| ServerError::BadRequest(validation_message(&e)))?;

    let mut chat = state.store.get_chat(&caller.id, &id).await?.ok_or_else(not_found)?;
    if let Some(name) = req.name {
        chat.name = name;
    }
    if let Some(messages) = req.messages.filter(|m| *m != chat.messages) {
        chat.messages = messages;
        chat.last_modified = now_millis().max(chat.created_at);
    }
    if !state.store.update_chat(&chat).await? {
        return Err(not_found());
    }
    Ok(Json(chat.to_response()))
}

#[utoipa::path(
    delete,
    path = "/api/chats/{id}",
    tag = "chats",
    security(("bearer" = [])),
    params(("id" = String, Path, description = "Chat id")),
    responses(
        (status = 200, description = "Chat deleted", body = DeleteChatResponse),
        (status = 404, description = "Chat not found"),
    )
)]
pub async fn delete_chat(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<DeleteChatResponse>, ServerError> {
    if !state.store.delete_chat(&caller.id, &id).await? {
        return Err(not_found());
    }
    info!(chat_id = %id, "chat deleted");
    Ok(Json(DeleteChatResponse { message: "Chat deleted successfully".into() }))
}
