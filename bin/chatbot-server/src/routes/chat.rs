//! `POST /api/chat`: forward user input to the model and return the
//! segmented reply.

use std::sync::Arc;

use axum::extract::multipart::MultipartRejection;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::routing::post;
use axum::{Json, Router};
use chatbot_core::reply::{ChatResponse, LegacyReply, ReplyBody};
use chatbot_core::segment;
use tracing::{debug, info};
use utoipa::OpenApi;

use crate::config::ResponseFormat;
use crate::error::ServerError;
use crate::gemini::InputPart;
use crate::schemas::chat::ChatUpload;
use crate::state::AppState;

/// Substituted when the model returns no text.
pub const EMPTY_MODEL_REPLY: &str = "Sorry, I could not process your request.";

#[derive(OpenApi)]
#[openapi(paths(post_chat), components(schemas(ChatUpload, ChatResponse)))]
pub struct ChatApi;

pub fn router(max_upload_bytes: usize) -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/chat", post(post_chat))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
}

struct Upload {
    file_name: String,
    mime_type: String,
    data: Vec<u8>,
}

/// Send text and/or one image or audio file to the model.
#[utoipa::path(
    post,
    path = "/api/chat",
    tag = "chat",
    request_body(content = ChatUpload, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Model reply", body = ChatResponse),
        (status = 400, description = "No input or unsupported file type"),
        (status = 413, description = "Upload too large"),
        (status = 500, description = "Model provider error"),
        (status = 504, description = "Model provider timed out"),
    )
)]
pub async fn post_chat(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<ChatResponse>, ServerError> {
    let mut multipart = multipart.map_err(|e| ServerError::BadRequest(e.body_text()))?;

    let mut text = String::new();
    let mut upload: Option<Upload> = None;
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("text") => text = field.text().await?,
            Some("file") => {
                let file_name = field.file_name().unwrap_or("upload").to_owned();
                let mime_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_owned();
                let data = field.bytes().await?.to_vec();
                upload = Some(Upload { file_name, mime_type, data });
            }
            other => debug!(field = ?other, "ignoring multipart field"),
        }
    }

    let text = text.trim();
    if text.is_empty() && upload.is_none() {
        return Err(ServerError::BadRequest(
            "Please provide text, image, or audio input.".into(),
        ));
    }

    let mut parts = Vec::new();
    if !text.is_empty() {
        parts.push(InputPart::Text(text.to_owned()));
    }
    let mut input = text.to_owned();
    if let Some(upload) = upload {
        if !upload.mime_type.starts_with("image/") && !upload.mime_type.starts_with("audio/") {
            return Err(ServerError::BadRequest(
                "Unsupported file type. Only image or audio allowed.".into(),
            ));
        }
        if upload.data.is_empty() {
            return Err(ServerError::BadRequest("Invalid file data received.".into()));
        }
        debug!(
            file_name = %upload.file_name,
            mime_type = %upload.mime_type,
            size_bytes = upload.data.len(),
            "received upload"
        );
        if input.is_empty() {
            input = upload.file_name;
        }
        parts.push(InputPart::Inline { mime_type: upload.mime_type, data: upload.data });
    }

    let raw = state.model.generate(parts).await?;
    let raw = if raw.trim().is_empty() { EMPTY_MODEL_REPLY.to_owned() } else { raw };

    let response = match state.config.response_format {
        ResponseFormat::Segments => ReplyBody::Segments(segment(&raw)),
        ResponseFormat::Legacy => ReplyBody::Legacy(LegacyReply::from(state.segmenter().split(&raw))),
    };
    info!(
        format = %state.config.response_format,
        raw_chars = raw.chars().count(),
        "model reply ready"
    );

    Ok(Json(ChatResponse { success: true, input, response }))
}
