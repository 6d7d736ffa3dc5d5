//! Typed access to the chatbot REST backend.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chatbot_core::time::iso_millis;
use chatbot_core::{Chat, ChatResponse, Message, UserProfile};
use chrono::{DateTime, Utc};
use reqwest::multipart::{Form, Part};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;

use crate::error::ClientError;

/// Every request to the backend is abandoned after this long.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Health {
    pub status: String,
    pub provider: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserProfile,
}

/// A chat as stored by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteChat {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(with = "iso_millis")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "iso_millis")]
    pub last_modified: DateTime<Utc>,
}

impl RemoteChat {
    pub fn into_local(self, local_id: i64) -> Chat {
        Chat {
            id: local_id,
            remote_id: Some(self.id),
            name: self.name,
            messages: self.messages,
            created_at: self.created_at,
            last_modified: self.last_modified.max(self.created_at),
        }
    }
}

/// An image or recording sent along with a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl Attachment {
    pub fn new(file_name: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self { file_name: file_name.into(), mime_type: mime_type.into(), bytes }
    }

    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }

    pub fn is_audio(&self) -> bool {
        self.mime_type.starts_with("audio/")
    }

    /// `data:<mime>;base64,<payload>`
    pub fn data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, BASE64.encode(&self.bytes))
    }
}

#[derive(Serialize)]
struct ChatBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    messages: Option<&'a [Message]>,
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        let base_url = base_url.into().trim_end_matches('/').to_owned();
        Ok(Self { http, base_url, token: None })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn set_token(&mut self, token: Option<String>) {
        self.token = token;
    }

    pub async fn health(&self) -> Result<Health, ClientError> {
        read_json(self.request(reqwest::Method::GET, "/health").send().await?).await
    }

    pub async fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<AuthResponse, ClientError> {
        let body = json!({ "name": name, "email": email, "password": password });
        let resp = self.request(reqwest::Method::POST, "/api/auth/register").json(&body).send().await?;
        read_json(resp).await
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<AuthResponse, ClientError> {
        let body = json!({ "email": email, "password": password });
        let resp = self.request(reqwest::Method::POST, "/api/auth/login").json(&body).send().await?;
        read_json(resp).await
    }

    pub async fn list_chats(&self) -> Result<Vec<RemoteChat>, ClientError> {
        read_json(self.request(reqwest::Method::GET, "/api/chats").send().await?).await
    }

    pub async fn create_chat(&self, name: &str, messages: &[Message]) -> Result<RemoteChat, ClientError> {
        let body = ChatBody { name: Some(name), messages: Some(messages) };
        let resp = self.request(reqwest::Method::POST, "/api/chats").json(&body).send().await?;
        read_json(resp).await
    }

    pub async fn get_chat(&self, id: &str) -> Result<RemoteChat, ClientError> {
        let path = format!("/api/chats/{id}");
        read_json(self.request(reqwest::Method::GET, &path).send().await?).await
    }

    pub async fn update_chat(
        &self,
        id: &str,
        name: Option<&str>,
        messages: Option<&[Message]>,
    ) -> Result<RemoteChat, ClientError> {
        let path = format!("/api/chats/{id}");
        let body = ChatBody { name, messages };
        read_json(self.request(reqwest::Method::PUT, &path).json(&body).send().await?).await
    }

    pub async fn delete_chat(&self, id: &str) -> Result<(), ClientError> {
        let path = format!("/api/chats/{id}");
        let _: Value = read_json(self.request(reqwest::Method::DELETE, &path).send().await?).await?;
        Ok(())
    }

    /// Send a text-only message to the model.
    pub async fn send_text(&self, text: &str) -> Result<ChatResponse, ClientError> {
        self.send(Form::new().text("text", text.to_owned())).await
    }

    /// Send an image or recording, with optional accompanying text.
    pub async fn send_file(
        &self,
        text: Option<&str>,
        attachment: &Attachment,
    ) -> Result<ChatResponse, ClientError> {
        let part = Part::bytes(attachment.bytes.clone())
            .file_name(attachment.file_name.clone())
            .mime_str(&attachment.mime_type)?;
        let mut form = Form::new().part("file", part);
        if let Some(text) = text.filter(|t| !t.trim().is_empty()) {
            form = form.text("text", text.to_owned());
        }
        self.send(form).await
    }

    async fn send(&self, form: Form) -> Result<ChatResponse, ClientError> {
        let resp = self.request(reqwest::Method::POST, "/api/chat").multipart(form).send().await?;
        let value: Value = read_json(resp).await?;
        Ok(ChatResponse::decode(value)?)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        debug!(%method, %url, "backend request");
        let builder = self.http.request(method, url);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

async fn read_json<T: DeserializeOwned>(resp: Response) -> Result<T, ClientError> {
    let status = resp.status();
    let body = resp.bytes().await?;
    if !status.is_success() {
        return Err(api_error(status, &body));
    }
    serde_json::from_slice(&body).map_err(|e| ClientError::Decode(e.to_string()))
}

/// Error bodies carry their text under `message` or `error`.
fn api_error(status: StatusCode, body: &[u8]) -> ClientError {
    let message = serde_json::from_slice::<Value>(body)
        .ok()
        .and_then(|v| {
            ["message", "error"]
                .iter()
                .find_map(|k| v.get(*k).and_then(Value::as_str).map(str::to_owned))
        })
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_owned());
    ClientError::Api { status: status.as_u16(), message }
}
