//! Google Gemini `generateContent` client.
//!
//! Model access sits behind [`ChatModel`] so that handlers can be exercised
//! against a fake in tests.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("GOOGLE_API_KEY is not configured")]
    MissingKey,

    #[error("upstream request timed out")]
    Timeout,

    #[error("Gemini API error: {0}")]
    Api(String),

    #[error("Gemini API error: {0}")]
    Transport(#[source] reqwest::Error),
}

impl From<reqwest::Error> for ModelError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() { Self::Timeout } else { Self::Transport(e) }
    }
}

/// One piece of user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputPart {
    Text(String),
    Inline { mime_type: String, data: Vec<u8> },
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Provider label reported by `/health`.
    fn provider(&self) -> &str;

    /// Generate a reply.  An empty string means the model produced no text.
    async fn generate(&self, parts: Vec<InputPart>) -> Result<String, ModelError>;
}

// ── wire types ───────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
}

#[derive(Serialize, Deserialize, Default)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Deserialize, Default)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Content,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

impl From<InputPart> for Part {
    fn from(part: InputPart) -> Self {
        match part {
            InputPart::Text(text) => Part { text: Some(text), inline_data: None },
            InputPart::Inline { mime_type, data } => Part {
                text: None,
                inline_data: Some(InlineData { mime_type, data: BASE64.encode(data) }),
            },
        }
    }
}

impl GenerateResponse {
    /// Text of every part of the first candidate, joined by newlines.
    fn text(self) -> String {
        self.candidates
            .into_iter()
            .next()
            .map(|c| {
                c.content
                    .parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .filter(|t| !t.is_empty())
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .unwrap_or_default()
    }
}

// ── client ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl GeminiClient {
    pub fn new(
        base_url: &str,
        model: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ModelError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_owned(),
            model: model.into(),
            api_key,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.base_url, self.model)
    }
}

#[async_trait]
impl ChatModel for GeminiClient {
    fn provider(&self) -> &str {
        "google-gemini"
    }

    async fn generate(&self, parts: Vec<InputPart>) -> Result<String, ModelError> {
        let key = self.api_key.as_deref().ok_or(ModelError::MissingKey)?;
        let body = GenerateRequest {
            contents: vec![Content {
                role: Some("user".to_owned()),
                parts: parts.into_iter().map(Part::from).collect(),
            }],
        };

        debug!(model = %self.model, "calling Gemini generateContent");
        let resp = self
            .http
            .post(self.endpoint())
            .header("x-goog-api-key", key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        let bytes = resp.bytes().await?;
        if !status.is_success() {
            let message = serde_json::from_slice::<ErrorEnvelope>(&bytes)
                .map(|e| e.error.message)
                .ok()
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| "Unknown error".to_owned());
            warn!(status = status.as_u16(), %message, "Gemini returned an error");
            return Err(ModelError::Api(message));
        }

        let parsed: GenerateResponse = serde_json::from_slice(&bytes).unwrap_or_else(|e| {
            warn!(error = %e, "unreadable Gemini response; treating as empty");
            GenerateResponse::default()
        });
        Ok(parsed.text())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::{Value, json};
    use std::collections::HashMap;
    use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;

    struct Captured {
        path: String,
        headers: HashMap<String, String>,
        body: Value,
    }

    /// One-shot HTTP/1.1 server: captures a single request and replies with
    /// `status` and `resp_body`.
    async fn mock_once(
        status: u16,
        resp_body: &'static str,
    ) -> (String, tokio::sync::oneshot::Receiver<Captured>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (tx, rx) = tokio::sync::oneshot::channel();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (read_half, mut write_half) = stream.into_split();
            let mut reader = BufReader::new(read_half);

            let mut request_line = String::new();
            reader.read_line(&mut request_line).await.unwrap();
            let path = request_line.split(' ').nth(1).unwrap_or_default().to_owned();

            let mut headers = HashMap::new();
            let mut content_length = 0usize;
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).await.unwrap();
                let line = line.trim();
                if line.is_empty() {
                    break;
                }
                if let Some((k, v)) = line.split_once(": ") {
                    let k = k.to_lowercase();
                    if k == "content-length" {
                        content_length = v.parse().unwrap_or(0);
                    }
                    headers.insert(k, v.to_owned());
                }
            }
            let mut body = vec![0u8; content_length];
            reader.read_exact(&mut body).await.unwrap();
            let body = serde_json::from_slice(&body).unwrap_or(Value::Null);
            let _ = tx.send(Captured { path, headers, body });

            let resp = format!(
                "HTTP/1.1 {status} X\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{resp_body}",
                resp_body.len()
            );
            write_half.write_all(resp.as_bytes()).await.unwrap();
            write_half.shutdown().await.unwrap();
        });

        (format!("http://127.0.0.1:{port}"), rx)
    }

    fn client(base: &str) -> GeminiClient {
        GeminiClient::new(base, "gemini-2.5-flash", Some("k3y".into()), Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn sends_parts_and_joins_reply_text() {
        let (base, rx) = mock_once(
            200,
            r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"line one"},{"text":"line two"}]}}]}"#,
        )
        .await;

        let parts = vec![
            InputPart::Text("describe".into()),
            InputPart::Inline { mime_type: "image/png".into(), data: vec![1, 2, 3] },
        ];
        let text = client(&base).generate(parts).await.unwrap();
        assert_eq!(text, "line one\nline two");

        let req = rx.await.unwrap();
        assert_eq!(req.path, "/v1beta/models/gemini-2.5-flash:generateContent");
        assert_eq!(req.headers["x-goog-api-key"], "k3y");
        assert_eq!(
            req.body,
            json!({ "contents": [{ "role": "user", "parts": [
                { "text": "describe" },
                { "inlineData": { "mimeType": "image/png", "data": "AQID" } }
            ]}]})
        );
    }

    #[tokio::test]
    async fn error_status_surfaces_provider_message() {
        let (base, _rx) = mock_once(429, r#"{"error":{"code":429,"message":"Resource exhausted"}}"#).await;
        let err = client(&base).generate(vec![InputPart::Text("hi".into())]).await.unwrap_err();
        assert_eq!(err.to_string(), "Gemini API error: Resource exhausted");
    }

    #[tokio::test]
    async fn no_candidates_is_empty_text() {
        let (base, _rx) = mock_once(200, r#"{"candidates":[]}"#).await;
        let text = client(&base).generate(vec![InputPart::Text("hi".into())]).await.unwrap();
        assert!(text.is_empty());
    }

    #[tokio::test]
    async fn missing_key_fails_before_any_request() {
        let gemini = GeminiClient::new("http://127.0.0.1:9", "m", None, Duration::from_secs(1)).unwrap();
        let err = gemini.generate(vec![InputPart::Text("hi".into())]).await.unwrap_err();
        assert!(matches!(err, ModelError::MissingKey));
    }
}
