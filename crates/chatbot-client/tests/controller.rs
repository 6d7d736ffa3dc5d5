use std::sync::Arc;
use std::time::Duration;

use axum::extract::Multipart;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use chatbot_client::{ApiClient, Attachment, ChatController, ClientError, ERROR_REPLY};
use chatbot_core::{MemoryStore, Role};
use serde_json::{Value, json};

async fn spawn(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn controller(base: &str) -> (ChatController<Arc<MemoryStore>>, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let api = ApiClient::new(base).unwrap();
    (ChatController::new(api, store.clone()), store)
}

async fn segments_reply() -> Json<Value> {
    Json(json!({
        "success": true,
        "input": "what is energy?",
        "response": [
            { "type": "text", "content": "Energy:" },
            { "type": "math", "content": "E=mc^2" }
        ]
    }))
}

#[tokio::test]
async fn reply_is_composed_and_persisted() {
    let base = spawn(Router::new().route("/api/chat", post(segments_reply))).await;
    let (mut ctl, _) = controller(&base);

    let reply = ctl.send("what is energy?", None).await.unwrap();
    assert_eq!(reply.role, Role::Bot);
    assert_eq!(reply.content, "Energy:\n\n$$E=mc^2$$");

    let chats = ctl.chats();
    assert_eq!(chats.len(), 1);
    let roles: Vec<Role> = chats[0].messages.iter().map(|m| m.role).collect();
    assert_eq!(roles, vec![Role::Bot, Role::User, Role::Bot]);
    assert_eq!(ctl.current().map(|c| c.id), Some(chats[0].id));
}

#[tokio::test]
async fn backend_error_becomes_fallback_reply() {
    let app = Router::new().route(
        "/api/chat",
        post(|| async {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "success": false, "error": "Gemini API error: quota" })),
            )
        }),
    );
    let base = spawn(app).await;
    let (mut ctl, _) = controller(&base);

    let reply = ctl.send("hi", None).await.unwrap();
    assert_eq!(reply.content, ERROR_REPLY);
}

#[tokio::test]
async fn unknown_reply_shape_becomes_fallback_reply() {
    let app = Router::new().route(
        "/api/chat",
        post(|| async { Json(json!({ "success": true, "input": "hi", "response": { "answer": 1 } })) }),
    );
    let base = spawn(app).await;
    let (mut ctl, _) = controller(&base);
    assert_eq!(ctl.send("hi", None).await.unwrap().content, ERROR_REPLY);
}

#[tokio::test]
async fn unreachable_backend_becomes_fallback_reply() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let (mut ctl, _) = controller(&format!("http://{addr}"));
    assert_eq!(ctl.send("hi", None).await.unwrap().content, ERROR_REPLY);
}

#[tokio::test]
async fn slow_backend_times_out() {
    let app = Router::new().route(
        "/api/chat",
        post(|| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Json(json!({}))
        }),
    );
    let base = spawn(app).await;
    let api = ApiClient::with_timeout(&base, Duration::from_millis(200)).unwrap();

    let err = api.send_text("hi").await.unwrap_err();
    assert!(matches!(err, ClientError::Timeout), "got {err:?}");
}

#[tokio::test]
async fn empty_input_sends_nothing() {
    let (mut ctl, store) = controller("http://127.0.0.1:9");
    assert!(ctl.send("   ", None).await.is_none());
    assert!(ctl.chats().is_empty());
    assert_eq!(store.used(), 0);
}

#[tokio::test]
async fn attachments_are_sent_as_multipart() {
    async fn echo(mut multipart: Multipart) -> Json<Value> {
        let mut seen = Vec::new();
        while let Some(field) = multipart.next_field().await.unwrap() {
            let name = field.name().unwrap_or_default().to_owned();
            let mime = field.content_type().unwrap_or_default().to_owned();
            let file = field.file_name().unwrap_or_default().to_owned();
            let len = field.bytes().await.unwrap().len();
            seen.push(format!("{name}|{file}|{mime}|{len}"));
        }
        Json(json!({ "success": true, "input": "x", "response": [{ "type": "text", "content": seen.join(" ") }] }))
    }
    let base = spawn(Router::new().route("/api/chat", post(echo))).await;
    let (mut ctl, _) = controller(&base);

    let clip = Attachment::new("note.webm", "audio/webm", vec![0; 16]);
    let reply = ctl.send("", Some(clip)).await.unwrap();
    assert_eq!(reply.content, "file|note.webm|audio/webm|16");

    let chat = ctl.current().unwrap();
    let user = &chat.messages[chat.messages.len() - 2];
    assert_eq!(user.content, "note.webm");
    assert!(user.audio_ref.as_deref().unwrap().starts_with("data:audio/webm;base64,"));
    assert!(user.image_ref.is_none());
}

#[tokio::test]
async fn signed_in_sends_are_synced() {
    async fn login() -> Json<Value> {
        Json(json!({ "token": "t0k", "user": { "id": "u1", "name": "Ada", "email": "ada@example.com" } }))
    }
    async fn create(headers: HeaderMap, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
        assert_eq!(headers["authorization"], "Bearer t0k");
        (
            StatusCode::CREATED,
            Json(json!({
                "_id": "remote-1",
                "name": body["name"],
                "messages": body["messages"],
                "createdAt": "2024-05-01T10:20:30.123Z",
                "lastModified": "2024-05-01T10:20:30.123Z"
            })),
        )
    }
    let app = Router::new()
        .route("/api/auth/login", post(login))
        .route("/api/chats", post(create))
        .route("/api/chat", post(segments_reply));
    let base = spawn(app).await;
    let (mut ctl, store) = controller(&base);

    let user = ctl.login("ada@example.com", "secret").await.unwrap();
    assert_eq!(user.name, "Ada");
    ctl.send("what is energy?", None).await.unwrap();

    assert_eq!(ctl.current().unwrap().remote_id.as_deref(), Some("remote-1"));
    assert_eq!(ctl.chats()[0].remote_id.as_deref(), Some("remote-1"));

    // a fresh controller over the same store picks the session back up
    let again = ChatController::new(ApiClient::new(&base).unwrap(), store);
    assert_eq!(again.api().token(), Some("t0k"));
}
