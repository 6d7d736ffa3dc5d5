//! Shared application state injected into every Axum handler.

use std::sync::Arc;

use chatbot_core::Segmenter;

use crate::auth::TokenIssuer;
use crate::config::Config;
use crate::db::sqlite::SqliteStore;
use crate::gemini::ChatModel;

#[derive(Clone)]
pub struct AppState {
    /// Server configuration (env-derived).
    pub config: Arc<Config>,
    /// Users and their chats.
    pub store: Arc<SqliteStore>,
    /// Generative model behind `/api/chat`.
    pub model: Arc<dyn ChatModel>,
    pub tokens: Arc<TokenIssuer>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .field("store", &self.store)
            .field("model", &self.model.provider())
            .field("tokens", &self.tokens)
            .finish()
    }
}

impl AppState {
    pub fn segmenter(&self) -> Segmenter {
        if self.config.detect_logo { Segmenter::with_logo_detection() } else { Segmenter::new() }
    }
}
