use chatbot_core::Message;
use chatbot_core::time::iso_millis;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::db::ChatRecord;

#[derive(Debug, Clone, Deserialize, ToSchema, Validate)]
pub struct CreateChatRequest {
    #[validate(length(min = 1, message = "Chat name is required"))]
    pub name: String,
    #[serde(default)]
    pub messages: Vec<Message>,
}

#[derive(Debug, Clone, Deserialize, ToSchema, Validate)]
pub struct UpdateChatRequest {
    #[validate(length(min = 1, message = "Chat name cannot be empty"))]
    pub name: Option<String>,
    pub messages: Option<Vec<Message>>,
}

/// A stored chat as returned to its owner.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChatDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub user: String,
    pub name: String,
    pub messages: Vec<Message>,
    #[serde(with = "iso_millis")]
    #[schema(value_type = String, format = DateTime)]
    pub created_at: DateTime<Utc>,
    #[serde(with = "iso_millis")]
    #[schema(value_type = String, format = DateTime)]
    pub last_modified: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DeleteChatResponse {
    pub message: String,
}

impl ChatRecord {
    pub fn to_response(&self) -> ChatDocument {
        ChatDocument {
            id: self.id.clone(),
            user: self.user_id.clone(),
            name: self.name.clone(),
            messages: self.messages.clone(),
            created_at: self.created_at,
            last_modified: self.last_modified,
        }
    }
}
