//! Chat records as they are exchanged with the backend and kept in storage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::time::{iso_millis, now_millis};

/// First message of every new chat.
pub const GREETING: &str =
    "Hello! I can help you with text, images, and audio. How can I assist you today?";

/// Who authored a message.  Serialized as `"user"` / `"bot"`.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    ToSchema,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    User,
    Bot,
}

/// One entry of a chat transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Message {
    /// Unique within its chat, increasing in creation order.
    pub id: u64,
    #[serde(rename = "type")]
    pub role: Role,
    pub content: String,
    #[serde(with = "iso_millis")]
    #[schema(value_type = String, format = DateTime)]
    pub timestamp: DateTime<Utc>,
    /// Data URI or object URL of an attached recording.
    #[serde(rename = "audioUrl", default)]
    pub audio_ref: Option<String>,
    /// Data URI or object URL of an attached image.
    #[serde(rename = "imageUrl", default)]
    pub image_ref: Option<String>,
}

impl Message {
    pub fn new(id: u64, role: Role, content: impl Into<String>) -> Self {
        Self {
            id,
            role,
            content: content.into(),
            timestamp: now_millis(),
            audio_ref: None,
            image_ref: None,
        }
    }
}

/// A named, ordered transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    /// Local id, assigned on the device that created the chat.
    pub id: i64,
    /// Server-assigned id, present once the chat has been synced.
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(with = "iso_millis")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "iso_millis")]
    pub last_modified: DateTime<Utc>,
}

impl Chat {
    /// An empty chat created now.
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        let now = now_millis();
        Self {
            id,
            remote_id: None,
            name: name.into(),
            messages: Vec::new(),
            created_at: now,
            last_modified: now,
        }
    }

    /// A chat that opens with the bot's [`GREETING`].
    pub fn with_greeting(id: i64, name: impl Into<String>) -> Self {
        let mut chat = Self::new(id, name);
        chat.append(Role::Bot, GREETING);
        chat
    }

    /// `Chat 2024-05-01`
    pub fn default_name(now: DateTime<Utc>) -> String {
        format!("Chat {}", now.format("%Y-%m-%d"))
    }

    pub fn next_message_id(&self) -> u64 {
        self.messages.last().map_or(1, |m| m.id + 1)
    }

    /// Append a message and bump `last_modified`.  Returns the new message so
    /// that attachments can be set on it.
    pub fn append(&mut self, role: Role, content: impl Into<String>) -> &mut Message {
        let message = Message::new(self.next_message_id(), role, content);
        self.messages.push(message);
        self.touch();
        let last = self.messages.len() - 1;
        &mut self.messages[last]
    }

    /// Mark the transcript as changed now.
    pub fn touch(&mut self) {
        self.last_modified = now_millis().max(self.created_at);
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// The chat with its transcript stripped, for last-resort snapshots.
    pub fn skeleton(&self) -> Self {
        Self { messages: Vec::new(), ..self.clone() }
    }
}

/// Public profile of an authenticated user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct UserProfile {
    pub id: String,
    pub name: String,
    pub email: String,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn message_ids_increase_in_creation_order() {
        let mut chat = Chat::with_greeting(7, "maths");
        chat.append(Role::User, "hi");
        chat.append(Role::Bot, "hello");
        let ids: Vec<u64> = chat.messages.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn ids_continue_after_front_pruning() {
        let mut chat = Chat::new(1, "c");
        for n in 0..5 {
            chat.append(Role::User, format!("m{n}"));
        }
        chat.messages.drain(..3);
        assert_eq!(chat.append(Role::Bot, "next").id, 6);
    }

    #[test]
    fn append_moves_last_modified_forward() {
        let mut chat = Chat::new(1, "c");
        let before = chat.last_modified;
        chat.append(Role::User, "x");
        assert!(chat.last_modified >= before);
        assert!(chat.last_modified >= chat.created_at);
    }

    #[test]
    fn wire_names_match_the_web_client() {
        let mut chat = Chat::new(42, "named");
        chat.append(Role::User, "hi").image_ref = Some("blob:abc".into());
        let json = serde_json::to_value(&chat).unwrap();
        assert_eq!(json["id"], 42);
        assert!(json.get("_id").is_none());
        assert!(json["createdAt"].is_string());
        assert!(json["lastModified"].is_string());
        assert_eq!(json["messages"][0]["type"], "user");
        assert_eq!(json["messages"][0]["imageUrl"], "blob:abc");
        assert!(json["messages"][0]["audioUrl"].is_null());
    }

    #[test]
    fn role_parses_from_str() {
        assert_eq!("bot".parse::<Role>().unwrap(), Role::Bot);
        assert_eq!(Role::User.to_string(), "user");
    }

    #[test]
    fn default_name_uses_date() {
        let ts = DateTime::parse_from_rfc3339("2024-05-01T10:20:30Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(Chat::default_name(ts), "Chat 2024-05-01");
    }
}
