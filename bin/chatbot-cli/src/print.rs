//! Plain-text rendering of chats for the terminal.

use chatbot_core::{Chat, Message, Role};

/// `* 1714558830123  Physics  (4 messages, 2024-05-01 10:20)`
pub fn chat_line(chat: &Chat, current: bool) -> String {
    let marker = if current { '*' } else { ' ' };
    format!(
        "{marker} {:<14} {}  ({} messages, {})",
        chat.id,
        chat.name,
        chat.messages.len(),
        chat.last_modified.format("%Y-%m-%d %H:%M"),
    )
}

pub fn transcript(chat: &Chat) -> String {
    let mut out = format!("# {}\n\n", chat.name);
    for message in &chat.messages {
        out.push_str(&message_block(message));
        out.push('\n');
    }
    out
}

fn message_block(message: &Message) -> String {
    let who = match message.role {
        Role::User => "you",
        Role::Bot => "bot",
    };
    let mut block = format!("[{who} {}] {}\n", message.timestamp.format("%H:%M"), message.content);
    if message.image_ref.is_some() {
        block.push_str("  (image attached)\n");
    }
    if message.audio_ref.is_some() {
        block.push_str("  (audio attached)\n");
    }
    block
}
