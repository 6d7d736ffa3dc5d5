//! Quota-aware persistence of the chat list.
//!
//! The whole list lives as one JSON array under [`CHATS_KEY`].  Every save is
//! a read-modify-write of that array.  When the backing store refuses the
//! write, [`ConversationStore`] steps down a ladder of cheaper snapshots until
//! one fits, and reports how far it had to go through [`SaveOutcome`].

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::model::{Chat, UserProfile};
use crate::storage::{KeyValueStore, StorageError};
use crate::time::now_millis;

pub const CHATS_KEY: &str = "multimodal-chatbot-chats";
pub const CURRENT_CHAT_KEY: &str = "multimodal-chatbot-current-chat";
pub const USER_KEY: &str = "multimodal-chatbot-user";
pub const TOKEN_KEY: &str = "multimodal-chatbot-token";
pub const DARK_MODE_KEY: &str = "multimodal-chatbot-dark-mode";

/// Limits applied before and while writing the chat list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Most recently modified chats kept.
    pub max_chats: usize,
    /// Most recent messages kept per chat.
    pub max_messages: usize,
    /// The shrink step never cuts below this many messages per chat.
    pub min_messages: usize,
    /// Inline `data:` attachments longer than this are dropped under pressure.
    pub inline_media_limit: usize,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_chats: 20,
            max_messages: 100,
            min_messages: 10,
            inline_media_limit: 100_000,
        }
    }
}

/// How much of the chat list a save managed to persist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// Written within the normal retention limits.
    Saved,
    /// Large inline attachments were dropped to fit.
    MediaDropped,
    /// Written after cutting messages and possibly whole chats.
    Trimmed { chats: usize, messages_per_chat: usize },
    /// Only chat names and timestamps were written.
    Minimal,
    /// Nothing fit; the stored list was removed.
    Cleared,
}

impl SaveOutcome {
    pub fn is_lossless(&self) -> bool {
        matches!(self, Self::Saved)
    }
}

pub struct ConversationStore<S> {
    store: S,
    policy: RetentionPolicy,
}

impl<S: KeyValueStore> ConversationStore<S> {
    pub fn new(store: S) -> Self {
        Self::with_policy(store, RetentionPolicy::default())
    }

    pub fn with_policy(store: S, policy: RetentionPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> &RetentionPolicy {
        &self.policy
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Every stored chat.  A missing or unreadable list is treated as empty.
    pub fn load(&self) -> Vec<Chat> {
        let raw = match self.store.get(CHATS_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                warn!(error = %e, "failed to read stored chats");
                return Vec::new();
            }
        };
        match serde_json::from_str(&raw) {
            Ok(chats) => chats,
            Err(e) => {
                warn!(error = %e, bytes = raw.len(), "stored chats are unreadable; starting empty");
                Vec::new()
            }
        }
    }

    pub fn get(&self, id: i64) -> Option<Chat> {
        self.load().into_iter().find(|c| c.id == id)
    }

    /// Insert or replace `chat`.  `last_modified` is stamped when the
    /// transcript differs from the stored one, so saving an unchanged chat
    /// leaves the stored list as it was.
    pub fn save(&self, chat: &mut Chat) -> SaveOutcome {
        let mut chats = self.load();
        match chats.iter_mut().find(|c| c.id == chat.id) {
            Some(stored) => {
                if stored.messages != chat.messages {
                    chat.touch();
                }
                *stored = chat.clone();
            }
            None => {
                chat.touch();
                chats.push(chat.clone());
            }
        }
        self.persist(chats)
    }

    /// Remove one chat.  Returns whether it existed.
    pub fn delete(&self, id: i64) -> bool {
        let mut chats = self.load();
        let before = chats.len();
        chats.retain(|c| c.id != id);
        if chats.len() == before {
            return false;
        }
        let outcome = self.persist(chats);
        debug!(chat_id = id, ?outcome, "chat deleted");
        true
    }

    /// Remove every stored chat.
    pub fn clear(&self) -> Result<(), StorageError> {
        self.store.delete(CHATS_KEY)
    }

    /// Ids are creation times in milliseconds, bumped past any existing id.
    pub fn next_chat_id(&self) -> i64 {
        let now = now_millis().timestamp_millis();
        let max = self.load().iter().map(|c| c.id).max().unwrap_or(i64::MIN);
        now.max(max.saturating_add(1))
    }

    /// Create, greet and persist a new chat.
    pub fn create_chat(&self, name: Option<&str>) -> Chat {
        let name = name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_owned)
            .unwrap_or_else(|| Chat::default_name(now_millis()));
        let mut chat = Chat::with_greeting(self.next_chat_id(), name);
        let outcome = self.save(&mut chat);
        info!(chat_id = chat.id, ?outcome, "chat created");
        chat
    }

    // ── write ladder ────────────────────────────────────────────────────────

    fn persist(&self, mut chats: Vec<Chat>) -> SaveOutcome {
        self.normalize(&mut chats);
        if self.write(&chats) {
            return SaveOutcome::Saved;
        }

        let dropped = self.drop_inline_media(&mut chats);
        if dropped > 0 && self.write(&chats) {
            info!(dropped, "saved chats after dropping inline attachments");
            return SaveOutcome::MediaDropped;
        }

        let skeletons: Vec<Chat> = chats.iter().map(Chat::skeleton).collect();
        let mut cap = self.policy.max_messages;
        loop {
            if cap > self.policy.min_messages {
                cap = (cap * 7 / 10).max(self.policy.min_messages);
                for chat in &mut chats {
                    keep_recent(chat, cap);
                }
            } else if chats.len() > 1 {
                // sorted newest first
                chats.pop();
            } else {
                break;
            }
            if self.write(&chats) {
                warn!(chats = chats.len(), messages_per_chat = cap, "saved a trimmed chat list");
                return SaveOutcome::Trimmed { chats: chats.len(), messages_per_chat: cap };
            }
        }

        if self.write(&skeletons) {
            warn!(chats = skeletons.len(), "saved chat list without messages");
            return SaveOutcome::Minimal;
        }

        warn!("no chat snapshot fits in storage; clearing stored chats");
        if let Err(e) = self.store.delete(CHATS_KEY) {
            warn!(error = %e, "failed to clear stored chats");
        }
        SaveOutcome::Cleared
    }

    fn normalize(&self, chats: &mut Vec<Chat>) {
        chats.sort_by(|a, b| b.last_modified.cmp(&a.last_modified));
        chats.truncate(self.policy.max_chats);
        for chat in chats.iter_mut() {
            keep_recent(chat, self.policy.max_messages);
        }
    }

    fn drop_inline_media(&self, chats: &mut [Chat]) -> usize {
        let limit = self.policy.inline_media_limit;
        let oversized = |r: &Option<String>| {
            r.as_deref().is_some_and(|s| s.starts_with("data:") && s.chars().count() > limit)
        };
        let mut dropped = 0;
        for message in chats.iter_mut().flat_map(|c| c.messages.iter_mut()) {
            if oversized(&message.image_ref) {
                message.image_ref = None;
                dropped += 1;
            }
            if oversized(&message.audio_ref) {
                message.audio_ref = None;
                dropped += 1;
            }
        }
        dropped
    }

    fn write(&self, chats: &[Chat]) -> bool {
        let raw = match serde_json::to_string(chats) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "failed to serialize chats");
                return false;
            }
        };
        match self.store.set(CHATS_KEY, &raw) {
            Ok(()) => true,
            Err(e) => {
                debug!(error = %e, bytes = raw.len(), "chat list write rejected");
                false
            }
        }
    }
}

fn keep_recent(chat: &mut Chat, cap: usize) {
    let excess = chat.messages.len().saturating_sub(cap);
    if excess > 0 {
        chat.messages.drain(..excess);
    }
}

/// Small typed values kept next to the chat list.
pub struct LocalState<S> {
    store: S,
}

impl<S: KeyValueStore> LocalState<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Remember the chat that was open, to be restored once on next start.
    pub fn set_current_chat(&self, chat: &Chat) -> Result<(), StorageError> {
        self.write(CURRENT_CHAT_KEY, chat)
    }

    /// Read and forget the remembered chat.
    pub fn take_current_chat(&self) -> Option<Chat> {
        let chat = self.read(CURRENT_CHAT_KEY);
        if let Err(e) = self.store.delete(CURRENT_CHAT_KEY) {
            warn!(error = %e, "failed to clear current chat");
        }
        chat
    }

    pub fn user(&self) -> Option<UserProfile> {
        self.read(USER_KEY)
    }

    pub fn token(&self) -> Option<String> {
        self.read(TOKEN_KEY)
    }

    pub fn sign_in(&self, user: &UserProfile, token: &str) -> Result<(), StorageError> {
        self.write(USER_KEY, user)?;
        self.write(TOKEN_KEY, &token)
    }

    pub fn sign_out(&self) -> Result<(), StorageError> {
        self.store.delete(USER_KEY)?;
        self.store.delete(TOKEN_KEY)
    }

    pub fn dark_mode(&self) -> bool {
        self.read(DARK_MODE_KEY).unwrap_or(false)
    }

    pub fn set_dark_mode(&self, on: bool) -> Result<(), StorageError> {
        self.write(DARK_MODE_KEY, &on)
    }

    fn read<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.store.get(key) {
            Ok(raw) => raw?,
            Err(e) => {
                warn!(key, error = %e, "failed to read local state");
                return None;
            }
        };
        serde_json::from_str(&raw)
            .inspect_err(|e| warn!(key, error = %e, "ignoring unreadable local state"))
            .ok()
    }

    fn write<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        let raw = serde_json::to_string(value)?;
        self.store.set(key, &raw)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::Role;
    use crate::storage::MemoryStore;
    use std::sync::Arc;
    use tracing_test::traced_test;

    fn chat_with(id: i64, messages: usize) -> Chat {
        let mut chat = Chat::new(id, format!("chat {id}"));
        for n in 0..messages {
            chat.append(Role::User, format!("message {n}"));
        }
        chat
    }

    #[test]
    fn save_then_load() {
        let store = ConversationStore::new(MemoryStore::new());
        let mut chat = chat_with(1, 3);
        assert_eq!(store.save(&mut chat), SaveOutcome::Saved);
        assert_eq!(store.load(), vec![chat]);
    }

    #[test]
    fn normalize_keeps_recent_chats_and_messages() {
        let policy = RetentionPolicy { max_chats: 2, max_messages: 3, ..Default::default() };
        let store = ConversationStore::with_policy(MemoryStore::new(), policy);
        for id in 1..=3 {
            store.save(&mut chat_with(id, 5));
        }
        let chats = store.load();
        assert_eq!(chats.len(), 2);
        assert!(chats[0].last_modified >= chats[1].last_modified);
        assert!(chats.iter().all(|c| c.messages.len() == 3));
        assert_eq!(chats[0].messages[0].content, "message 2");
    }

    #[test]
    fn unreadable_list_loads_empty() {
        let kv = MemoryStore::new();
        kv.set(CHATS_KEY, "{not json").unwrap();
        let store = ConversationStore::new(kv);
        assert!(store.load().is_empty());
    }

    #[test]
    fn large_inline_media_is_dropped_first() {
        let policy = RetentionPolicy { inline_media_limit: 1_000, ..Default::default() };
        let store = ConversationStore::with_policy(MemoryStore::with_quota(4_000), policy);
        let mut chat = chat_with(1, 2);
        chat.messages[0].image_ref = Some(format!("data:image/png;base64,{}", "A".repeat(5_000)));
        chat.messages[1].audio_ref = Some("blob:small".to_owned());

        assert_eq!(store.save(&mut chat), SaveOutcome::MediaDropped);
        let stored = store.get(1).unwrap();
        assert!(stored.messages[0].image_ref.is_none());
        assert_eq!(stored.messages[1].audio_ref.as_deref(), Some("blob:small"));
    }

    #[test]
    fn shrink_cuts_messages_then_chats() {
        let kv = Arc::new(MemoryStore::new());
        let store = ConversationStore::new(kv.clone());
        let mut big = chat_with(1, 100);
        store.save(&mut big);
        let full = kv.get(CHATS_KEY).unwrap().unwrap().len();

        let tight = ConversationStore::new(Arc::new(MemoryStore::with_quota(full / 2)));
        let mut big = chat_with(1, 100);
        match tight.save(&mut big) {
            SaveOutcome::Trimmed { chats, messages_per_chat } => {
                assert_eq!(chats, 1);
                assert!(messages_per_chat < 100 && messages_per_chat >= 10);
                let stored = tight.get(1).unwrap();
                assert_eq!(stored.messages.len(), messages_per_chat);
                assert_eq!(stored.messages.last(), big.messages.last());
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn shrink_drops_oldest_chats_at_the_floor() {
        let policy = RetentionPolicy { max_messages: 10, min_messages: 10, ..Default::default() };
        let pause = || std::thread::sleep(std::time::Duration::from_millis(3));

        // Two floor-sized chats fit; a third does not.
        let sizing_kv = Arc::new(MemoryStore::new());
        let sizing = ConversationStore::with_policy(sizing_kv.clone(), policy);
        sizing.save(&mut chat_with(1, 10));
        sizing.save(&mut chat_with(2, 10));
        let two = sizing_kv.get(CHATS_KEY).unwrap().unwrap().len();

        let kv = Arc::new(MemoryStore::with_quota(CHATS_KEY.len() + two + 10));
        let store = ConversationStore::with_policy(kv, policy);
        for id in 1..=2 {
            assert_eq!(store.save(&mut chat_with(id, 10)), SaveOutcome::Saved);
            pause();
        }
        for id in 3..=4 {
            let outcome = store.save(&mut chat_with(id, 10));
            assert_eq!(outcome, SaveOutcome::Trimmed { chats: 2, messages_per_chat: 10 });
            pause();
        }

        let ids: Vec<i64> = store.load().iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![4, 3]);
        assert!(store.get(4).is_some_and(|c| c.messages.len() == 10));
    }

    #[test]
    fn exhausted_store_degrades_to_minimal_then_clear() {
        let kv = Arc::new(MemoryStore::with_quota(CHATS_KEY.len() + 400));
        let store = ConversationStore::new(kv.clone());
        let mut chat = chat_with(1, 50);
        assert_eq!(store.save(&mut chat), SaveOutcome::Minimal);
        let stored = store.load();
        assert_eq!(stored.len(), 1);
        assert!(stored[0].messages.is_empty());

        let none = ConversationStore::new(MemoryStore::with_quota(8));
        assert_eq!(none.save(&mut chat), SaveOutcome::Cleared);
        assert!(none.load().is_empty());
    }

    #[test]
    #[traced_test]
    fn clearing_is_logged() {
        let store = ConversationStore::new(MemoryStore::with_quota(8));
        assert_eq!(store.save(&mut chat_with(1, 1)), SaveOutcome::Cleared);
        assert!(logs_contain("no chat snapshot fits in storage"));
    }

    #[test]
    fn delete_and_clear() {
        let store = ConversationStore::new(MemoryStore::new());
        store.save(&mut chat_with(1, 1));
        store.save(&mut chat_with(2, 1));
        assert!(store.delete(1));
        assert!(!store.delete(1));
        assert_eq!(store.load().len(), 1);
        store.clear().unwrap();
        assert!(store.load().is_empty());
    }

    #[test]
    fn new_chats_get_fresh_ids_and_a_greeting() {
        let store = ConversationStore::new(MemoryStore::new());
        let first = store.create_chat(None);
        let second = store.create_chat(Some("  Physics  "));
        assert!(second.id > first.id);
        assert_eq!(second.name, "Physics");
        assert!(first.name.starts_with("Chat "));
        assert_eq!(first.messages[0].role, Role::Bot);
        assert_eq!(store.load().len(), 2);
    }

    #[test]
    fn local_state_round_trip() {
        let state = LocalState::new(MemoryStore::new());
        assert!(!state.dark_mode());
        state.set_dark_mode(true).unwrap();
        assert!(state.dark_mode());

        let user = UserProfile { id: "u1".into(), name: "Ada".into(), email: "ada@example.com".into() };
        state.sign_in(&user, "tok").unwrap();
        assert_eq!(state.user(), Some(user));
        assert_eq!(state.token().as_deref(), Some("tok"));
        state.sign_out().unwrap();
        assert!(state.token().is_none());
    }

    #[test]
    fn current_chat_is_taken_once() {
        let state = LocalState::new(MemoryStore::new());
        let chat = chat_with(9, 1);
        state.set_current_chat(&chat).unwrap();
        assert_eq!(state.take_current_chat(), Some(chat));
        assert!(state.take_current_chat().is_none());
    }

    #[test]
    fn garbage_local_values_read_as_absent() {
        let kv = MemoryStore::new();
        kv.set(DARK_MODE_KEY, "maybe").unwrap();
        kv.set(USER_KEY, "[]").unwrap();
        let state = LocalState::new(kv);
        assert!(!state.dark_mode());
        assert!(state.user().is_none());
    }
}
