use std::sync::Arc;

use chatbot_core::conversation::CHATS_KEY;
use chatbot_core::{Chat, ConversationStore, FileStore, KeyValueStore, MemoryStore, Role, SaveOutcome};

fn busy_chat(id: i64, messages: usize) -> Chat {
    let mut chat = Chat::with_greeting(id, format!("chat {id}"));
    for n in 0..messages {
        let role = if n % 2 == 0 { Role::User } else { Role::Bot };
        chat.append(role, format!("{n}: the quick brown fox jumps over the lazy dog"));
    }
    chat
}

#[test]
fn repeated_saves_against_an_exhausted_store_never_fail() {
    for quota in [0, 16, 64, 256, 1_024, 4_096, 16_384] {
        let store = ConversationStore::new(MemoryStore::with_quota(quota));
        for id in 1..=25 {
            let mut chat = busy_chat(id, 40);
            let _outcome: SaveOutcome = store.save(&mut chat);
            chat.append(Role::User, "one more");
            store.save(&mut chat);
            // load never errors; every surviving chat is well formed
            for stored in store.load() {
                assert!(stored.last_modified >= stored.created_at);
                assert!(stored.messages.windows(2).all(|w| w[0].id < w[1].id));
            }
        }
        assert!(store.load().len() <= 20, "quota {quota}");
    }
}

#[test]
fn saving_a_loaded_chat_changes_nothing() {
    let kv = Arc::new(MemoryStore::new());
    let store = ConversationStore::new(kv.clone());
    for id in 1..=3 {
        store.save(&mut busy_chat(id, 5));
    }
    let before = kv.get(CHATS_KEY).unwrap();

    let mut first = store.load().remove(0);
    let outcome = store.save(&mut first);

    assert_eq!(outcome, SaveOutcome::Saved);
    assert_eq!(kv.get(CHATS_KEY).unwrap(), before);
}

#[test]
fn timestamps_round_trip_at_millisecond_precision() {
    let dir = tempfile::tempdir().unwrap();
    let store = ConversationStore::new(FileStore::open(dir.path()).unwrap());
    let mut chat = busy_chat(7, 3);
    store.save(&mut chat);

    let loaded = store.get(7).unwrap();
    assert_eq!(loaded.created_at, chat.created_at);
    assert_eq!(loaded.last_modified, chat.last_modified);
    for (a, b) in loaded.messages.iter().zip(&chat.messages) {
        assert_eq!(a.timestamp, b.timestamp);
    }
}

#[test]
fn file_store_with_quota_degrades_like_memory() {
    let dir = tempfile::tempdir().unwrap();
    let kv = FileStore::open(dir.path()).unwrap().with_quota(2_000);
    let store = ConversationStore::new(kv);
    let mut chat = busy_chat(1, 100);
    let outcome = store.save(&mut chat);
    assert!(!outcome.is_lossless());
    assert!(store.load().len() <= 1);
}
