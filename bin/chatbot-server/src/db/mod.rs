//! Persistence layer.
//!
//! [`UserStore`] and [`ChatStore`] describe what the handlers need; the
//! default implementation is [`sqlite::SqliteStore`].  Trait methods return
//! `impl Future` so no boxing is involved.

pub mod sqlite;

use chatbot_core::Message;
use chrono::{DateTime, Utc};

/// A registered account.
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub id: String,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// A chat owned by one user.
#[derive(Debug, Clone)]
pub struct ChatRecord {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
}

pub trait UserStore: Send + Sync + 'static {
    /// Returns `false` when the email is already registered.
    fn insert_user(
        &self,
        user: UserRecord,
    ) -> impl std::future::Future<Output = Result<bool, sqlx::Error>> + Send;

    fn find_user_by_email(
        &self,
        email: &str,
    ) -> impl std::future::Future<Output = Result<Option<UserRecord>, sqlx::Error>> + Send;

    fn find_user(
        &self,
        id: &str,
    ) -> impl std::future::Future<Output = Result<Option<UserRecord>, sqlx::Error>> + Send;
}

/// Every lookup is scoped to the owning user; another user's chat behaves as
/// if it did not exist.
pub trait ChatStore: Send + Sync + 'static {
    fn insert_chat(
        &self,
        chat: ChatRecord,
    ) -> impl std::future::Future<Output = Result<(), sqlx::Error>> + Send;

    /// Newest `last_modified` first.
    fn list_chats(
        &self,
        user_id: &str,
    ) -> impl std::future::Future<Output = Result<Vec<ChatRecord>, sqlx::Error>> + Send;

    fn get_chat(
        &self,
        user_id: &str,
        id: &str,
    ) -> impl std::future::Future<Output = Result<Option<ChatRecord>, sqlx::Error>> + Send;

    /// Overwrite name and messages and stamp `last_modified`.
    fn update_chat(
        &self,
        chat: &ChatRecord,
    ) -> impl std::future::Future<Output = Result<bool, sqlx::Error>> + Send;

    fn delete_chat(
        &self,
        user_id: &str,
        id: &str,
    ) -> impl std::future::Future<Output = Result<bool, sqlx::Error>> + Send;
}
