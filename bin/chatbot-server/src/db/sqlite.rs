//! SQLite implementation of [`UserStore`] and [`ChatStore`].
//!
//! `sqlx::migrate!("./migrations")` embeds the migration files at compile
//! time; they run on every [`SqliteStore::connect`].  Queries use the runtime
//! checked `sqlx::query` form so no `DATABASE_URL` is needed to build.
//! Timestamps are stored as RFC 3339 text, messages as a JSON array.

use std::str::FromStr;

use chatbot_core::Message;
use chatbot_core::time::to_iso;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tracing::warn;

use super::{ChatRecord, ChatStore, UserRecord, UserStore};

type UserRow = (String, String, String, String, String);
type ChatRow = (String, String, String, String, String, String);

#[derive(Clone, Debug)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the database at `url` and run pending migrations.
    ///
    /// `sqlite::memory:` gives a private database for tests; the pool is then
    /// limited to one connection so every query sees the same data.
    pub async fn connect(url: &str) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let max_connections = if url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }
}

impl UserStore for SqliteStore {
    async fn insert_user(&self, user: UserRecord) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO users (id, name, email, password_hash, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5) ON CONFLICT(email) DO NOTHING",
        )
        .bind(&user.id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(to_iso(&user.created_at))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, sqlx::Error> {
        let row: Option<UserRow> = sqlx::query_as(
            "SELECT id, name, email, password_hash, created_at FROM users WHERE email = ?1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(user_from_row))
    }

    async fn find_user(&self, id: &str) -> Result<Option<UserRecord>, sqlx::Error> {
        let row: Option<UserRow> = sqlx::query_as(
            "SELECT id, name, email, password_hash, created_at FROM users WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(user_from_row))
    }
}

// ── ChatStore ────────────────────────────────────────────────────────────────

impl ChatStore for SqliteStore {
    async fn insert_chat(&self, chat: ChatRecord) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO chats (id, user_id, name, messages, created_at, last_modified) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(&chat.id)
        .bind(&chat.user_id)
        .bind(&chat.name)
        .bind(messages_json(&chat.messages)?)
        .bind(to_iso(&chat.created_at))
        .bind(to_iso(&chat.last_modified))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_chats(&self, user_id: &str) -> Result<Vec<ChatRecord>, sqlx::Error> {
        let rows: Vec<ChatRow> = sqlx::query_as(
            "SELECT id, user_id, name, messages, created_at, last_modified \
             FROM chats WHERE user_id = ?1 ORDER BY last_modified DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(chat_from_row).collect())
    }

    async fn get_chat(&self, user_id: &str, id: &str) -> Result<Option<ChatRecord>, sqlx::Error> {
        let row: Option<ChatRow> = sqlx::query_as(
            "SELECT id, user_id, name, messages, created_at, last_modified \
             FROM chats WHERE id = ?1 AND user_id = ?2",
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(chat_from_row))
    }

    async fn update_chat(&self, chat: &ChatRecord) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE chats SET name = ?1, messages = ?2, last_modified = ?3 \
             WHERE id = ?4 AND user_id = ?5",
        )
        .bind(&chat.name)
        .bind(messages_json(&chat.messages)?)
        .bind(to_iso(&chat.last_modified))
        .bind(&chat.id)
        .bind(&chat.user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn delete_chat(&self, user_id: &str, id: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM chats WHERE id = ?1 AND user_id = ?2")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }
}

// ── private helpers ──────────────────────────────────────────────────────────

fn messages_json(messages: &[Message]) -> Result<String, sqlx::Error> {
    serde_json::to_string(messages).map_err(|e| sqlx::Error::Encode(Box::new(e)))
}

fn parse_ts(raw: &str, column: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .unwrap_or_else(|e| {
            warn!(raw, column, error = %e, "failed to parse timestamp; using now");
            Utc::now()
        })
}

fn user_from_row((id, name, email, password_hash, created_at): UserRow) -> UserRecord {
    UserRecord {
        id,
        name,
        email,
        password_hash,
        created_at: parse_ts(&created_at, "users.created_at"),
    }
}

fn chat_from_row((id, user_id, name, messages, created_at, last_modified): ChatRow) -> ChatRecord {
    let messages = serde_json::from_str(&messages).unwrap_or_else(|e| {
        warn!(chat_id = %id, error = %e, "unreadable stored messages; returning none");
        Vec::new()
    });
    ChatRecord {
        id,
        user_id,
        name,
        messages,
        created_at: parse_ts(&created_at, "chats.created_at"),
        last_modified: parse_ts(&last_modified, "chats.last_modified"),
    }
}
