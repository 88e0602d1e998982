//! SQLite persistence for chat sessions and messages.
//!
//! [`ChatStore`] owns the connection pool and runs the schema migrations on
//! connect. Timestamps are stored as RFC 3339 TEXT with microsecond
//! precision so lexical order matches chronological order.

use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::error::ServiceError;
use crate::types::{ChatSession, MessageRole, NewMessage, SessionStats, StoredMessage};

// ---------------------------------------------------------------------------
// Schema migrations
// ---------------------------------------------------------------------------

const MIGRATIONS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS chat_sessions (
        id TEXT NOT NULL PRIMARY KEY,
        title VARCHAR(255) NOT NULL DEFAULT 'New Chat',
        user_id TEXT,
        is_active INTEGER NOT NULL DEFAULT 1,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_chat_sessions_user_updated ON chat_sessions(user_id, updated_at)",
    "CREATE INDEX IF NOT EXISTS idx_chat_sessions_active ON chat_sessions(is_active)",
    "CREATE TABLE IF NOT EXISTS messages (
        id TEXT NOT NULL PRIMARY KEY,
        session_id TEXT NOT NULL REFERENCES chat_sessions(id) ON DELETE CASCADE,
        role TEXT NOT NULL,
        content TEXT NOT NULL,
        model TEXT,
        prompt_tokens INTEGER,
        completion_tokens INTEGER,
        response_time REAL,
        created_at TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_messages_session_created ON messages(session_id, created_at)",
    "CREATE INDEX IF NOT EXISTS idx_messages_role ON messages(role)",
];

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn is_in_memory(database_url: &str) -> bool {
    database_url.contains(":memory:") || database_url.contains("mode=memory")
}

/// Current time at the precision the store keeps.
fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, ServiceError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| ServiceError::Storage(format!("invalid datetime '{s}': {e}")))
}

fn parse_uuid(s: &str) -> Result<Uuid, ServiceError> {
    Uuid::parse_str(s).map_err(|e| ServiceError::Storage(format!("invalid UUID '{s}': {e}")))
}

fn session_from_row(row: &SqliteRow) -> Result<ChatSession, ServiceError> {
    Ok(ChatSession {
        id: parse_uuid(&row.try_get::<String, _>("id")?)?,
        title: row.try_get("title")?,
        user_id: row.try_get("user_id")?,
        is_active: row.try_get::<i64, _>("is_active")? != 0,
        created_at: parse_datetime(&row.try_get::<String, _>("created_at")?)?,
        updated_at: parse_datetime(&row.try_get::<String, _>("updated_at")?)?,
    })
}

fn message_from_row(row: &SqliteRow) -> Result<StoredMessage, ServiceError> {
    let role: String = row.try_get("role")?;
    Ok(StoredMessage {
        id: parse_uuid(&row.try_get::<String, _>("id")?)?,
        session_id: parse_uuid(&row.try_get::<String, _>("session_id")?)?,
        role: MessageRole::parse(&role)
            .ok_or_else(|| ServiceError::Storage(format!("invalid message role '{role}'")))?,
        content: row.try_get("content")?,
        model: row.try_get("model")?,
        prompt_tokens: row.try_get("prompt_tokens")?,
        completion_tokens: row.try_get("completion_tokens")?,
        response_time: row.try_get("response_time")?,
        created_at: parse_datetime(&row.try_get::<String, _>("created_at")?)?,
    })
}

/// A session row joined with the data the list view needs.
#[derive(Debug, Clone)]
pub struct SessionListing {
    pub session: ChatSession,
    pub message_count: i64,
    pub first_user_message: Option<String>,
}

// ---------------------------------------------------------------------------
// ChatStore
// ---------------------------------------------------------------------------

/// Session and message repository over a SQLite pool.
#[derive(Clone)]
pub struct ChatStore {
    pool: SqlitePool,
}

impl ChatStore {
    /// Opens (or creates) the database at `database_url` and applies migrations.
    pub async fn connect(database_url: &str) -> Result<Self, ServiceError> {
        let in_memory = is_in_memory(database_url);
        let mut options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| ServiceError::Storage(format!("invalid database URL: {e}")))?
            .create_if_missing(true)
            .foreign_keys(true);
        if !in_memory {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        // Every connection to `:memory:` is its own database, so the pool is
        // pinned to a single connection that never expires.
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(10)
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(|e| ServiceError::Storage(format!("failed to connect to SQLite: {e}")))?;

        let store = Self { pool };
        store.migrate().await?;
        tracing::debug!(database_url, in_memory, "chat store ready");
        Ok(store)
    }

    /// A fresh private in-memory database.
    pub async fn in_memory() -> Result<Self, ServiceError> {
        Self::connect("sqlite::memory:").await
    }

    async fn migrate(&self) -> Result<(), ServiceError> {
        for statement in MIGRATIONS {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| ServiceError::Storage(format!("migration failed: {e}")))?;
        }
        Ok(())
    }

    /// Closes the pool, waiting for connections to be returned.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    // --- Sessions ---

    pub async fn create_session(
        &self,
        title: &str,
        user_id: Option<&str>,
    ) -> Result<ChatSession, ServiceError> {
        let ts = now();
        let session = ChatSession {
            id: Uuid::new_v4(),
            title: title.to_string(),
            user_id: user_id.map(str::to_string),
            is_active: true,
            created_at: ts,
            updated_at: ts,
        };

        sqlx::query(
            "INSERT INTO chat_sessions (id, title, user_id, is_active, created_at, updated_at)
             VALUES (?, ?, ?, 1, ?, ?)",
        )
        .bind(session.id.to_string())
        .bind(&session.title)
        .bind(&session.user_id)
        .bind(format_datetime(&ts))
        .bind(format_datetime(&ts))
        .execute(&self.pool)
        .await?;

        Ok(session)
    }

    pub async fn get_session(&self, id: Uuid) -> Result<Option<ChatSession>, ServiceError> {
        let row = sqlx::query(
            "SELECT id, title, user_id, is_active, created_at, updated_at
             FROM chat_sessions WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(session_from_row).transpose()
    }

    /// Active sessions, most recently updated first.
    pub async fn list_sessions(
        &self,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<SessionListing>, ServiceError> {
        let rows = sqlx::query(
            "SELECT s.id, s.title, s.user_id, s.is_active, s.created_at, s.updated_at,
                    (SELECT COUNT(*) FROM messages m WHERE m.session_id = s.id) AS message_count,
                    (SELECT m.content FROM messages m
                      WHERE m.session_id = s.id AND m.role = 'user'
                      ORDER BY m.created_at, m.rowid LIMIT 1) AS first_user_message
             FROM chat_sessions s
             WHERE s.is_active = 1
             ORDER BY s.updated_at DESC, s.rowid DESC
             LIMIT ? OFFSET ?",
        )
        .bind(i64::from(limit))
        .bind(i64::from(offset))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok::<_, ServiceError>(SessionListing {
                    session: session_from_row(row)?,
                    message_count: row.try_get("message_count")?,
                    first_user_message: row.try_get("first_user_message")?,
                })
            })
            .collect()
    }

    /// Deletes a session and its messages. Returns false if it did not exist.
    pub async fn delete_session(&self, id: Uuid) -> Result<bool, ServiceError> {
        let id = id.to_string();
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM messages WHERE session_id = ?")
            .bind(&id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM chat_sessions WHERE id = ?")
            .bind(&id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn update_session_title(&self, id: Uuid, title: &str) -> Result<bool, ServiceError> {
        let result =
            sqlx::query("UPDATE chat_sessions SET title = ?, updated_at = ? WHERE id = ?")
                .bind(title)
                .bind(format_datetime(&now()))
                .bind(id.to_string())
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn count_sessions(&self) -> Result<i64, ServiceError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chat_sessions")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    // --- Messages ---

    /// Appends a message and bumps the session's `updated_at` in one
    /// transaction.
    pub async fn append_message(&self, new: NewMessage) -> Result<StoredMessage, ServiceError> {
        let ts = now();
        let created_at = format_datetime(&ts);
        let session_id = new.session_id.to_string();

        let mut tx = self.pool.begin().await?;
        let touched = sqlx::query("UPDATE chat_sessions SET updated_at = ? WHERE id = ?")
            .bind(&created_at)
            .bind(&session_id)
            .execute(&mut *tx)
            .await?;
        if touched.rows_affected() == 0 {
            return Err(ServiceError::SessionNotFound);
        }

        let message = StoredMessage {
            id: Uuid::new_v4(),
            session_id: new.session_id,
            role: new.role,
            content: new.content,
            model: new.model,
            prompt_tokens: new.prompt_tokens,
            completion_tokens: new.completion_tokens,
            response_time: new.response_time,
            created_at: ts,
        };

        sqlx::query(
            "INSERT INTO messages (id, session_id, role, content, model, prompt_tokens,
                                   completion_tokens, response_time, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(message.id.to_string())
        .bind(&session_id)
        .bind(message.role.as_str())
        .bind(&message.content)
        .bind(&message.model)
        .bind(message.prompt_tokens)
        .bind(message.completion_tokens)
        .bind(message.response_time)
        .bind(&created_at)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(message)
    }

    /// Messages of a session in creation order.
    pub async fn list_messages(&self, session_id: Uuid) -> Result<Vec<StoredMessage>, ServiceError> {
        let rows = sqlx::query(
            "SELECT id, session_id, role, content, model, prompt_tokens, completion_tokens,
                    response_time, created_at
             FROM messages WHERE session_id = ?
             ORDER BY created_at, rowid",
        )
        .bind(session_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(message_from_row).collect()
    }

    /// Deletes all messages of a session and returns how many were removed.
    pub async fn clear_messages(&self, session_id: Uuid) -> Result<u64, ServiceError> {
        let result = sqlx::query("DELETE FROM messages WHERE session_id = ?")
            .bind(session_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn count_messages(&self) -> Result<i64, ServiceError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM messages")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    // --- Analytics ---

    /// Aggregates for one session, or `None` if the session does not exist.
    pub async fn session_stats(&self, session_id: Uuid) -> Result<Option<SessionStats>, ServiceError> {
        if self.get_session(session_id).await?.is_none() {
            return Ok(None);
        }

        let row = sqlx::query(
            "SELECT COUNT(*) AS total_messages,
                    COALESCE(SUM(CASE WHEN role = 'user' THEN 1 ELSE 0 END), 0) AS user_messages,
                    COALESCE(SUM(CASE WHEN role = 'assistant' THEN 1 ELSE 0 END), 0) AS assistant_messages,
                    COALESCE(SUM(prompt_tokens), 0) AS total_prompt_tokens,
                    COALESCE(SUM(completion_tokens), 0) AS total_completion_tokens,
                    AVG(response_time) AS avg_response_time
             FROM messages WHERE session_id = ?",
        )
        .bind(session_id.to_string())
        .fetch_one(&self.pool)
        .await?;

        Ok(Some(SessionStats {
            session_id,
            total_messages: row.try_get("total_messages")?,
            user_messages: row.try_get("user_messages")?,
            assistant_messages: row.try_get("assistant_messages")?,
            total_prompt_tokens: row.try_get("total_prompt_tokens")?,
            total_completion_tokens: row.try_get("total_completion_tokens")?,
            avg_response_time: row
                .try_get::<Option<f64>, _>("avg_response_time")?
                .unwrap_or(0.0),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> ChatStore {
        ChatStore::in_memory().await.unwrap()
    }

    #[tokio::test]
    async fn create_and_get_session() {
        let store = store().await;
        let created = store.create_session("Trip plans", Some("alice")).await.unwrap();

        let fetched = store.get_session(created.id).await.unwrap().unwrap();
        assert_eq!(fetched, created);
        assert!(fetched.is_active);
        assert!(store.get_session(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn messages_keep_insertion_order() {
        let store = store().await;
        let session = store.create_session("New Chat", None).await.unwrap();

        for (i, role) in [MessageRole::User, MessageRole::Assistant, MessageRole::User]
            .into_iter()
            .enumerate()
        {
            store
                .append_message(NewMessage::new(session.id, role, format!("m{i}")))
                .await
                .unwrap();
        }

        let messages = store.list_messages(session.id).await.unwrap();
        let contents: Vec<&str> = messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["m0", "m1", "m2"]);
        assert_eq!(messages[1].role, MessageRole::Assistant);
    }

    #[tokio::test]
    async fn append_to_missing_session_fails() {
        let store = store().await;
        let err = store
            .append_message(NewMessage::new(Uuid::new_v4(), MessageRole::User, "hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::SessionNotFound));
        assert_eq!(store.count_messages().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn append_bumps_updated_at() {
        let store = store().await;
        let session = store.create_session("New Chat", None).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        store
            .append_message(NewMessage::new(session.id, MessageRole::User, "hi"))
            .await
            .unwrap();

        let updated = store.get_session(session.id).await.unwrap().unwrap();
        assert!(updated.updated_at > session.updated_at);
    }

    #[tokio::test]
    async fn list_sessions_newest_first_with_counts() {
        let store = store().await;
        let older = store.create_session("older", None).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let newer = store.create_session("newer", None).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;

        store
            .append_message(NewMessage::new(older.id, MessageRole::Assistant, "welcome"))
            .await
            .unwrap();
        store
            .append_message(NewMessage::new(older.id, MessageRole::User, "question"))
            .await
            .unwrap();

        let listed = store.list_sessions(50, 0).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].session.id, older.id);
        assert_eq!(listed[0].message_count, 2);
        assert_eq!(listed[0].first_user_message.as_deref(), Some("question"));
        assert_eq!(listed[1].session.id, newer.id);
        assert_eq!(listed[1].message_count, 0);
        assert_eq!(listed[1].first_user_message, None);

        let page = store.list_sessions(1, 1).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].session.id, newer.id);
    }

    #[tokio::test]
    async fn delete_session_removes_messages() {
        let store = store().await;
        let session = store.create_session("bye", None).await.unwrap();
        store
            .append_message(NewMessage::new(session.id, MessageRole::User, "hi"))
            .await
            .unwrap();

        assert!(store.delete_session(session.id).await.unwrap());
        assert!(!store.delete_session(session.id).await.unwrap());
        assert_eq!(store.count_sessions().await.unwrap(), 0);
        assert_eq!(store.count_messages().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn update_title_reports_missing() {
        let store = store().await;
        let session = store.create_session("old", None).await.unwrap();

        assert!(store.update_session_title(session.id, "new").await.unwrap());
        assert_eq!(store.get_session(session.id).await.unwrap().unwrap().title, "new");
        assert!(!store.update_session_title(Uuid::new_v4(), "x").await.unwrap());
    }

    #[tokio::test]
    async fn clear_messages_returns_count() {
        let store = store().await;
        let session = store.create_session("c", None).await.unwrap();
        for i in 0..3 {
            store
                .append_message(NewMessage::new(session.id, MessageRole::User, format!("{i}")))
                .await
                .unwrap();
        }

        assert_eq!(store.clear_messages(session.id).await.unwrap(), 3);
        assert_eq!(store.clear_messages(session.id).await.unwrap(), 0);
        assert!(store.get_session(session.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn session_stats_aggregates() {
        let store = store().await;
        let session = store.create_session("s", None).await.unwrap();
        store
            .append_message(NewMessage::new(session.id, MessageRole::User, "q1"))
            .await
            .unwrap();
        store
            .append_message(NewMessage {
                model: Some("m".into()),
                prompt_tokens: Some(10),
                completion_tokens: Some(20),
                response_time: Some(1.0),
                ..NewMessage::new(session.id, MessageRole::Assistant, "a1")
            })
            .await
            .unwrap();
        store
            .append_message(NewMessage {
                prompt_tokens: Some(5),
                completion_tokens: Some(7),
                response_time: Some(3.0),
                ..NewMessage::new(session.id, MessageRole::Assistant, "a2")
            })
            .await
            .unwrap();

        let stats = store.session_stats(session.id).await.unwrap().unwrap();
        assert_eq!(stats.total_messages, 3);
        assert_eq!(stats.user_messages, 1);
        assert_eq!(stats.assistant_messages, 2);
        assert_eq!(stats.total_prompt_tokens, 15);
        assert_eq!(stats.total_completion_tokens, 27);
        assert!((stats.avg_response_time - 2.0).abs() < f64::EPSILON);

        let empty = store.create_session("e", None).await.unwrap();
        let stats = store.session_stats(empty.id).await.unwrap().unwrap();
        assert_eq!(stats.total_messages, 0);
        assert!(stats.avg_response_time.abs() < f64::EPSILON);

        assert!(store.session_stats(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn file_database_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("chat.db").display());

        let session_id = {
            let store = ChatStore::connect(&url).await.unwrap();
            let session = store.create_session("kept", None).await.unwrap();
            store
                .append_message(NewMessage::new(session.id, MessageRole::User, "persist me"))
                .await
                .unwrap();
            store.close().await;
            session.id
        };

        let store = ChatStore::connect(&url).await.unwrap();
        let messages = store.list_messages(session_id).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, "persist me");
    }
}
