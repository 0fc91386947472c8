//! SQLite checkpoint store.
//!
//! Two tables:
//! - `threads`: one row per (channel, user) pair seen on a gateway
//! - `messages`: append-only history, ordered by a per-thread sequence number

use crate::Checkpointer;
use async_trait::async_trait;
use chrono::Utc;
use homeclaw_core::error::SessionError;
use homeclaw_core::message::{Message, MessageToolCall, Role};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

pub struct SqliteCheckpointer {
    pool: SqlitePool,
}

impl SqliteCheckpointer {
    /// Open the database file, creating it and its schema if missing.
    pub async fn open(path: &Path) -> Result<Self, SessionError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| SessionError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("Session store opened at {}", path.display());
        Ok(store)
    }

    /// An in-process database. A single connection, since every
    /// `:memory:` connection is its own database.
    pub async fn in_memory() -> Result<Self, SessionError> {
        let options = SqliteConnectOptions::new().in_memory(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| SessionError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), SessionError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS threads (
                channel     TEXT NOT NULL,
                user_id     TEXT NOT NULL,
                thread_id   TEXT NOT NULL,
                created_at  TEXT NOT NULL,
                PRIMARY KEY (channel, user_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| SessionError::MigrationFailed(format!("threads table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                thread_id     TEXT NOT NULL,
                seq           INTEGER NOT NULL,
                id            TEXT NOT NULL,
                role          TEXT NOT NULL,
                content       TEXT NOT NULL,
                tool_calls    TEXT NOT NULL DEFAULT '[]',
                tool_call_id  TEXT,
                created_at    TEXT NOT NULL,
                PRIMARY KEY (thread_id, seq)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| SessionError::MigrationFailed(format!("messages table: {e}")))?;

        debug!("SQLite migrations complete");
        Ok(())
    }

    /// Insert the (channel, user) row if absent and return the stored id.
    pub(crate) async fn register_thread(
        &self,
        channel: &str,
        user_id: &str,
        candidate: &str,
    ) -> Result<String, SessionError> {
        sqlx::query(
            r#"
            INSERT INTO threads (channel, user_id, thread_id, created_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(channel, user_id) DO NOTHING
            "#,
        )
        .bind(channel)
        .bind(user_id)
        .bind(candidate)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| SessionError::Storage(format!("thread INSERT failed: {e}")))?;

        let row = sqlx::query("SELECT thread_id FROM threads WHERE channel = ?1 AND user_id = ?2")
            .bind(channel)
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| SessionError::QueryFailed(format!("thread lookup: {e}")))?;

        row.try_get("thread_id")
            .map_err(|e| SessionError::QueryFailed(format!("thread_id column: {e}")))
    }

    fn row_to_message(row: &sqlx::sqlite::SqliteRow) -> Result<Message, SessionError> {
        let column = |name: &str, e: sqlx::Error| SessionError::QueryFailed(format!("{name} column: {e}"));

        let id: String = row.try_get("id").map_err(|e| column("id", e))?;
        let role: String = row.try_get("role").map_err(|e| column("role", e))?;
        let content: String = row.try_get("content").map_err(|e| column("content", e))?;
        let tool_calls_json: String = row.try_get("tool_calls").map_err(|e| column("tool_calls", e))?;
        let tool_call_id: Option<String> = row.try_get("tool_call_id").map_err(|e| column("tool_call_id", e))?;
        let created_at: String = row.try_get("created_at").map_err(|e| column("created_at", e))?;

        let role: Role = role.parse().map_err(SessionError::QueryFailed)?;
        let tool_calls: Vec<MessageToolCall> = serde_json::from_str(&tool_calls_json)
            .map_err(|e| SessionError::QueryFailed(format!("tool_calls JSON: {e}")))?;
        let timestamp = chrono::DateTime::parse_from_rfc3339(&created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());

        Ok(Message {
            id,
            role,
            content,
            tool_calls,
            tool_call_id,
            timestamp,
        })
    }
}

#[async_trait]
impl Checkpointer for SqliteCheckpointer {
    async fn load(&self, thread_id: &str, limit: usize) -> Result<Vec<Message>, SessionError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM (
                SELECT * FROM messages WHERE thread_id = ?1 ORDER BY seq DESC LIMIT ?2
            ) ORDER BY seq ASC
            "#,
        )
        .bind(thread_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| SessionError::QueryFailed(format!("history load: {e}")))?;

        rows.iter().map(Self::row_to_message).collect()
    }

    async fn append(&self, thread_id: &str, messages: &[Message]) -> Result<(), SessionError> {
        if messages.is_empty() {
            return Ok(());
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| SessionError::Storage(format!("BEGIN failed: {e}")))?;

        let row = sqlx::query("SELECT COALESCE(MAX(seq), 0) AS last FROM messages WHERE thread_id = ?1")
            .bind(thread_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| SessionError::QueryFailed(format!("sequence lookup: {e}")))?;
        let mut seq: i64 = row
            .try_get("last")
            .map_err(|e| SessionError::QueryFailed(format!("last column: {e}")))?;

        for message in messages {
            seq += 1;
            let tool_calls = serde_json::to_string(&message.tool_calls)
                .map_err(|e| SessionError::Storage(format!("tool_calls serialization: {e}")))?;
            sqlx::query(
                r#"
                INSERT INTO messages (thread_id, seq, id, role, content, tool_calls, tool_call_id, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
            )
            .bind(thread_id)
            .bind(seq)
            .bind(&message.id)
            .bind(message.role.as_str())
            .bind(&message.content)
            .bind(&tool_calls)
            .bind(&message.tool_call_id)
            .bind(message.timestamp.to_rfc3339())
            .execute(&mut *tx)
            .await
            .map_err(|e| SessionError::Storage(format!("INSERT failed: {e}")))?;
        }

        tx.commit()
            .await
            .map_err(|e| SessionError::Storage(format!("COMMIT failed: {e}")))?;

        debug!(thread_id, count = messages.len(), "Appended messages");
        Ok(())
    }

    async fn list_threads(&self) -> Result<Vec<String>, SessionError> {
        let rows = sqlx::query("SELECT DISTINCT thread_id FROM messages ORDER BY thread_id")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| SessionError::QueryFailed(format!("thread list: {e}")))?;

        rows.iter()
            .map(|r| {
                r.try_get("thread_id")
                    .map_err(|e| SessionError::QueryFailed(format!("thread_id column: {e}")))
            })
            .collect()
    }

    async fn message_count(&self, thread_id: &str) -> Result<usize, SessionError> {
        let row = sqlx::query("SELECT COUNT(*) AS cnt FROM messages WHERE thread_id = ?1")
            .bind(thread_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| SessionError::QueryFailed(format!("COUNT: {e}")))?;

        let cnt: i64 = row
            .try_get("cnt")
            .map_err(|e| SessionError::QueryFailed(format!("cnt column: {e}")))?;
        Ok(cnt as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn load_returns_latest_in_order() {
        let store = SqliteCheckpointer::in_memory().await.unwrap();
        let batch: Vec<Message> = (0..10).map(|i| Message::user(format!("m{i}"))).collect();
        store.append("t1", &batch[..4]).await.unwrap();
        store.append("t1", &batch[4..]).await.unwrap();

        let last3 = store.load("t1", 3).await.unwrap();
        let contents: Vec<&str> = last3.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m7", "m8", "m9"]);
        assert_eq!(store.message_count("t1").await.unwrap(), 10);
    }

    #[tokio::test]
    async fn threads_are_isolated() {
        let store = SqliteCheckpointer::in_memory().await.unwrap();
        store.append("a", &[Message::user("for a")]).await.unwrap();
        store.append("b", &[Message::user("for b")]).await.unwrap();

        let a = store.load("a", 50).await.unwrap();
        assert_eq!(a.len(), 1);
        assert_eq!(a[0].content, "for a");
        assert_eq!(store.list_threads().await.unwrap(), vec!["a", "b"]);
        assert!(store.load("missing", 50).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn tool_calls_are_preserved() {
        let store = SqliteCheckpointer::in_memory().await.unwrap();
        let mut call = Message::assistant("");
        call.tool_calls.push(MessageToolCall {
            id: "call_1".into(),
            name: "web_search".into(),
            arguments: r#"{"query":"rust"}"#.into(),
        });
        let result = Message::tool_result("call_1", "results");
        store.append("t", &[call, result]).await.unwrap();

        let loaded = store.load("t", 10).await.unwrap();
        assert_eq!(loaded[0].role, Role::Assistant);
        assert_eq!(loaded[0].tool_calls[0].name, "web_search");
        assert_eq!(loaded[1].role, Role::Tool);
        assert_eq!(loaded[1].tool_call_id.as_deref(), Some("call_1"));
    }

    #[tokio::test]
    async fn empty_append_is_noop() {
        let store = SqliteCheckpointer::in_memory().await.unwrap();
        store.append("t", &[]).await.unwrap();
        assert!(store.list_threads().await.unwrap().is_empty());
    }
}
