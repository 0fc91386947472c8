//! Conversation threads and their persisted history.
//!
//! Every conversation is keyed by a thread id. The interactive REPL uses a
//! fixed default thread, each heartbeat firing gets a fresh one, and each
//! (platform, user) pair on a chat gateway maps to one stable thread.
//!
//! History lives in `sessions/checkpoints.sqlite` inside the workspace. Several
//! processes (REPL, gateways, scheduler) may open the same file at once; the
//! database runs in WAL mode with a busy timeout and every write is a single
//! transaction.

pub mod in_memory;
pub mod sqlite;

use async_trait::async_trait;
use homeclaw_core::error::SessionError;
use homeclaw_core::message::Message;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

pub use in_memory::InMemoryCheckpointer;
pub use sqlite::SqliteCheckpointer;

/// Thread used by the REPL when `-t` is not given.
pub const DEFAULT_THREAD_ID: &str = "homeclaw-interactive";

/// Checkpoint database, relative to the workspace root.
pub const CHECKPOINT_DB: &str = "sessions/checkpoints.sqlite";

pub fn default_thread_id() -> &'static str {
    DEFAULT_THREAD_ID
}

/// A fresh, unique thread id: `homeclaw-` plus 12 hex characters.
pub fn new_thread_id() -> String {
    let hex = uuid::Uuid::new_v4().simple().to_string();
    format!("homeclaw-{}", &hex[..12])
}

/// The stable thread for one user on one platform.
pub fn channel_thread_id(channel: &str, user_id: &str) -> String {
    format!("homeclaw-{channel}-{user_id}")
}

/// Persistent per-thread message history.
#[async_trait]
pub trait Checkpointer: Send + Sync {
    /// The most recent `limit` messages of a thread, oldest first.
    async fn load(&self, thread_id: &str, limit: usize) -> Result<Vec<Message>, SessionError>;

    /// Append messages to a thread atomically.
    async fn append(&self, thread_id: &str, messages: &[Message]) -> Result<(), SessionError>;

    /// Every thread id with at least one stored message.
    async fn list_threads(&self) -> Result<Vec<String>, SessionError>;

    async fn message_count(&self, thread_id: &str) -> Result<usize, SessionError>;
}

/// Owns the checkpoint database and the thread registry.
pub struct SessionManager {
    store: Arc<SqliteCheckpointer>,
}

impl SessionManager {
    /// Open (or create) the checkpoint database of a workspace.
    pub async fn open(workspace_dir: &Path) -> Result<Self, SessionError> {
        let path = workspace_dir.join(CHECKPOINT_DB);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                SessionError::Storage(format!("cannot create {}: {e}", parent.display()))
            })?;
        }
        let store = SqliteCheckpointer::open(&path).await?;
        Ok(Self {
            store: Arc::new(store),
        })
    }

    /// A throwaway database that lives as long as this manager.
    pub async fn in_memory() -> Result<Self, SessionError> {
        let store = SqliteCheckpointer::in_memory().await?;
        Ok(Self {
            store: Arc::new(store),
        })
    }

    /// The thread id for `(channel, user_id)`, registering it on first use.
    ///
    /// Concurrent callers, in this process or another, converge on the same
    /// id.
    pub async fn resolve_thread(&self, channel: &str, user_id: &str) -> Result<String, SessionError> {
        let candidate = channel_thread_id(channel, user_id);
        let thread_id = self.store.register_thread(channel, user_id, &candidate).await?;
        debug!(channel, user_id, thread_id = %thread_id, "Resolved thread");
        Ok(thread_id)
    }

    pub fn get_checkpointer(&self) -> Arc<dyn Checkpointer> {
        self.store.clone()
    }

    /// Number of threads with stored history.
    pub async fn thread_count(&self) -> Result<usize, SessionError> {
        Ok(self.store.list_threads().await?.len())
    }
}
