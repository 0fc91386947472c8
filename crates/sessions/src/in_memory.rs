//! In-memory checkpointer for tests and ephemeral runs.

use crate::Checkpointer;
use async_trait::async_trait;
use homeclaw_core::error::SessionError;
use homeclaw_core::message::Message;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

#[derive(Default)]
pub struct InMemoryCheckpointer {
    threads: RwLock<BTreeMap<String, Vec<Message>>>,
}

impl InMemoryCheckpointer {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Checkpointer for InMemoryCheckpointer {
    async fn load(&self, thread_id: &str, limit: usize) -> Result<Vec<Message>, SessionError> {
        let threads = self.threads.read().await;
        let Some(history) = threads.get(thread_id) else {
            return Ok(Vec::new());
        };
        let skip = history.len().saturating_sub(limit);
        Ok(history[skip..].to_vec())
    }

    async fn append(&self, thread_id: &str, messages: &[Message]) -> Result<(), SessionError> {
        if messages.is_empty() {
            return Ok(());
        }
        self.threads
            .write()
            .await
            .entry(thread_id.to_string())
            .or_default()
            .extend_from_slice(messages);
        Ok(())
    }

    async fn list_threads(&self) -> Result<Vec<String>, SessionError> {
        Ok(self.threads.read().await.keys().cloned().collect())
    }

    async fn message_count(&self, thread_id: &str) -> Result<usize, SessionError> {
        Ok(self.threads.read().await.get(thread_id).map_or(0, Vec::len))
    }
}
