//! Channel trait — the abstraction over chat platforms.
//!
//! A Channel connects HomeClaw to a messaging platform (Telegram, Discord,
//! Slack, the terminal). Every platform implements the same two operations:
//! receive inbound messages and send text back. Everything else (thread
//! resolution, agent dispatch, chunking) is shared relay code.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use crate::error::ChannelError;

/// A message received from a chat platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Platform name ("telegram", "discord", "slack", "cli")
    pub channel: String,

    /// Platform-specific user identifier of the sender
    pub user_id: String,

    /// Where the reply goes (chat, channel, or DM id)
    pub chat_id: String,

    /// Message text with bot mentions already stripped
    pub text: String,

    /// Human-readable sender name (if the platform provides one)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_name: Option<String>,
}

/// The stream of inbound messages a started channel produces.
pub type InboundStream = mpsc::Receiver<std::result::Result<InboundMessage, ChannelError>>;

/// The core Channel trait.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Channel name (e.g., "telegram", "discord", "cli").
    fn name(&self) -> &str;

    /// Authenticate and start listening for incoming messages.
    ///
    /// Token problems are reported here, before any message is yielded, as
    /// [`ChannelError::NotConfigured`] or [`ChannelError::AuthFailed`].
    async fn start(&self) -> std::result::Result<InboundStream, ChannelError>;

    /// Send a text message to a chat.
    async fn send(&self, chat_id: &str, text: &str) -> std::result::Result<(), ChannelError>;

    /// Send a text message to a user who may not have an open chat yet.
    ///
    /// Platforms where the user id doubles as a chat id can keep the default.
    async fn send_to_user(&self, user_id: &str, text: &str) -> std::result::Result<(), ChannelError> {
        self.send(user_id, text).await
    }

    /// Longest message the platform accepts in one send.
    fn max_message_len(&self) -> usize {
        4000
    }

    /// Stop the channel gracefully.
    async fn stop(&self) -> std::result::Result<(), ChannelError> {
        Ok(())
    }
}

/// Outbound delivery to a named channel, used by the `send_message` tool
/// and by heartbeat tasks that ask for cross-channel delivery.
#[async_trait]
pub trait MessageRouter: Send + Sync {
    /// Names of the channels that can currently deliver.
    fn channels(&self) -> Vec<String>;

    /// Deliver `text` to `user_id` on `channel`.
    async fn deliver(&self, channel: &str, user_id: &str, text: &str) -> std::result::Result<(), ChannelError>;
}
