//! Shared relay between a chat channel and the agent.
//!
//! Every platform runs the same loop: take an inbound message, check the
//! sender against the allowlist, resolve the sender's thread, invoke the
//! agent, and send the reply back in platform-sized chunks.

use homeclaw_agent::reply_or_apology;
use homeclaw_core::agent::Agent;
use homeclaw_core::channel::{Channel, InboundMessage};
use homeclaw_core::error::{AgentInvocationError, ChannelError};
use homeclaw_sessions::SessionManager;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Reply to senders outside the allowlist.
pub const UNAUTHORIZED_REPLY: &str = "Unauthorized.";

/// Relays one channel's messages to the agent and back.
pub struct Gateway {
    channel: Arc<dyn Channel>,
    agent: Arc<dyn Agent>,
    sessions: Arc<SessionManager>,
    allowed_users: Vec<String>,
}

impl Gateway {
    /// `allowed_users` holds platform user ids; empty lets everyone in.
    pub fn new(
        channel: Arc<dyn Channel>,
        agent: Arc<dyn Agent>,
        sessions: Arc<SessionManager>,
        allowed_users: Vec<String>,
    ) -> Self {
        Self {
            channel,
            agent,
            sessions,
            allowed_users,
        }
    }

    fn is_allowed(&self, user_id: &str) -> bool {
        self.allowed_users.is_empty() || self.allowed_users.iter().any(|u| u == user_id)
    }

    /// Start the channel and relay until shutdown or until the channel's
    /// stream ends.
    ///
    /// Start-up failures (missing or rejected token) are returned; everything
    /// after that is logged and the loop keeps going. An authentication
    /// failure reported mid-stream also ends the gateway.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<(), ChannelError> {
        let name = self.channel.name().to_string();
        let mut inbound = self.channel.start().await?;
        info!(channel = %name, "Gateway running");

        let result = loop {
            let next = tokio::select! {
                _ = shutdown.changed() => break Ok(()),
                next = inbound.recv() => next,
            };

            match next {
                Some(Ok(message)) => self.handle(message).await,
                Some(Err(e)) if e.is_auth() => break Err(e),
                Some(Err(e)) => warn!(channel = %name, error = %e, "Inbound error"),
                None => {
                    info!(channel = %name, "Channel stream ended");
                    break Ok(());
                }
            }
        };

        if let Err(e) = self.channel.stop().await {
            warn!(channel = %name, error = %e, "Failed to stop channel");
        }
        info!(channel = %name, "Gateway stopped");
        result
    }

    async fn handle(&self, message: InboundMessage) {
        let channel = self.channel.name();

        if !self.is_allowed(&message.user_id) {
            warn!(channel, user_id = %message.user_id, "Rejected message from unauthorized sender");
            self.reply(&message.chat_id, UNAUTHORIZED_REPLY).await;
            return;
        }

        info!(
            channel,
            user_id = %message.user_id,
            sender = ?message.sender_name,
            chars = message.text.chars().count(),
            "Inbound message"
        );

        let outcome = match self.sessions.resolve_thread(channel, &message.user_id).await {
            Ok(thread_id) => {
                debug!(channel, thread_id = %thread_id, "Dispatching to agent");
                self.agent.invoke(&thread_id, &message.text).await
            }
            Err(e) => Err(AgentInvocationError::Session(e)),
        };

        let reply = reply_or_apology(outcome);
        self.reply(&message.chat_id, &reply).await;
    }

    async fn reply(&self, chat_id: &str, text: &str) {
        let chunks = split_message(text, self.channel.max_message_len());
        let total = chunks.len();
        for (i, chunk) in chunks.iter().enumerate() {
            if let Err(e) = self.channel.send(chat_id, chunk).await {
                warn!(
                    channel = self.channel.name(),
                    chat_id,
                    chunk = i + 1,
                    total,
                    error = %e,
                    "Failed to send reply"
                );
            }
        }
    }
}

/// Split `text` into chunks of at most `max_len` characters, breaking on
/// line boundaries where possible. Lines longer than `max_len` are cut.
pub fn split_message(text: &str, max_len: usize) -> Vec<String> {
    let max_len = max_len.max(1);
    if text.chars().count() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for line in text.split('\n') {
        let line_len = line.chars().count();
        let needed = if current.is_empty() {
            line_len
        } else {
            current_len + 1 + line_len
        };

        if needed <= max_len {
            if !current.is_empty() {
                current.push('\n');
            }
            current.push_str(line);
            current_len = needed;
            continue;
        }

        if !current.trim().is_empty() {
            chunks.push(std::mem::take(&mut current));
        }
        current.clear();
        current_len = 0;

        if line_len <= max_len {
            current.push_str(line);
            current_len = line_len;
            continue;
        }

        let chars: Vec<char> = line.chars().collect();
        let mut pieces = chars.chunks(max_len).peekable();
        while let Some(piece) = pieces.next() {
            let piece: String = piece.iter().collect();
            if pieces.peek().is_some() {
                chunks.push(piece);
            } else {
                current_len = piece.chars().count();
                current = piece;
            }
        }
    }

    if !current.trim().is_empty() {
        chunks.push(current);
    }
    chunks
}
