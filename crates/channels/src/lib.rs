//! Chat channel implementations for HomeClaw.
//!
//! Each channel connects to a chat platform and relays messages to/from
//! the agent through the shared [`Gateway`] loop.
//!
//! Available channels:
//! - **CLI** — Interactive terminal chat (stdin/stdout)
//! - **Telegram** — Bot API long polling
//! - **Discord** — Gateway websocket + REST
//! - **Slack** — Socket Mode websocket + Web API
//! - **Registry** — Named channel instances, doubling as the message router

pub mod cli;
pub mod discord;
pub mod gateway;
pub mod registry;
pub mod slack;
pub mod telegram;

pub use cli::CliChannel;
pub use discord::{DiscordChannel, DiscordConfig};
pub use gateway::{Gateway, split_message};
pub use registry::ChannelRegistry;
pub use slack::{SlackChannel, SlackConfig};
pub use telegram::{TelegramChannel, TelegramConfig};

use homeclaw_config::{ChannelConfig, Credentials};
use homeclaw_core::channel::Channel;
use homeclaw_core::error::ChannelError;
use std::sync::Arc;
use tokio::sync::{Mutex, watch};

/// Names accepted by [`build_channel`].
pub const PLATFORMS: &[&str] = &["telegram", "discord", "slack"];

/// Build the adapter for `name` from its settings, reading tokens from the
/// credential set. A missing token is [`ChannelError::NotConfigured`]; no
/// network I/O happens here.
pub fn build_channel(
    name: &str,
    config: &ChannelConfig,
    credentials: &Credentials,
) -> Result<Arc<dyn Channel>, ChannelError> {
    let token = require(name, &config.token_env, credentials)?;

    match name {
        "telegram" => Ok(Arc::new(TelegramChannel::new(TelegramConfig::new(token)))),
        "discord" => Ok(Arc::new(DiscordChannel::new(DiscordConfig::new(token)))),
        "slack" => {
            let app_env = config.app_token_env.as_deref().unwrap_or("SLACK_APP_TOKEN");
            let app_token = require(name, app_env, credentials)?;
            Ok(Arc::new(SlackChannel::new(SlackConfig::new(token, app_token))))
        }
        other => Err(ChannelError::NotConfigured(format!(
            "unknown channel '{other}' (expected one of: {})",
            PLATFORMS.join(", ")
        ))),
    }
}

fn require(channel: &str, key: &str, credentials: &Credentials) -> Result<String, ChannelError> {
    credentials.get(key).ok_or_else(|| {
        ChannelError::NotConfigured(format!(
            "{channel}: {key} is not set. Add it to ~/.homeclaw/.env or the environment"
        ))
    })
}

/// Network errors without the request URL, which carries the Telegram token.
pub(crate) fn http_error(channel: &str, error: reqwest::Error) -> ChannelError {
    ChannelError::ConnectionLost(format!("{channel}: {}", error.without_url()))
}

pub(crate) async fn stop_signal(slot: &Mutex<Option<watch::Sender<bool>>>) {
    if let Some(tx) = slot.lock().await.take() {
        let _ = tx.send(true);
    }
}
