//! Telegram channel adapter.
//!
//! Talks to the Telegram Bot API directly over HTTPS: `getMe` validates the
//! token at start, `getUpdates` long-polls for new messages, and
//! `sendMessage` delivers replies. `/start` is answered here with a fixed
//! greeting and never reaches the agent.

use crate::{http_error, stop_signal};
use async_trait::async_trait;
use homeclaw_core::channel::{Channel, InboundMessage, InboundStream};
use homeclaw_core::error::ChannelError;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc, watch};
use tracing::{debug, info, warn};

pub const TELEGRAM_API: &str = "https://api.telegram.org";

/// Reply to `/start`.
pub const START_GREETING: &str = "Hello! I'm HomeClaw, your personal AI assistant. Send me a message!";

/// Telegram rejects messages longer than this.
pub const MAX_MESSAGE_LEN: usize = 4096;

/// Long-poll timeout passed to `getUpdates`.
const POLL_TIMEOUT_SECS: u64 = 30;

/// Pause after a failed poll before trying again.
const RETRY_DELAY: Duration = Duration::from_secs(5);

/// Telegram channel configuration.
#[derive(Clone)]
pub struct TelegramConfig {
    /// Bot token from @BotFather.
    pub bot_token: String,
    /// Bot API root, overridable for tests.
    pub api_base: String,
}

impl TelegramConfig {
    pub fn new(bot_token: impl Into<String>) -> Self {
        Self {
            bot_token: bot_token.into(),
            api_base: TELEGRAM_API.into(),
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base.trim_end_matches('/'), self.bot_token, method)
    }
}

impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("bot_token", &"[REDACTED]")
            .field("api_base", &self.api_base)
            .finish()
    }
}

// --- Bot API wire types ---

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BotUser {
    #[serde(default)]
    username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    #[serde(default)]
    message: Option<TgMessage>,
}

#[derive(Debug, Deserialize)]
struct TgMessage {
    chat: TgChat,
    #[serde(default)]
    from: Option<TgUser>,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TgChat {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct TgUser {
    id: i64,
    #[serde(default)]
    is_bot: bool,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    first_name: Option<String>,
}

/// What one update asks of the adapter.
#[derive(Debug, PartialEq)]
enum UpdateAction {
    Greet { chat_id: String },
    Relay(InboundMessage),
}

fn is_start_command(text: &str) -> bool {
    text.split_whitespace()
        .next()
        .is_some_and(|cmd| cmd == "/start" || cmd.starts_with("/start@"))
}

fn classify(update: Update) -> Option<UpdateAction> {
    let message = update.message?;
    let from = message.from?;
    if from.is_bot {
        return None;
    }
    let text = message.text?.trim().to_string();
    if text.is_empty() {
        return None;
    }

    let chat_id = message.chat.id.to_string();
    if is_start_command(&text) {
        return Some(UpdateAction::Greet { chat_id });
    }

    Some(UpdateAction::Relay(InboundMessage {
        channel: "telegram".into(),
        user_id: from.id.to_string(),
        chat_id,
        text,
        sender_name: from.username.or(from.first_name),
    }))
}

fn api_failure(response: ApiResponse<serde_json::Value>, what: &str) -> String {
    response
        .description
        .unwrap_or_else(|| format!("{what} returned ok=false"))
}

async fn send_text(
    client: &reqwest::Client,
    config: &TelegramConfig,
    chat_id: &str,
    text: &str,
) -> Result<(), ChannelError> {
    let response = client
        .post(config.method_url("sendMessage"))
        .json(&serde_json::json!({ "chat_id": chat_id, "text": text }))
        .send()
        .await
        .map_err(|e| http_error("telegram", e))?;

    let status = response.status();
    let body: ApiResponse<serde_json::Value> = response
        .json()
        .await
        .map_err(|e| http_error("telegram", e))?;

    if status == reqwest::StatusCode::UNAUTHORIZED {
        return Err(ChannelError::AuthFailed {
            channel: "telegram".into(),
            reason: api_failure(body, "sendMessage"),
        });
    }
    if !body.ok {
        return Err(ChannelError::DeliveryFailed {
            channel: "telegram".into(),
            reason: api_failure(body, "sendMessage"),
        });
    }
    Ok(())
}

async fn fetch_updates(
    client: &reqwest::Client,
    config: &TelegramConfig,
    offset: i64,
) -> Result<Vec<Update>, ChannelError> {
    let response = client
        .get(config.method_url("getUpdates"))
        .query(&[("offset", offset.to_string()), ("timeout", POLL_TIMEOUT_SECS.to_string())])
        .timeout(Duration::from_secs(POLL_TIMEOUT_SECS + 10))
        .send()
        .await
        .map_err(|e| http_error("telegram", e))?;

    if response.status() == reqwest::StatusCode::UNAUTHORIZED {
        return Err(ChannelError::AuthFailed {
            channel: "telegram".into(),
            reason: "token rejected while polling".into(),
        });
    }

    let body: ApiResponse<Vec<Update>> = response
        .json()
        .await
        .map_err(|e| ChannelError::InvalidPayload(format!("telegram getUpdates: {}", e.without_url())))?;

    if !body.ok {
        return Err(ChannelError::ConnectionLost(
            body.description.unwrap_or_else(|| "getUpdates returned ok=false".into()),
        ));
    }
    Ok(body.result.unwrap_or_default())
}

async fn poll_loop(
    client: reqwest::Client,
    config: TelegramConfig,
    tx: mpsc::Sender<Result<InboundMessage, ChannelError>>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut offset = 0i64;

    loop {
        if tx.is_closed() {
            return;
        }

        let batch = tokio::select! {
            _ = shutdown.changed() => {
                info!("Telegram polling stopped");
                return;
            }
            result = fetch_updates(&client, &config, offset) => result,
        };

        let updates = match batch {
            Ok(updates) => updates,
            Err(e) if e.is_auth() => {
                let _ = tx.send(Err(e)).await;
                return;
            }
            Err(e) => {
                warn!(error = %e, "Telegram poll failed, retrying");
                tokio::select! {
                    _ = shutdown.changed() => return,
                    _ = tokio::time::sleep(RETRY_DELAY) => continue,
                }
            }
        };

        for update in updates {
            offset = offset.max(update.update_id + 1);
            match classify(update) {
                Some(UpdateAction::Greet { chat_id }) => {
                    debug!(chat_id = %chat_id, "Answering /start");
                    if let Err(e) = send_text(&client, &config, &chat_id, START_GREETING).await {
                        warn!(error = %e, "Failed to send /start greeting");
                    }
                }
                Some(UpdateAction::Relay(message)) => {
                    if tx.send(Ok(message)).await.is_err() {
                        return;
                    }
                }
                None => {}
            }
        }
    }
}

/// Telegram channel adapter.
pub struct TelegramChannel {
    config: TelegramConfig,
    client: reqwest::Client,
    shutdown: Mutex<Option<watch::Sender<bool>>>,
}

impl TelegramChannel {
    pub fn new(config: TelegramConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
            shutdown: Mutex::new(None),
        }
    }

    /// Validate the token with `getMe`, returning the bot's username.
    async fn authenticate(&self) -> Result<String, ChannelError> {
        let response = self
            .client
            .get(self.config.method_url("getMe"))
            .send()
            .await
            .map_err(|e| http_error("telegram", e))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::NOT_FOUND {
            return Err(ChannelError::AuthFailed {
                channel: "telegram".into(),
                reason: format!("getMe returned {status}"),
            });
        }

        let body: ApiResponse<BotUser> = response
            .json()
            .await
            .map_err(|e| ChannelError::InvalidPayload(format!("telegram getMe: {}", e.without_url())))?;
        if !body.ok {
            return Err(ChannelError::AuthFailed {
                channel: "telegram".into(),
                reason: body.description.unwrap_or_else(|| "getMe returned ok=false".into()),
            });
        }

        Ok(body
            .result
            .and_then(|bot| bot.username)
            .unwrap_or_else(|| "unknown".into()))
    }
}

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn start(&self) -> Result<InboundStream, ChannelError> {
        if self.config.bot_token.trim().is_empty() {
            return Err(ChannelError::NotConfigured("telegram: bot token is empty".into()));
        }

        let username = self.authenticate().await?;
        info!(bot = %username, "Telegram bot authenticated, polling for updates");

        let (tx, rx) = mpsc::channel(64);
        let (stop_tx, stop_rx) = watch::channel(false);
        *self.shutdown.lock().await = Some(stop_tx);

        tokio::spawn(poll_loop(self.client.clone(), self.config.clone(), tx, stop_rx));
        Ok(rx)
    }

    async fn send(&self, chat_id: &str, text: &str) -> Result<(), ChannelError> {
        send_text(&self.client, &self.config, chat_id, text).await
    }

    fn max_message_len(&self) -> usize {
        MAX_MESSAGE_LEN
    }

    async fn stop(&self) -> Result<(), ChannelError> {
        stop_signal(&self.shutdown).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::serve_once;

    fn update(json: serde_json::Value) -> Update {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn debug_redacts_token() {
        let config = TelegramConfig::new("123:secret");
        let debug = format!("{config:?}");
        assert!(!debug.contains("secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn text_message_is_relayed() {
        let action = classify(update(serde_json::json!({
            "update_id": 10,
            "message": {
                "message_id": 1,
                "chat": { "id": 555, "type": "private" },
                "from": { "id": 42, "is_bot": false, "first_name": "Ada", "username": "ada" },
                "text": "  what's on today?  "
            }
        })));

        assert_eq!(
            action,
            Some(UpdateAction::Relay(InboundMessage {
                channel: "telegram".into(),
                user_id: "42".into(),
                chat_id: "555".into(),
                text: "what's on today?".into(),
                sender_name: Some("ada".into()),
            }))
        );
    }

    #[test]
    fn start_command_is_greeted_locally() {
        for text in ["/start", "/start@homeclaw_bot", "/start deep-link"] {
            let action = classify(update(serde_json::json!({
                "update_id": 11,
                "message": {
                    "chat": { "id": 7 },
                    "from": { "id": 7, "is_bot": false, "first_name": "Ada" },
                    "text": text
                }
            })));
            assert_eq!(action, Some(UpdateAction::Greet { chat_id: "7".into() }), "{text}");
        }
        assert!(!is_start_command("/started"));
    }

    #[test]
    fn non_text_and_bot_updates_are_skipped() {
        let photo = update(serde_json::json!({
            "update_id": 12,
            "message": { "chat": { "id": 1 }, "from": { "id": 1, "first_name": "A" } }
        }));
        assert_eq!(classify(photo), None);

        let bot = update(serde_json::json!({
            "update_id": 13,
            "message": { "chat": { "id": 1 }, "from": { "id": 9, "is_bot": true }, "text": "hi" }
        }));
        assert_eq!(classify(bot), None);

        let edited = update(serde_json::json!({ "update_id": 14, "edited_message": {} }));
        assert_eq!(classify(edited), None);
    }

    #[test]
    fn updates_response_parses() {
        let body: ApiResponse<Vec<Update>> = serde_json::from_str(
            r#"{"ok":true,"result":[{"update_id":5,"message":{"chat":{"id":1},"text":"x"}}]}"#,
        )
        .unwrap();
        assert!(body.ok);
        assert_eq!(body.result.unwrap()[0].update_id, 5);
    }

    #[tokio::test]
    async fn empty_token_is_not_configured() {
        let ch = TelegramChannel::new(TelegramConfig::new(""));
        assert!(matches!(ch.start().await, Err(ChannelError::NotConfigured(_))));
    }

    #[tokio::test]
    async fn rejected_token_fails_at_start() {
        let base = serve_once(
            "401 Unauthorized",
            r#"{"ok":false,"error_code":401,"description":"Unauthorized"}"#,
        )
        .await;
        let ch = TelegramChannel::new(TelegramConfig {
            bot_token: "123:bad".into(),
            api_base: base,
        });

        let err = ch.start().await.unwrap_err();
        assert!(matches!(err, ChannelError::AuthFailed { .. }));
        assert!(!err.to_string().contains("123:bad"));
    }

    #[tokio::test]
    async fn send_reports_api_failure() {
        let base = serve_once(
            "400 Bad Request",
            r#"{"ok":false,"error_code":400,"description":"Bad Request: chat not found"}"#,
        )
        .await;
        let ch = TelegramChannel::new(TelegramConfig {
            bot_token: "123:abc".into(),
            api_base: base,
        });

        match ch.send("999", "hello").await {
            Err(ChannelError::DeliveryFailed { reason, .. }) => assert!(reason.contains("chat not found")),
            other => panic!("expected DeliveryFailed, got {other:?}"),
        }
        assert_eq!(ch.max_message_len(), 4096);
    }
}
