//! Discord channel adapter.
//!
//! Connects to the Discord Gateway (v10) over a websocket for inbound
//! messages and uses the REST API for replies.
//!
//! Connection lifecycle:
//! 1. `GET /users/@me` validates the token (401 means a bad token).
//! 2. `GET /gateway` returns the websocket URL.
//! 3. Opcode 10 (HELLO) carries the heartbeat interval.
//! 4. Opcode 2 (IDENTIFY) sends the token and intents.
//! 5. READY carries the bot's own user id, used for mention detection.
//! 6. MESSAGE_CREATE events become inbound messages when they are DMs or
//!    mention the bot.
//! 7. Any disconnect reconnects with exponential backoff. Close code 4004
//!    (authentication failed) ends the gateway.

use crate::{http_error, stop_signal};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use homeclaw_core::channel::{Channel, InboundMessage, InboundStream};
use homeclaw_core::error::ChannelError;
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::{Mutex, mpsc, watch};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info, warn};

pub const DISCORD_API: &str = "https://discord.com/api/v10";

/// Discord rejects messages longer than this.
pub const MAX_MESSAGE_LEN: usize = 2000;

/// GUILDS | GUILD_MESSAGES | DIRECT_MESSAGES | MESSAGE_CONTENT
pub const GATEWAY_INTENTS: u64 = (1 << 0) | (1 << 9) | (1 << 12) | (1 << 15);

/// Used when HELLO does not carry an interval.
const DEFAULT_HEARTBEAT_MS: u64 = 41_250;

const BASE_RECONNECT_SECS: u64 = 2;
const MAX_RECONNECT_SECS: u64 = 120;
const MAX_RECONNECT_ATTEMPTS: u32 = 10;

/// Close code Discord sends when IDENTIFY carried a bad token.
const CLOSE_AUTHENTICATION_FAILED: u16 = 4004;

/// Discord channel configuration.
#[derive(Clone)]
pub struct DiscordConfig {
    /// Bot token from the Discord Developer Portal.
    pub bot_token: String,
    /// REST API root, overridable for tests.
    pub api_base: String,
}

impl DiscordConfig {
    pub fn new(bot_token: impl Into<String>) -> Self {
        Self {
            bot_token: bot_token.into(),
            api_base: DISCORD_API.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base.trim_end_matches('/'), path)
    }

    fn authorization(&self) -> String {
        format!("Bot {}", self.bot_token)
    }
}

impl std::fmt::Debug for DiscordConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscordConfig")
            .field("bot_token", &"[REDACTED]")
            .field("api_base", &self.api_base)
            .finish()
    }
}

// --- Gateway wire types ---

#[derive(Debug, Deserialize)]
struct GatewayPayload {
    op: u8,
    #[serde(default)]
    d: Option<Value>,
    #[serde(default)]
    s: Option<u64>,
    #[serde(default)]
    t: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageCreate {
    channel_id: String,
    #[serde(default)]
    guild_id: Option<String>,
    #[serde(default)]
    content: String,
    author: Author,
    #[serde(default)]
    mentions: Vec<MentionedUser>,
}

#[derive(Debug, Deserialize)]
struct Author {
    id: String,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    global_name: Option<String>,
    #[serde(default)]
    bot: bool,
}

#[derive(Debug, Deserialize)]
struct MentionedUser {
    id: String,
}

fn identify_payload(token: &str) -> String {
    json!({
        "op": 2,
        "d": {
            "token": token,
            "intents": GATEWAY_INTENTS,
            "properties": {
                "os": std::env::consts::OS,
                "browser": "homeclaw",
                "device": "homeclaw"
            }
        }
    })
    .to_string()
}

fn heartbeat_payload(sequence: Option<u64>) -> String {
    json!({ "op": 1, "d": sequence }).to_string()
}

fn heartbeat_interval(hello: Option<&Value>) -> u64 {
    hello
        .and_then(|d| d.get("heartbeat_interval"))
        .and_then(Value::as_u64)
        .filter(|ms| *ms > 0)
        .unwrap_or(DEFAULT_HEARTBEAT_MS)
}

fn backoff_delay(attempt: u32) -> Duration {
    let secs = BASE_RECONNECT_SECS.saturating_mul(1u64 << attempt.min(16));
    Duration::from_secs(secs.min(MAX_RECONNECT_SECS))
}

/// Remove `<@id>` and `<@!id>` mentions of the bot from message text.
pub fn strip_mentions(content: &str, bot_id: &str) -> String {
    content
        .replace(&format!("<@{bot_id}>"), "")
        .replace(&format!("<@!{bot_id}>"), "")
        .trim()
        .to_string()
}

/// Turn a MESSAGE_CREATE payload into an inbound message, or `None` when
/// the bot should ignore it.
///
/// Guild messages are only relayed when they mention the bot; DMs always
/// are. Messages from bots (including this one) are dropped.
fn parse_message_create(data: &Value, bot_id: Option<&str>) -> Option<InboundMessage> {
    let msg: MessageCreate = serde_json::from_value(data.clone()).ok()?;
    if msg.author.bot {
        return None;
    }

    let text = match (msg.guild_id.as_deref(), bot_id) {
        (None, Some(me)) => strip_mentions(&msg.content, me),
        (None, None) => msg.content.trim().to_string(),
        (Some(_), Some(me)) => {
            let mentioned = msg.mentions.iter().any(|u| u.id == me)
                || msg.content.contains(&format!("<@{me}>"))
                || msg.content.contains(&format!("<@!{me}>"));
            if !mentioned {
                return None;
            }
            strip_mentions(&msg.content, me)
        }
        // Mentions cannot be recognised before READY
        (Some(_), None) => return None,
    };

    if text.is_empty() {
        return None;
    }

    Some(InboundMessage {
        channel: "discord".into(),
        user_id: msg.author.id,
        chat_id: msg.channel_id,
        text,
        sender_name: msg.author.global_name.or(msg.author.username),
    })
}

/// How one websocket session ended.
enum SessionEnd {
    Shutdown,
    Reconnect,
}

struct GatewaySession {
    client: reqwest::Client,
    config: DiscordConfig,
    bot_user_id: Arc<RwLock<Option<String>>>,
    tx: mpsc::Sender<Result<InboundMessage, ChannelError>>,
}

impl GatewaySession {
    fn bot_id(&self) -> Option<String> {
        self.bot_user_id.read().ok().and_then(|id| id.clone())
    }

    async fn fetch_gateway_url(&self) -> Result<String, ChannelError> {
        let response = self
            .client
            .get(self.config.url("/gateway"))
            .header("Authorization", self.config.authorization())
            .send()
            .await
            .map_err(|e| http_error("discord", e))?;

        let body: Value = response.json().await.map_err(|e| http_error("discord", e))?;
        body.get("url")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ChannelError::InvalidPayload("discord: /gateway returned no url".into()))
    }

    /// Reconnect loop. Returns on shutdown, on an authentication failure, or
    /// when the inbound receiver is dropped.
    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut attempt = 0u32;

        loop {
            if self.tx.is_closed() {
                return;
            }

            match self.connect_and_listen(&mut shutdown, &mut attempt).await {
                Ok(SessionEnd::Shutdown) => {
                    info!("Discord gateway stopped");
                    return;
                }
                Ok(SessionEnd::Reconnect) => {}
                Err(e) if e.is_auth() => {
                    warn!(error = %e, "Discord gateway rejected the token");
                    let _ = self.tx.send(Err(e)).await;
                    return;
                }
                Err(e) => warn!(error = %e, "Discord gateway session failed"),
            }

            let delay = backoff_delay(attempt);
            attempt = (attempt + 1).min(MAX_RECONNECT_ATTEMPTS);
            info!(delay_secs = delay.as_secs(), "Discord reconnecting");
            tokio::select! {
                _ = shutdown.changed() => return,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn connect_and_listen(
        &self,
        shutdown: &mut watch::Receiver<bool>,
        attempt: &mut u32,
    ) -> Result<SessionEnd, ChannelError> {
        let url = self.fetch_gateway_url().await?;
        let ws_url = format!("{url}/?v=10&encoding=json");
        let (ws, _) = connect_async(ws_url.as_str())
            .await
            .map_err(|e| ChannelError::ConnectionLost(format!("discord: {e}")))?;
        let (mut writer, mut reader) = ws.split();
        debug!("Discord websocket connected");

        // HELLO comes first
        let interval_ms = loop {
            let frame = tokio::select! {
                _ = shutdown.changed() => return Ok(SessionEnd::Shutdown),
                frame = reader.next() => frame,
            };
            match frame {
                Some(Ok(WsMessage::Text(raw))) => {
                    if let Ok(payload) = serde_json::from_str::<GatewayPayload>(raw.as_str())
                        && payload.op == 10
                    {
                        break heartbeat_interval(payload.d.as_ref());
                    }
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(ChannelError::ConnectionLost(format!("discord: {e}"))),
                None => return Err(ChannelError::ConnectionLost("discord: closed before HELLO".into())),
            }
        };

        writer
            .send(WsMessage::Text(identify_payload(&self.config.bot_token).into()))
            .await
            .map_err(|e| ChannelError::ConnectionLost(format!("discord: identify failed: {e}")))?;

        let mut heartbeat = tokio::time::interval(Duration::from_millis(interval_ms));
        heartbeat.tick().await;
        let mut sequence: Option<u64> = None;

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    let _ = writer.close().await;
                    return Ok(SessionEnd::Shutdown);
                }

                _ = heartbeat.tick() => {
                    if let Err(e) = writer.send(WsMessage::Text(heartbeat_payload(sequence).into())).await {
                        warn!(error = %e, "Discord heartbeat send failed");
                        return Ok(SessionEnd::Reconnect);
                    }
                }

                frame = reader.next() => match frame {
                    Some(Ok(WsMessage::Text(raw))) => {
                        let payload = match serde_json::from_str::<GatewayPayload>(raw.as_str()) {
                            Ok(payload) => payload,
                            Err(e) => {
                                debug!(error = %e, "Unparseable Discord payload");
                                continue;
                            }
                        };
                        if payload.s.is_some() {
                            sequence = payload.s;
                        }

                        match payload.op {
                            0 => match payload.t.as_deref() {
                                Some("READY") => {
                                    let id = payload
                                        .d
                                        .as_ref()
                                        .and_then(|d| d.pointer("/user/id"))
                                        .and_then(Value::as_str);
                                    if let Some(id) = id
                                        && let Ok(mut slot) = self.bot_user_id.write()
                                    {
                                        *slot = Some(id.to_string());
                                    }
                                    *attempt = 0;
                                    info!(bot_id = ?id, "Discord gateway READY");
                                }
                                Some("MESSAGE_CREATE") => {
                                    let me = self.bot_id();
                                    if let Some(data) = payload.d.as_ref()
                                        && let Some(inbound) = parse_message_create(data, me.as_deref())
                                        && self.tx.send(Ok(inbound)).await.is_err()
                                    {
                                        return Ok(SessionEnd::Shutdown);
                                    }
                                }
                                Some(other) => debug!(event = other, "Ignoring Discord event"),
                                None => {}
                            },
                            1 => {
                                if let Err(e) = writer.send(WsMessage::Text(heartbeat_payload(sequence).into())).await {
                                    warn!(error = %e, "Discord heartbeat reply failed");
                                    return Ok(SessionEnd::Reconnect);
                                }
                            }
                            7 => {
                                info!("Discord requested a reconnect");
                                return Ok(SessionEnd::Reconnect);
                            }
                            9 => {
                                warn!("Discord invalidated the session");
                                return Ok(SessionEnd::Reconnect);
                            }
                            11 => debug!("Discord heartbeat ACK"),
                            op => debug!(op, "Unhandled Discord opcode"),
                        }
                    }
                    Some(Ok(WsMessage::Ping(data))) => {
                        if writer.send(WsMessage::Pong(data)).await.is_err() {
                            return Ok(SessionEnd::Reconnect);
                        }
                    }
                    Some(Ok(WsMessage::Close(frame))) => {
                        if let Some(frame) = &frame
                            && u16::from(frame.code) == CLOSE_AUTHENTICATION_FAILED
                        {
                            return Err(ChannelError::AuthFailed {
                                channel: "discord".into(),
                                reason: "gateway closed with 4004 (authentication failed)".into(),
                            });
                        }
                        info!(frame = ?frame, "Discord closed the websocket");
                        return Ok(SessionEnd::Reconnect);
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(ChannelError::ConnectionLost(format!("discord: {e}"))),
                    None => return Ok(SessionEnd::Reconnect),
                }
            }
        }
    }
}

/// Discord channel adapter.
pub struct DiscordChannel {
    config: DiscordConfig,
    client: reqwest::Client,
    bot_user_id: Arc<RwLock<Option<String>>>,
    shutdown: Mutex<Option<watch::Sender<bool>>>,
}

impl DiscordChannel {
    pub fn new(config: DiscordConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
            bot_user_id: Arc::new(RwLock::new(None)),
            shutdown: Mutex::new(None),
        }
    }

    /// Validate the token and learn the bot's user id.
    async fn authenticate(&self) -> Result<String, ChannelError> {
        let response = self
            .client
            .get(self.config.url("/users/@me"))
            .header("Authorization", self.config.authorization())
            .send()
            .await
            .map_err(|e| http_error("discord", e))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(ChannelError::AuthFailed {
                channel: "discord".into(),
                reason: "401 Unauthorized".into(),
            });
        }
        if !status.is_success() {
            return Err(ChannelError::ConnectionLost(format!("discord: /users/@me returned {status}")));
        }

        let me: Value = response.json().await.map_err(|e| http_error("discord", e))?;
        let id = me
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| ChannelError::InvalidPayload("discord: /users/@me returned no id".into()))?
            .to_string();

        if let Ok(mut slot) = self.bot_user_id.write() {
            *slot = Some(id.clone());
        }
        Ok(id)
    }

    async fn post_json(&self, path: &str, body: &Value) -> Result<Value, ChannelError> {
        let response = self
            .client
            .post(self.config.url(path))
            .header("Authorization", self.config.authorization())
            .json(body)
            .send()
            .await
            .map_err(|e| http_error("discord", e))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(ChannelError::AuthFailed {
                channel: "discord".into(),
                reason: "401 Unauthorized".into(),
            });
        }
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(ChannelError::DeliveryFailed {
                channel: "discord".into(),
                reason: format!("{status}: {detail}"),
            });
        }
        response.json().await.map_err(|e| http_error("discord", e))
    }
}

#[async_trait]
impl Channel for DiscordChannel {
    fn name(&self) -> &str {
        "discord"
    }

    async fn start(&self) -> Result<InboundStream, ChannelError> {
        if self.config.bot_token.trim().is_empty() {
            return Err(ChannelError::NotConfigured("discord: bot token is empty".into()));
        }

        let bot_id = self.authenticate().await?;
        info!(bot_id = %bot_id, "Discord bot authenticated, connecting to gateway");

        let (tx, rx) = mpsc::channel(64);
        let (stop_tx, stop_rx) = watch::channel(false);
        *self.shutdown.lock().await = Some(stop_tx);

        let session = GatewaySession {
            client: self.client.clone(),
            config: self.config.clone(),
            bot_user_id: self.bot_user_id.clone(),
            tx,
        };
        tokio::spawn(session.run(stop_rx));
        Ok(rx)
    }

    async fn send(&self, chat_id: &str, text: &str) -> Result<(), ChannelError> {
        self.post_json(&format!("/channels/{chat_id}/messages"), &json!({ "content": text }))
            .await
            .map(|_| ())
    }

    /// Opens (or reuses) the DM channel with `user_id` first.
    async fn send_to_user(&self, user_id: &str, text: &str) -> Result<(), ChannelError> {
        let dm = self
            .post_json("/users/@me/channels", &json!({ "recipient_id": user_id }))
            .await?;
        let channel_id = dm
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| ChannelError::InvalidPayload("discord: DM channel has no id".into()))?;
        self.send(channel_id, text).await
    }

    fn max_message_len(&self) -> usize {
        MAX_MESSAGE_LEN
    }

    async fn stop(&self) -> Result<(), ChannelError> {
        stop_signal(&self.shutdown).await;
        Ok(())
    }
}
