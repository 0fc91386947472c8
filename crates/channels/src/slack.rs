//! Slack channel adapter.
//!
//! Inbound messages arrive over Socket Mode: `apps.connections.open` (app
//! token) returns a websocket URL, and every envelope received on it is
//! acknowledged by `envelope_id`. Replies go out through `chat.postMessage`
//! with the bot token.
//!
//! The bot answers `app_mention` events anywhere and plain `message` events
//! in direct messages.

use crate::{http_error, stop_signal};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use homeclaw_core::channel::{Channel, InboundMessage, InboundStream};
use homeclaw_core::error::ChannelError;
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;
use tokio::sync::{Mutex, mpsc, watch};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info, warn};

pub const SLACK_API: &str = "https://slack.com/api";

const RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// Slack error codes that mean the token itself is bad.
const AUTH_ERRORS: &[&str] = &[
    "invalid_auth",
    "not_authed",
    "account_inactive",
    "token_revoked",
    "token_expired",
    "not_allowed_token_type",
];

/// Slack channel configuration.
#[derive(Clone)]
pub struct SlackConfig {
    /// Bot token (`xoxb-...`) for the Web API.
    pub bot_token: String,
    /// App-level token (`xapp-...`) for Socket Mode.
    pub app_token: String,
    /// Web API root, overridable for tests.
    pub api_base: String,
}

impl SlackConfig {
    pub fn new(bot_token: impl Into<String>, app_token: impl Into<String>) -> Self {
        Self {
            bot_token: bot_token.into(),
            app_token: app_token.into(),
            api_base: SLACK_API.into(),
        }
    }

    fn url(&self, method: &str) -> String {
        format!("{}/{}", self.api_base.trim_end_matches('/'), method)
    }
}

impl std::fmt::Debug for SlackConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlackConfig")
            .field("bot_token", &"[REDACTED]")
            .field("app_token", &"[REDACTED]")
            .field("api_base", &self.api_base)
            .finish()
    }
}

// --- Web API / Socket Mode wire types ---

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    user_id: Option<String>,
}

impl ApiResponse {
    fn into_result(self, method: &str) -> Result<Self, ChannelError> {
        if self.ok {
            return Ok(self);
        }
        let error = self.error.unwrap_or_else(|| "unknown_error".into());
        if AUTH_ERRORS.contains(&error.as_str()) {
            Err(ChannelError::AuthFailed {
                channel: "slack".into(),
                reason: format!("{method}: {error}"),
            })
        } else {
            Err(ChannelError::DeliveryFailed {
                channel: "slack".into(),
                reason: format!("{method}: {error}"),
            })
        }
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    envelope_id: Option<String>,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct SlackEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    channel_type: Option<String>,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    subtype: Option<String>,
    #[serde(default)]
    bot_id: Option<String>,
}

fn ack_payload(envelope_id: &str) -> String {
    json!({ "envelope_id": envelope_id }).to_string()
}

/// Text of an `app_mention`: everything after the first `>`, which closes
/// the leading `<@U123>` mention.
fn mention_text(text: &str) -> &str {
    match text.find('>') {
        Some(idx) => text[idx + 1..].trim(),
        None => text.trim(),
    }
}

/// Turn an `events_api` payload into an inbound message, or `None` when the
/// event is not addressed to the bot.
fn parse_event(payload: &Value) -> Option<InboundMessage> {
    let event: SlackEvent = serde_json::from_value(payload.get("event")?.clone()).ok()?;
    if event.bot_id.is_some() {
        return None;
    }

    let raw = event.text.as_deref()?;
    let text = match event.kind.as_str() {
        "app_mention" => mention_text(raw),
        "message" if event.subtype.is_none() && event.channel_type.as_deref() == Some("im") => raw.trim(),
        _ => return None,
    };
    if text.is_empty() {
        return None;
    }

    Some(InboundMessage {
        channel: "slack".into(),
        user_id: event.user?,
        chat_id: event.channel?,
        text: text.to_string(),
        sender_name: None,
    })
}

async fn call_api(
    client: &reqwest::Client,
    config: &SlackConfig,
    method: &str,
    token: &str,
    body: Option<&Value>,
) -> Result<ApiResponse, ChannelError> {
    let mut request = client.post(config.url(method)).bearer_auth(token);
    if let Some(body) = body {
        request = request.json(body);
    }
    let response = request.send().await.map_err(|e| http_error("slack", e))?;
    let parsed: ApiResponse = response
        .json()
        .await
        .map_err(|e| ChannelError::InvalidPayload(format!("slack {method}: {}", e.without_url())))?;
    parsed.into_result(method)
}

async fn open_socket_url(client: &reqwest::Client, config: &SlackConfig) -> Result<String, ChannelError> {
    let response = call_api(client, config, "apps.connections.open", &config.app_token, None).await?;
    response
        .url
        .ok_or_else(|| ChannelError::InvalidPayload("slack: apps.connections.open returned no url".into()))
}

/// Whether the socket session ended because of shutdown.
type Stopped = bool;

async fn listen(
    ws_url: &str,
    tx: &mpsc::Sender<Result<InboundMessage, ChannelError>>,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<Stopped, ChannelError> {
    let (ws, _) = connect_async(ws_url)
        .await
        .map_err(|e| ChannelError::ConnectionLost(format!("slack: {e}")))?;
    let (mut writer, mut reader) = ws.split();
    debug!("Slack socket connected");

    loop {
        let frame = tokio::select! {
            _ = shutdown.changed() => {
                let _ = writer.close().await;
                return Ok(true);
            }
            frame = reader.next() => frame,
        };

        match frame {
            Some(Ok(WsMessage::Text(raw))) => {
                let envelope: Envelope = match serde_json::from_str(raw.as_str()) {
                    Ok(envelope) => envelope,
                    Err(e) => {
                        debug!(error = %e, "Unparseable Slack envelope");
                        continue;
                    }
                };

                if let Some(id) = envelope.envelope_id.as_deref()
                    && let Err(e) = writer.send(WsMessage::Text(ack_payload(id).into())).await
                {
                    warn!(error = %e, "Slack ack failed");
                    return Ok(false);
                }

                match envelope.kind.as_str() {
                    "hello" => info!("Slack Socket Mode ready"),
                    "disconnect" => {
                        info!("Slack asked to refresh the socket");
                        return Ok(false);
                    }
                    "events_api" => {
                        if let Some(payload) = envelope.payload.as_ref()
                            && let Some(inbound) = parse_event(payload)
                            && tx.send(Ok(inbound)).await.is_err()
                        {
                            return Ok(true);
                        }
                    }
                    other => debug!(kind = other, "Ignoring Slack envelope"),
                }
            }
            Some(Ok(WsMessage::Ping(data))) => {
                if writer.send(WsMessage::Pong(data)).await.is_err() {
                    return Ok(false);
                }
            }
            Some(Ok(WsMessage::Close(frame))) => {
                info!(frame = ?frame, "Slack closed the socket");
                return Ok(false);
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => return Err(ChannelError::ConnectionLost(format!("slack: {e}"))),
            None => return Ok(false),
        }
    }
}

async fn socket_loop(
    client: reqwest::Client,
    config: SlackConfig,
    first_url: String,
    tx: mpsc::Sender<Result<InboundMessage, ChannelError>>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut next_url = Some(first_url);

    loop {
        if tx.is_closed() {
            return;
        }

        let ws_url = match next_url.take() {
            Some(url) => Ok(url),
            None => open_socket_url(&client, &config).await,
        };

        match ws_url {
            Ok(url) => match listen(&url, &tx, &mut shutdown).await {
                Ok(true) => {
                    info!("Slack gateway stopped");
                    return;
                }
                Ok(false) => {}
                Err(e) => warn!(error = %e, "Slack socket session failed"),
            },
            Err(e) if e.is_auth() => {
                let _ = tx.send(Err(e)).await;
                return;
            }
            Err(e) => warn!(error = %e, "Could not open a Slack socket"),
        }

        tokio::select! {
            _ = shutdown.changed() => return,
            _ = tokio::time::sleep(RECONNECT_DELAY) => {}
        }
    }
}

/// Slack channel adapter.
pub struct SlackChannel {
    config: SlackConfig,
    client: reqwest::Client,
    shutdown: Mutex<Option<watch::Sender<bool>>>,
}

impl SlackChannel {
    pub fn new(config: SlackConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
            shutdown: Mutex::new(None),
        }
    }
}

#[async_trait]
impl Channel for SlackChannel {
    fn name(&self) -> &str {
        "slack"
    }

    async fn start(&self) -> Result<InboundStream, ChannelError> {
        if self.config.bot_token.trim().is_empty() {
            return Err(ChannelError::NotConfigured("slack: bot token is empty".into()));
        }
        if self.config.app_token.trim().is_empty() {
            return Err(ChannelError::NotConfigured("slack: app token is empty".into()));
        }

        let me = call_api(&self.client, &self.config, "auth.test", &self.config.bot_token, None).await?;
        let first_url = open_socket_url(&self.client, &self.config).await?;
        info!(bot_user = ?me.user_id, "Slack bot authenticated, Socket Mode connecting");

        let (tx, rx) = mpsc::channel(64);
        let (stop_tx, stop_rx) = watch::channel(false);
        *self.shutdown.lock().await = Some(stop_tx);

        tokio::spawn(socket_loop(
            self.client.clone(),
            self.config.clone(),
            first_url,
            tx,
            stop_rx,
        ));
        Ok(rx)
    }

    async fn send(&self, chat_id: &str, text: &str) -> Result<(), ChannelError> {
        let body = json!({ "channel": chat_id, "text": text });
        call_api(
            &self.client,
            &self.config,
            "chat.postMessage",
            &self.config.bot_token,
            Some(&body),
        )
        .await
        .map(|_| ())
    }

    async fn stop(&self) -> Result<(), ChannelError> {
        stop_signal(&self.shutdown).await;
        Ok(())
    }
}
