//! End-to-end tests for the HomeClaw pipeline.
//!
//! These wire the real pieces together (workspace, SQLite sessions, agent
//! loop with built-in tools, gateway relay, heartbeat scheduler, channel
//! registry) around a scripted provider and an in-process chat channel, so
//! nothing touches the network.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use homeclaw_agent::{AgentFactory, AgentLoop, reply_or_apology};
use homeclaw_channels::{ChannelRegistry, Gateway};
use homeclaw_config::{AppConfig, Credentials};
use homeclaw_core::agent::Agent;
use homeclaw_core::channel::{Channel, InboundMessage, InboundStream, MessageRouter};
use homeclaw_core::error::{ChannelError, ProviderError};
use homeclaw_core::message::{Message, MessageToolCall, Role};
use homeclaw_core::provider::{Provider, ProviderRequest, ProviderResponse};
use homeclaw_sessions::SessionManager;
use homeclaw_workflow::HeartbeatScheduler;
use homeclaw_workspace::WorkspaceContext;
use tokio::sync::{mpsc, watch};

// ── Scripted provider ────────────────────────────────────────────────────

struct ScriptedProvider {
    script: Mutex<VecDeque<Result<ProviderResponse, ProviderError>>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    fn new(script: Vec<Result<ProviderResponse, ProviderError>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// The user-role texts of the n-th request.
    fn user_texts(&self, n: usize) -> Vec<String> {
        self.requests()[n]
            .messages
            .iter()
            .filter(|m| m.role == Role::User)
            .map(|m| m.content.clone())
            .collect()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        self.requests.lock().unwrap().push(request);
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| panic!("ScriptedProvider: script exhausted"))
    }
}

fn text(reply: &str) -> Result<ProviderResponse, ProviderError> {
    Ok(ProviderResponse {
        message: Message::assistant(reply),
        usage: None,
        model: "mock-model".into(),
    })
}

fn tool_call(name: &str, args: serde_json::Value) -> Result<ProviderResponse, ProviderError> {
    let mut message = Message::assistant("");
    message.tool_calls.push(MessageToolCall {
        id: format!("call_{name}"),
        name: name.into(),
        arguments: args.to_string(),
    });
    Ok(ProviderResponse {
        message,
        usage: None,
        model: "mock-model".into(),
    })
}

// ── In-process chat channel ──────────────────────────────────────────────

struct MockChannel {
    name: String,
    inbound: Mutex<Option<Vec<InboundMessage>>>,
    sent: Mutex<Vec<(String, String)>>,
    dms: Mutex<Vec<(String, String)>>,
}

impl MockChannel {
    fn new(name: &str, inbound: Vec<InboundMessage>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            inbound: Mutex::new(Some(inbound)),
            sent: Mutex::new(Vec::new()),
            dms: Mutex::new(Vec::new()),
        })
    }

    fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }

    fn dms(&self) -> Vec<(String, String)> {
        self.dms.lock().unwrap().clone()
    }
}

#[async_trait]
impl Channel for MockChannel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn start(&self) -> Result<InboundStream, ChannelError> {
        let messages = self.inbound.lock().unwrap().take().unwrap_or_default();
        let (tx, rx) = mpsc::channel(messages.len().max(1));
        for message in messages {
            tx.send(Ok(message)).await.unwrap();
        }
        // Dropping the sender ends the stream after the queued messages
        Ok(rx)
    }

    async fn send(&self, chat_id: &str, text: &str) -> Result<(), ChannelError> {
        self.sent.lock().unwrap().push((chat_id.into(), text.into()));
        Ok(())
    }

    async fn send_to_user(&self, user_id: &str, text: &str) -> Result<(), ChannelError> {
        self.dms.lock().unwrap().push((user_id.into(), text.into()));
        Ok(())
    }

    fn max_message_len(&self) -> usize {
        40
    }
}

fn inbound(channel: &str, user_id: &str, text: &str) -> InboundMessage {
    InboundMessage {
        channel: channel.into(),
        user_id: user_id.into(),
        chat_id: format!("chat-{user_id}"),
        text: text.into(),
        sender_name: None,
    }
}

// ── Fixtures ─────────────────────────────────────────────────────────────

fn workspace() -> (tempfile::TempDir, WorkspaceContext) {
    let dir = tempfile::tempdir().unwrap();
    homeclaw_workspace::ensure(dir.path()).unwrap();
    let ctx = homeclaw_workspace::read_all(dir.path()).unwrap();
    (dir, ctx)
}

fn agent(
    config: &AppConfig,
    provider: Arc<ScriptedProvider>,
    ws: &WorkspaceContext,
    sessions: &SessionManager,
    router: Option<Arc<dyn MessageRouter>>,
) -> Arc<AgentLoop> {
    let creds = Credentials::default();
    Arc::new(AgentFactory::new(config, &creds).assemble(
        provider,
        "mock-model",
        ws,
        sessions.get_checkpointer(),
        router,
    ))
}

// ── Agent + workspace + sessions ─────────────────────────────────────────

#[tokio::test]
async fn remembered_fact_lands_in_memory_and_history_survives_reopen() {
    let (dir, ws) = workspace();
    let config = AppConfig::default();

    {
        let sessions = SessionManager::open(dir.path()).await.unwrap();
        let provider = ScriptedProvider::new(vec![
            tool_call("remember", serde_json::json!({"fact": "User's cat is called Miso"})),
            text("Got it, I'll remember Miso."),
        ]);
        let agent = agent(&config, provider.clone(), &ws, &sessions, None);

        let reply = agent.invoke("homeclaw-interactive", "My cat is called Miso").await.unwrap();
        assert_eq!(reply, "Got it, I'll remember Miso.");

        // The tool result went back to the model before it answered
        let second = &provider.requests()[1];
        assert!(second.messages.iter().any(|m| m.role == Role::Tool));
    }

    let memory = std::fs::read_to_string(dir.path().join("MEMORY.md")).unwrap();
    assert!(memory.contains("- User's cat is called Miso"));

    // A fresh process on the same workspace sees the earlier turn
    let sessions = SessionManager::open(dir.path()).await.unwrap();
    let provider = ScriptedProvider::new(vec![text("Your cat is Miso.")]);
    let ws = homeclaw_workspace::read_all(dir.path()).unwrap();
    let agent = agent(&config, provider.clone(), &ws, &sessions, None);

    agent.invoke("homeclaw-interactive", "What's my cat called?").await.unwrap();

    let request = &provider.requests()[0];
    assert!(request.messages[0].content.contains("User's cat is called Miso"));
    assert_eq!(
        provider.user_texts(0),
        vec!["My cat is called Miso".to_string(), "What's my cat called?".to_string()]
    );
}

#[tokio::test]
async fn provider_failure_becomes_an_apology() {
    let (_dir, ws) = workspace();
    let sessions = SessionManager::in_memory().await.unwrap();
    let provider = ScriptedProvider::new(vec![Err(ProviderError::RateLimited { retry_after_secs: 30 })]);
    let agent = agent(&AppConfig::default(), provider, &ws, &sessions, None);

    let reply = reply_or_apology(agent.invoke("t1", "hello").await);
    assert_eq!(
        reply,
        "Sorry, something went wrong while processing your message. Please try again."
    );
    assert_eq!(sessions.get_checkpointer().message_count("t1").await.unwrap(), 0);
}

// ── Gateway relay ────────────────────────────────────────────────────────

#[tokio::test]
async fn gateway_relays_allowed_users_and_rejects_others() {
    let (_dir, ws) = workspace();
    let sessions = Arc::new(SessionManager::in_memory().await.unwrap());
    let provider = ScriptedProvider::new(vec![
        text("First answer"),
        text("Second line one\nSecond line two is a bit longer than forty chars"),
    ]);
    let agent = agent(&AppConfig::default(), provider.clone(), &ws, &sessions, None);

    let channel = MockChannel::new(
        "mockchat",
        vec![
            inbound("mockchat", "alice", "hi"),
            inbound("mockchat", "mallory", "let me in"),
            inbound("mockchat", "alice", "and again"),
        ],
    );
    let gateway = Gateway::new(channel.clone(), agent, sessions.clone(), vec!["alice".into()]);
    let (_stop_tx, stop_rx) = watch::channel(false);
    gateway.run(stop_rx).await.unwrap();

    let sent = channel.sent();
    assert_eq!(sent[0], ("chat-alice".to_string(), "First answer".to_string()));
    assert_eq!(sent[1], ("chat-mallory".to_string(), "Unauthorized.".to_string()));
    // The long reply was split to the channel's limit
    assert!(sent.len() >= 4);
    assert!(sent[2..].iter().all(|(chat, chunk)| chat == "chat-alice" && chunk.chars().count() <= 40));

    // Both of alice's turns share one thread, and mallory never reached the model
    assert_eq!(provider.requests().len(), 2);
    assert_eq!(provider.user_texts(1), vec!["hi".to_string(), "and again".to_string()]);
    let thread = sessions.resolve_thread("mockchat", "alice").await.unwrap();
    assert_eq!(thread, "homeclaw-mockchat-alice");
    assert_eq!(sessions.get_checkpointer().message_count(&thread).await.unwrap(), 4);
}

#[tokio::test]
async fn send_message_tool_delivers_through_the_registry() {
    let (_dir, ws) = workspace();
    let sessions = SessionManager::in_memory().await.unwrap();
    let mut config = AppConfig::default();
    config.channels.telegram.enabled = true;

    let telegram = MockChannel::new("telegram", Vec::new());
    let mut registry = ChannelRegistry::new();
    registry.register(telegram.clone());
    let router: Arc<dyn MessageRouter> = Arc::new(registry);

    let provider = ScriptedProvider::new(vec![
        tool_call(
            "send_message",
            serde_json::json!({"channel": "Telegram", "user_id": "42", "message": "Rain expected at 5pm"}),
        ),
        text("Sent."),
    ]);
    let agent = agent(&config, provider, &ws, &sessions, Some(router));
    assert!(agent.tool_names().contains(&"send_message"));

    assert_eq!(agent.invoke("t1", "Warn me on Telegram").await.unwrap(), "Sent.");
    assert_eq!(
        telegram.dms(),
        vec![("42".to_string(), "Rain expected at 5pm".to_string())]
    );
}

// ── Heartbeat ────────────────────────────────────────────────────────────

#[tokio::test]
async fn task_added_by_the_agent_is_fired_by_the_scheduler() {
    let (dir, ws) = workspace();
    let sessions = SessionManager::in_memory().await.unwrap();
    let provider = ScriptedProvider::new(vec![
        tool_call(
            "add_heartbeat_task",
            serde_json::json!({"task": "[every 30m] Check the weather"}),
        ),
        text("I'll check the weather every 30 minutes."),
        text("Sunny, 21°C."),
    ]);
    let agent = agent(&AppConfig::default(), provider.clone(), &ws, &sessions, None);

    agent.invoke("t1", "Check the weather every half hour").await.unwrap();

    let tasks = homeclaw_workspace::list_tasks(dir.path()).unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].instruction, "Check the weather");

    let scheduler = HeartbeatScheduler::new(agent, 60);
    assert!(scheduler.reload_from_workspace(dir.path()).await.is_empty());
    for handle in scheduler.tick(chrono::Local::now()).await {
        handle.await.unwrap();
    }

    let fired = provider.requests().pop().unwrap();
    let prompt = &fired.messages.last().unwrap().content;
    assert_eq!(prompt, "[HEARTBEAT] Please perform this periodic task: Check the weather");
    // Heartbeat runs start from an empty thread
    assert_eq!(provider.user_texts(2).len(), 1);

    // Within the interval nothing fires again
    assert!(scheduler.tick(chrono::Local::now()).await.is_empty());
}
