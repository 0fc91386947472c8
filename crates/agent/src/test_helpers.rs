//! Shared test helpers for agent tests.

use homeclaw_core::error::ProviderError;
use homeclaw_core::message::{Message, MessageToolCall};
use homeclaw_core::provider::{Provider, ProviderRequest, ProviderResponse};
use std::collections::VecDeque;
use std::sync::Mutex;

/// A provider that replays a fixed script of responses and records every
/// request it receives.
pub struct ScriptedProvider {
    script: Mutex<VecDeque<Result<ProviderResponse, ProviderError>>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    pub fn new(script: Vec<Result<ProviderResponse, ProviderError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
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

pub fn text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        usage: None,
        model: "mock-model".into(),
    }
}

pub fn tool_call_response(id: &str, name: &str, arguments: &str) -> ProviderResponse {
    let mut message = Message::assistant("");
    message.tool_calls.push(MessageToolCall {
        id: id.into(),
        name: name.into(),
        arguments: arguments.into(),
    });
    ProviderResponse {
        message,
        usage: None,
        model: "mock-model".into(),
    }
}
