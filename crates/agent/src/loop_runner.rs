//! The agent reasoning loop implementation.

use async_trait::async_trait;
use homeclaw_core::agent::Agent;
use homeclaw_core::error::AgentInvocationError;
use homeclaw_core::message::{Message, Role};
use homeclaw_core::provider::{Provider, ProviderRequest};
use homeclaw_core::tool::{ToolCall, ToolRegistry};
use homeclaw_sessions::Checkpointer;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Prior messages replayed to the model on each turn.
pub const HISTORY_LIMIT: usize = 50;

/// The core agent loop that orchestrates LLM calls and tool execution.
///
/// Conversation state lives in the checkpointer, keyed by thread id, so
/// one loop serves every thread (terminal, each chat user, heartbeats).
pub struct AgentLoop {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    tools: Arc<ToolRegistry>,
    system_prompt: String,
    checkpointer: Arc<dyn Checkpointer>,
    /// Maximum model round-trips per turn
    max_iterations: u32,
}

impl AgentLoop {
    pub fn new(
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        tools: Arc<ToolRegistry>,
        system_prompt: impl Into<String>,
        checkpointer: Arc<dyn Checkpointer>,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature: 0.7,
            max_tokens: None,
            tools,
            system_prompt: system_prompt.into(),
            checkpointer,
            max_iterations: 10,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set the maximum number of model round-trips per turn.
    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max.max(1);
        self
    }

    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.names()
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// Run one tool call, turning every failure into text the model can read.
    async fn run_tool(&self, id: &str, name: &str, raw_arguments: &str) -> Message {
        let arguments = if raw_arguments.trim().is_empty() {
            serde_json::json!({})
        } else {
            match serde_json::from_str(raw_arguments) {
                Ok(value) => value,
                Err(e) => {
                    warn!(tool = %name, error = %e, "Tool arguments are not valid JSON");
                    return Message::tool_result(id, format!("Error: invalid arguments JSON: {e}"));
                }
            }
        };

        let call = ToolCall {
            id: id.to_string(),
            name: name.to_string(),
            arguments,
        };

        let start = std::time::Instant::now();
        match self.tools.execute(&call).await {
            Ok(result) => {
                debug!(
                    tool = %name,
                    success = result.success,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Tool executed"
                );
                let content = if result.success {
                    result.output
                } else {
                    format!("Error: {}", result.output)
                };
                Message::tool_result(id, content)
            }
            Err(e) => {
                warn!(tool = %name, error = %e, "Tool execution failed");
                Message::tool_result(id, format!("Error: {e}"))
            }
        }
    }
}

/// Drop leading messages until the first user turn, so a history window
/// never opens in the middle of a tool exchange.
fn align_history(mut history: Vec<Message>) -> Vec<Message> {
    let start = history
        .iter()
        .position(|m| m.role == Role::User)
        .unwrap_or(history.len());
    history.drain(..start);
    history
}

#[async_trait]
impl Agent for AgentLoop {
    async fn invoke(&self, thread_id: &str, input: &str) -> Result<String, AgentInvocationError> {
        let history = align_history(self.checkpointer.load(thread_id, HISTORY_LIMIT).await?);
        info!(thread_id = %thread_id, history = history.len(), "Processing message");

        let mut messages = Vec::with_capacity(history.len() + 4);
        messages.push(Message::system(&self.system_prompt));
        messages.extend(history);

        let user = Message::user(input);
        let mut turn = vec![user.clone()];
        messages.push(user);

        let tool_definitions = self.tools.definitions();

        for iteration in 1..=self.max_iterations {
            debug!(thread_id = %thread_id, iteration, "Agent loop iteration");

            let request = ProviderRequest {
                model: self.model.clone(),
                messages: messages.clone(),
                temperature: self.temperature,
                max_tokens: self.max_tokens,
                tools: tool_definitions.clone(),
            };

            let response = self.provider.complete(request).await?;
            if let Some(usage) = &response.usage {
                debug!(
                    model = %response.model,
                    tokens = usage.total_tokens,
                    "Model responded"
                );
            }

            let reply = response.message;
            if reply.tool_calls.is_empty() {
                let text = reply.content.clone();
                turn.push(reply);
                self.checkpointer.append(thread_id, &turn).await?;
                return Ok(text);
            }

            debug!(tool_count = reply.tool_calls.len(), "Executing tool calls");
            let tool_calls = reply.tool_calls.clone();
            messages.push(reply.clone());
            turn.push(reply);

            for tc in &tool_calls {
                let result = self.run_tool(&tc.id, &tc.name, &tc.arguments).await;
                messages.push(result.clone());
                turn.push(result);
            }
        }

        warn!(
            thread_id = %thread_id,
            iterations = self.max_iterations,
            "Max tool iterations reached without a final answer"
        );
        Err(AgentInvocationError::IterationLimit(self.max_iterations))
    }
}

/// Turn an agent result into text that is always safe to show a user.
pub fn reply_or_apology(result: Result<String, AgentInvocationError>) -> String {
    match result {
        Ok(text) if text.trim().is_empty() => "I couldn't generate a response.".into(),
        Ok(text) => text,
        Err(e) => {
            warn!(error = %e, "Agent invocation failed");
            "Sorry, something went wrong while processing your message. Please try again.".into()
        }
    }
}
