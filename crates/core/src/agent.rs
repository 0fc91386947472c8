//! The opaque agent handle.
//!
//! Every entry point (REPL, one-shot, chat gateways, heartbeat) dispatches
//! text into an [`Agent`] under a thread id and gets text back. How the agent
//! plans, calls tools, or persists history is not visible through this seam.

use async_trait::async_trait;
use crate::error::AgentInvocationError;

#[async_trait]
pub trait Agent: Send + Sync {
    /// Run one turn of the conversation identified by `thread_id`.
    async fn invoke(&self, thread_id: &str, input: &str) -> std::result::Result<String, AgentInvocationError>;
}
