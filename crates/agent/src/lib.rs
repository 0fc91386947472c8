//! The core agent loop for HomeClaw.
//!
//! The agent follows a **Plan → Act → Observe** cycle:
//!
//! 1. **Receive** a message (terminal, chat gateway, or heartbeat)
//! 2. **Build context** (system prompt from the workspace + thread history)
//! 3. **Send to LLM** via the configured provider
//! 4. **If tool calls**: execute tools, append results, loop back to step 3
//! 5. **If text response**: persist the turn and return the text
//!
//! The loop continues until the LLM responds with text only or the
//! iteration limit is reached.

pub mod factory;
pub mod loop_runner;
pub mod prompt;

#[cfg(test)]
mod test_helpers;

pub use factory::AgentFactory;
pub use loop_runner::{AgentLoop, HISTORY_LIMIT, reply_or_apology};
pub use prompt::build_system_prompt;
