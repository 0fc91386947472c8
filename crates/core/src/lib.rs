//! # HomeClaw Core
//!
//! Domain types, traits, and error definitions shared by every HomeClaw crate.
//! Nothing in here talks to the network or the filesystem; implementations
//! live in their own crates and depend inward on this one.
//!
//! ## Seams
//!
//! - [`Provider`]: an LLM backend
//! - [`Tool`]: something the agent can do
//! - [`Channel`]: a chat platform the assistant is reachable on
//! - [`MessageRouter`]: outbound delivery to a named channel
//! - [`Agent`]: the opaque handle every entry point dispatches into

pub mod agent;
pub mod channel;
pub mod error;
pub mod message;
pub mod provider;
pub mod tool;

pub use agent::Agent;
pub use channel::{Channel, InboundMessage, MessageRouter};
pub use error::{Error, Result};
pub use message::{Message, MessageToolCall, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse, ToolDefinition, Usage};
pub use tool::{Tool, ToolCall, ToolRegistry, ToolResult};
