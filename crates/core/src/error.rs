//! Error types for the HomeClaw domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; [`Error`] wraps them all.
//! Configuration errors live next to the configuration schema in
//! `homeclaw-config`.

use std::path::PathBuf;
use thiserror::Error;

/// The top-level error type for HomeClaw operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Session store error: {0}")]
    Session(#[from] SessionError),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("Workspace error: {0}")]
    Workspace(#[from] WorkspaceError),

    #[error("Agent error: {0}")]
    Agent(#[from] AgentInvocationError),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

impl ProviderError {
    /// Classify a `reqwest`-style transport failure message.
    pub fn from_transport(timed_out: bool, message: impl Into<String>) -> Self {
        if timed_out {
            ProviderError::Timeout(message.into())
        } else {
            ProviderError::Network(message.into())
        }
    }
}

#[derive(Debug, Error)]
pub enum ChannelError {
    /// Token missing from the credential file and environment.
    #[error("Channel not configured: {0}")]
    NotConfigured(String),

    /// The platform rejected the token.
    #[error("Authentication with {channel} failed: {reason}")]
    AuthFailed { channel: String, reason: String },

    #[error("Message delivery failed to {channel}: {reason}")]
    DeliveryFailed { channel: String, reason: String },

    #[error("Unauthorized sender: {sender_id} on {channel}")]
    Unauthorized { channel: String, sender_id: String },

    #[error("Channel connection lost: {0}")]
    ConnectionLost(String),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
}

impl ChannelError {
    /// Whether this error means the gateway can never start with the
    /// current credentials.
    pub fn is_auth(&self) -> bool {
        matches!(
            self,
            ChannelError::NotConfigured(_) | ChannelError::AuthFailed { .. }
        )
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Tool timed out: {tool_name} after {timeout_secs}s")]
    Timeout { tool_name: String, timeout_secs: u64 },

    #[error("Permission denied: {tool_name}: {reason}")]
    PermissionDenied { tool_name: String, reason: String },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),
}

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("Workspace I/O failed at {path}: {reason}")]
    Io { path: PathBuf, reason: String },

    #[error("Workspace file missing: {0} (run `homeclaw onboard` to recreate it)")]
    Missing(PathBuf),

    #[error("Invalid heartbeat task: {0}")]
    InvalidTask(String),
}

impl WorkspaceError {
    pub fn io(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        WorkspaceError::Io {
            path: path.into(),
            reason: err.to_string(),
        }
    }
}

/// Anything that went wrong while the agent was producing a reply.
///
/// Callers recover from these at the call site (see `reply_or_apology` in
/// `homeclaw-agent`) instead of letting them take the process down.
#[derive(Debug, Error)]
pub enum AgentInvocationError {
    #[error("Provider failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("Session store failed: {0}")]
    Session(#[from] SessionError),

    #[error("Tool loop exceeded {0} iterations without a final answer")]
    IterationLimit(u32),

    #[error("Agent invocation failed: {0}")]
    Other(String),
}
