//! Built-in tool implementations for HomeClaw.
//!
//! Tools give the agent the ability to act: search the web, run shell
//! commands and edit files inside its workspace, record facts in its memory
//! file, manage its own heartbeat tasks, and message the user on another
//! chat platform.

pub mod file_read;
pub mod file_write;
pub mod heartbeat;
pub mod memory;
pub mod message;
pub mod shell;
pub mod web_search;

use homeclaw_config::{Credentials, ToolsConfig};
use homeclaw_core::channel::MessageRouter;
use homeclaw_core::error::ToolError;
use homeclaw_core::tool::ToolRegistry;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Everything the built-in tools need from the running application.
#[derive(Clone)]
pub struct ToolContext {
    /// Workspace root; file and shell tools are scoped to it
    pub workspace: PathBuf,
    pub tools: ToolsConfig,
    pub credentials: Credentials,
    /// Outbound delivery; `None` when no gateway is running in this process
    pub router: Option<Arc<dyn MessageRouter>>,
    /// Whether any chat channel is enabled in the configuration
    pub channels_enabled: bool,
}

/// Create the tool registry for one agent.
pub fn build_registry(ctx: ToolContext) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    let ws = ctx.workspace.clone();

    if ctx.tools.web_search.enabled {
        match web_search::WebSearchTool::from_config(&ctx.tools.web_search, &ctx.credentials) {
            Ok(tool) => registry.register(Box::new(tool)),
            Err(e) => warn!(error = %e, "web_search disabled"),
        }
    }

    if ctx.tools.shell_exec.enabled {
        registry.register(Box::new(shell::ShellExecTool::new(
            ws.clone(),
            ctx.tools.shell_exec.timeout_secs,
        )));
    }

    registry.register(Box::new(file_read::ReadFileTool::new(ws.clone())));
    registry.register(Box::new(file_write::WriteFileTool::new(ws.clone())));
    registry.register(Box::new(memory::RememberTool::new(ws.clone())));
    registry.register(Box::new(heartbeat::AddHeartbeatTaskTool::new(ws.clone())));
    registry.register(Box::new(heartbeat::ListHeartbeatTasksTool::new(ws.clone())));
    registry.register(Box::new(heartbeat::RemoveHeartbeatTaskTool::new(ws)));

    if let (true, Some(router)) = (ctx.channels_enabled, ctx.router) {
        registry.register(Box::new(message::SendMessageTool::new(router)));
    }

    debug!(tools = ?registry.names(), "Tool registry built");
    registry
}

/// Resolve a workspace-relative path, refusing anything that could land
/// outside the workspace.
pub(crate) fn resolve_in_workspace(root: &Path, relative: &str, tool: &str) -> Result<PathBuf, ToolError> {
    if relative.trim().is_empty() {
        return Err(ToolError::InvalidArguments("Empty 'path' argument".into()));
    }
    let deny = |reason: String| ToolError::PermissionDenied {
        tool_name: tool.into(),
        reason,
    };

    let rel = Path::new(relative);
    for component in rel.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            Component::ParentDir => {
                return Err(deny(format!("'{relative}' escapes the workspace")));
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(deny(format!("'{relative}' must be relative to the workspace")));
            }
        }
    }

    let joined = root.join(rel);

    // A symlink inside the workspace may still point outside it.
    if let Ok(canonical_root) = root.canonicalize()
        && let Some(existing) = joined.ancestors().find(|p| p.exists())
        && let Ok(canonical) = existing.canonicalize()
        && !canonical.starts_with(&canonical_root)
    {
        return Err(deny(format!("'{relative}' resolves outside the workspace")));
    }

    Ok(joined)
}

/// Pull a required string argument.
pub(crate) fn required_str<'a>(arguments: &'a serde_json::Value, key: &str) -> Result<&'a str, ToolError> {
    arguments[key]
        .as_str()
        .ok_or_else(|| ToolError::InvalidArguments(format!("Missing '{key}' argument")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use homeclaw_core::error::ChannelError;

    struct NullRouter;

    #[async_trait::async_trait]
    impl MessageRouter for NullRouter {
        fn channels(&self) -> Vec<String> {
            vec![]
        }
        async fn deliver(&self, _: &str, _: &str, _: &str) -> Result<(), ChannelError> {
            Ok(())
        }
    }

    fn context(dir: &Path) -> ToolContext {
        ToolContext {
            workspace: dir.to_path_buf(),
            tools: ToolsConfig::default(),
            credentials: Credentials::default(),
            router: None,
            channels_enabled: false,
        }
    }

    #[test]
    fn registry_has_builtin_tools() {
        let dir = tempfile::tempdir().unwrap();
        let registry = build_registry(context(dir.path()));
        for name in [
            "web_search",
            "shell_exec",
            "read_file",
            "write_file",
            "remember",
            "add_heartbeat_task",
            "list_heartbeat_tasks",
            "remove_heartbeat_task",
        ] {
            assert!(registry.get(name).is_some(), "missing {name}");
        }
        assert!(registry.get("send_message").is_none());
    }

    #[test]
    fn send_message_needs_enabled_channel_and_router() {
        let dir = tempfile::tempdir().unwrap();

        let mut ctx = context(dir.path());
        ctx.router = Some(Arc::new(NullRouter));
        assert!(build_registry(ctx.clone()).get("send_message").is_none());

        ctx.channels_enabled = true;
        assert!(build_registry(ctx).get("send_message").is_some());
    }

    #[test]
    fn disabled_tools_are_left_out() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = context(dir.path());
        ctx.tools.web_search.enabled = false;
        ctx.tools.shell_exec.enabled = false;
        let registry = build_registry(ctx);
        assert!(registry.get("web_search").is_none());
        assert!(registry.get("shell_exec").is_none());
    }

    #[test]
    fn workspace_scoping() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        assert_eq!(
            resolve_in_workspace(root, "data/notes.txt", "t").unwrap(),
            root.join("data/notes.txt")
        );
        assert!(resolve_in_workspace(root, "../outside.txt", "t").is_err());
        assert!(resolve_in_workspace(root, "data/../../x", "t").is_err());
        assert!(resolve_in_workspace(root, "/etc/passwd", "t").is_err());
        assert!(matches!(
            resolve_in_workspace(root, "  ", "t"),
            Err(ToolError::InvalidArguments(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn symlink_escape_is_refused() {
        let outside = tempfile::tempdir().unwrap();
        let dir = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("link")).unwrap();
        assert!(resolve_in_workspace(dir.path(), "link/secret.txt", "t").is_err());
    }
}
