//! File write tool, scoped to the workspace.
//!
//! Overwriting `MEMORY.md` or `USER.md` is how the agent rewrites what it
//! knows; new files usually go under `data/`.

use async_trait::async_trait;
use homeclaw_core::error::ToolError;
use homeclaw_core::tool::{Tool, ToolResult};
use std::path::PathBuf;
use tracing::info;

pub struct WriteFileTool {
    workspace: PathBuf,
}

impl WriteFileTool {
    pub fn new(workspace: PathBuf) -> Self {
        Self { workspace }
    }
}

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write content to a workspace file, replacing it if it exists. Paths are relative to the workspace root; parent directories are created."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Workspace-relative file path"
                },
                "content": {
                    "type": "string",
                    "description": "The full new file content"
                }
            },
            "required": ["path", "content"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let path = crate::required_str(&arguments, "path")?;
        let content = crate::required_str(&arguments, "content")?;
        let full = crate::resolve_in_workspace(&self.workspace, path, "write_file")?;

        if let Some(parent) = full.parent()
            && let Err(e) = tokio::fs::create_dir_all(parent).await
        {
            return Ok(ToolResult::failed(format!("Failed to create directory for {path}: {e}")));
        }

        match tokio::fs::write(&full, content).await {
            Ok(()) => {
                info!(path = %path, bytes = content.len(), "Workspace file written");
                Ok(ToolResult::ok(format!("Wrote {} bytes to {path}", content.len())))
            }
            Err(e) => Ok(ToolResult::failed(format!("Failed to write {path}: {e}"))),
        }
    }
}
