//! File read tool, scoped to the workspace.

use async_trait::async_trait;
use homeclaw_core::error::ToolError;
use homeclaw_core::tool::{Tool, ToolResult};
use std::path::PathBuf;

pub struct ReadFileTool {
    workspace: PathBuf,
}

impl ReadFileTool {
    pub fn new(workspace: PathBuf) -> Self {
        Self { workspace }
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read a file from the workspace. Paths are relative to the workspace root (e.g. MEMORY.md, data/notes.txt)."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Workspace-relative file path"
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let path = crate::required_str(&arguments, "path")?;
        let full = crate::resolve_in_workspace(&self.workspace, path, "read_file")?;

        match tokio::fs::read_to_string(&full).await {
            Ok(content) => Ok(ToolResult::ok(content)),
            Err(e) => Ok(ToolResult::failed(format!("Failed to read {path}: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_definition() {
        let tool = ReadFileTool::new(PathBuf::from("/tmp"));
        assert_eq!(tool.name(), "read_file");
        let schema = tool.parameters_schema();
        assert_eq!(schema["required"], serde_json::json!(["path"]));
    }

    #[tokio::test]
    async fn reads_relative_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("MEMORY.md"), "## Facts\n- likes tea\n").unwrap();

        let tool = ReadFileTool::new(dir.path().to_path_buf());
        let result = tool
            .execute(serde_json::json!({"path": "MEMORY.md"}))
            .await
            .unwrap();
        assert!(result.success);
        assert!(result.output.contains("likes tea"));
    }

    #[tokio::test]
    async fn missing_file_is_failed_result() {
        let dir = tempfile::tempdir().unwrap();
        let tool = ReadFileTool::new(dir.path().to_path_buf());
        let result = tool
            .execute(serde_json::json!({"path": "nope.txt"}))
            .await
            .unwrap();
        assert!(!result.success);
    }

    #[tokio::test]
    async fn traversal_is_denied() {
        let dir = tempfile::tempdir().unwrap();
        let tool = ReadFileTool::new(dir.path().to_path_buf());
        let result = tool
            .execute(serde_json::json!({"path": "../../etc/passwd"}))
            .await;
        assert!(matches!(result, Err(ToolError::PermissionDenied { .. })));
    }
}
