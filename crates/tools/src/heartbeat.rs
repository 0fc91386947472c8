//! Tools that let the agent manage its own `HEARTBEAT.md` task list.

use async_trait::async_trait;
use homeclaw_core::error::{ToolError, WorkspaceError};
use homeclaw_core::tool::{Tool, ToolResult};
use std::path::PathBuf;

fn workspace_failure(e: WorkspaceError) -> ToolResult {
    match e {
        WorkspaceError::Missing(_) => {
            ToolResult::failed("HEARTBEAT.md not found. Run 'homeclaw onboard' first.")
        }
        other => ToolResult::failed(other.to_string()),
    }
}

fn task_schema(description: &str) -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "task": {
                "type": "string",
                "description": description
            }
        },
        "required": ["task"]
    })
}

pub struct AddHeartbeatTaskTool {
    workspace: PathBuf,
}

impl AddHeartbeatTaskTool {
    pub fn new(workspace: PathBuf) -> Self {
        Self { workspace }
    }
}

#[async_trait]
impl Tool for AddHeartbeatTaskTool {
    fn name(&self) -> &str {
        "add_heartbeat_task"
    }

    fn description(&self) -> &str {
        "Add a periodic background task. Optionally prefix it with a schedule: '[every 30m] ...', '[every 2h] ...' or '[cron 0 18 * * *] ...'."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        task_schema("What to do periodically, with an optional schedule prefix")
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let task = crate::required_str(&arguments, "task")?;
        match homeclaw_workspace::add_task(&self.workspace, task) {
            Ok(entry) => Ok(ToolResult::ok(format!(
                "Added heartbeat task: {}",
                entry.to_line()
            ))),
            Err(e) => Ok(workspace_failure(e)),
        }
    }
}

pub struct ListHeartbeatTasksTool {
    workspace: PathBuf,
}

impl ListHeartbeatTasksTool {
    pub fn new(workspace: PathBuf) -> Self {
        Self { workspace }
    }
}

#[async_trait]
impl Tool for ListHeartbeatTasksTool {
    fn name(&self) -> &str {
        "list_heartbeat_tasks"
    }

    fn description(&self) -> &str {
        "List all periodic background tasks."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        match homeclaw_workspace::list_tasks(&self.workspace) {
            Ok(tasks) if tasks.is_empty() => Ok(ToolResult::ok("No heartbeat tasks configured.")),
            Ok(tasks) => {
                let lines: Vec<String> = tasks.iter().map(|t| format!("- {}", t.to_line())).collect();
                Ok(ToolResult::ok(format!("Heartbeat tasks:\n{}", lines.join("\n"))))
            }
            Err(e) => Ok(workspace_failure(e)),
        }
    }
}

pub struct RemoveHeartbeatTaskTool {
    workspace: PathBuf,
}

impl RemoveHeartbeatTaskTool {
    pub fn new(workspace: PathBuf) -> Self {
        Self { workspace }
    }
}

#[async_trait]
impl Tool for RemoveHeartbeatTaskTool {
    fn name(&self) -> &str {
        "remove_heartbeat_task"
    }

    fn description(&self) -> &str {
        "Remove a periodic background task by its text."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        task_schema("The task text to remove, as listed")
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let task = crate::required_str(&arguments, "task")?;
        match homeclaw_workspace::remove_task(&self.workspace, task) {
            Ok(true) => Ok(ToolResult::ok(format!("Removed heartbeat task: {}", task.trim()))),
            Ok(false) => Ok(ToolResult::failed(format!("Task not found: {}", task.trim()))),
            Err(e) => Ok(workspace_failure(e)),
        }
    }
}
