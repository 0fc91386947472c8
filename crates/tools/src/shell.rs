//! Shell tool: run a command inside the workspace.
//!
//! Commands run through `sh -c` with the workspace as working directory and
//! are killed when the timeout expires.

use async_trait::async_trait;
use homeclaw_core::error::ToolError;
use homeclaw_core::tool::{Tool, ToolResult};
use std::path::PathBuf;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

pub struct ShellExecTool {
    workspace: PathBuf,
    timeout_secs: u64,
}

impl ShellExecTool {
    pub fn new(workspace: PathBuf, timeout_secs: u64) -> Self {
        Self {
            workspace,
            timeout_secs,
        }
    }
}

#[async_trait]
impl Tool for ShellExecTool {
    fn name(&self) -> &str {
        "shell_exec"
    }

    fn description(&self) -> &str {
        "Execute a shell command in the workspace directory and return its output."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The shell command to execute"
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let command = crate::required_str(&arguments, "command")?;

        debug!(command = %command, "Executing shell command");

        let child = Command::new("sh")
            .args(["-c", command])
            .current_dir(&self.workspace)
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(Duration::from_secs(self.timeout_secs), child).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(ToolError::ExecutionFailed {
                    tool_name: "shell_exec".into(),
                    reason: e.to_string(),
                });
            }
            Err(_) => {
                warn!(command = %command, timeout_secs = self.timeout_secs, "Command timed out");
                return Err(ToolError::Timeout {
                    tool_name: "shell_exec".into(),
                    timeout_secs: self.timeout_secs,
                });
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if output.status.success() {
            let mut text = stdout.trim_end().to_string();
            if !stderr.trim().is_empty() {
                text.push_str(&format!("\n[stderr]\n{}", stderr.trim_end()));
            }
            return Ok(ToolResult::ok(text));
        }

        let code = output.status.code().unwrap_or(-1);
        warn!(command = %command, exit_code = code, "Command failed");
        Ok(ToolResult::failed(format!(
            "{}\n[stderr]\n{}\n[exit code: {code}]",
            stdout.trim_end(),
            stderr.trim_end()
        )))
    }
}
