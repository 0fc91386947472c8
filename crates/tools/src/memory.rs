//! `remember`: record a learned fact in `MEMORY.md`.

use async_trait::async_trait;
use homeclaw_core::error::ToolError;
use homeclaw_core::tool::{Tool, ToolResult};
use std::path::PathBuf;

pub struct RememberTool {
    workspace: PathBuf,
}

impl RememberTool {
    pub fn new(workspace: PathBuf) -> Self {
        Self { workspace }
    }
}

#[async_trait]
impl Tool for RememberTool {
    fn name(&self) -> &str {
        "remember"
    }

    fn description(&self) -> &str {
        "Save an important fact about the user or the world to persistent memory so it is available in future conversations."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "fact": {
                    "type": "string",
                    "description": "The fact to remember, as one short sentence"
                }
            },
            "required": ["fact"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let fact = crate::required_str(&arguments, "fact")?;
        match homeclaw_workspace::append_memory(&self.workspace, fact) {
            Ok(()) => Ok(ToolResult::ok(format!("Remembered: {}", fact.trim()))),
            Err(e) => Ok(ToolResult::failed(format!("Could not update memory: {e}"))),
        }
    }
}
