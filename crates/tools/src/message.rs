//! `send_message`: deliver a message to a user on another chat platform.

use async_trait::async_trait;
use homeclaw_core::channel::MessageRouter;
use homeclaw_core::error::ToolError;
use homeclaw_core::tool::{Tool, ToolResult};
use std::sync::Arc;
use tracing::warn;

pub struct SendMessageTool {
    router: Arc<dyn MessageRouter>,
}

impl SendMessageTool {
    pub fn new(router: Arc<dyn MessageRouter>) -> Self {
        Self { router }
    }
}

#[async_trait]
impl Tool for SendMessageTool {
    fn name(&self) -> &str {
        "send_message"
    }

    fn description(&self) -> &str {
        "Send a message to a user on a chat platform ('telegram', 'discord' or 'slack')."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "channel": {
                    "type": "string",
                    "description": "Platform to send on",
                    "enum": ["telegram", "discord", "slack"]
                },
                "user_id": {
                    "type": "string",
                    "description": "Platform user or chat id to send to"
                },
                "message": {
                    "type": "string",
                    "description": "The message text"
                }
            },
            "required": ["channel", "user_id", "message"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let channel = crate::required_str(&arguments, "channel")?.to_lowercase();
        let user_id = crate::required_str(&arguments, "user_id")?;
        let message = crate::required_str(&arguments, "message")?;

        let available = self.router.channels();
        if !available.iter().any(|c| *c == channel) {
            let list = if available.is_empty() {
                "none".to_string()
            } else {
                available.join(", ")
            };
            return Ok(ToolResult::failed(format!(
                "Channel '{channel}' is not available (available: {list})."
            )));
        }

        match self.router.deliver(&channel, user_id, message).await {
            Ok(()) => Ok(ToolResult::ok(format!("Message sent to {channel} user {user_id}."))),
            Err(e) => {
                warn!(channel = %channel, error = %e, "send_message delivery failed");
                Ok(ToolResult::failed(format!("Error sending {channel} message: {e}")))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use homeclaw_core::error::ChannelError;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingRouter {
        delivered: Mutex<Vec<(String, String, String)>>,
    }

    #[async_trait]
    impl MessageRouter for RecordingRouter {
        fn channels(&self) -> Vec<String> {
            vec!["telegram".into()]
        }

        async fn deliver(&self, channel: &str, user_id: &str, text: &str) -> Result<(), ChannelError> {
            if user_id == "blocked" {
                return Err(ChannelError::DeliveryFailed {
                    channel: channel.into(),
                    reason: "bot was blocked by the user".into(),
                });
            }
            self.delivered
                .lock()
                .unwrap()
                .push((channel.into(), user_id.into(), text.into()));
            Ok(())
        }
    }

    #[tokio::test]
    async fn delivers_through_router() {
        let router = Arc::new(RecordingRouter::default());
        let tool = SendMessageTool::new(router.clone());
        let result = tool
            .execute(serde_json::json!({"channel": "Telegram", "user_id": "42", "message": "Dinner at 7"}))
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(
            router.delivered.lock().unwrap()[0],
            ("telegram".into(), "42".into(), "Dinner at 7".into())
        );
    }

    #[tokio::test]
    async fn unavailable_channel_fails_softly() {
        let tool = SendMessageTool::new(Arc::new(RecordingRouter::default()));
        let result = tool
            .execute(serde_json::json!({"channel": "discord", "user_id": "1", "message": "hi"}))
            .await
            .unwrap();
        assert!(!result.success);
        assert!(result.output.contains("telegram"));
    }

    #[tokio::test]
    async fn delivery_error_is_failed_result() {
        let tool = SendMessageTool::new(Arc::new(RecordingRouter::default()));
        let result = tool
            .execute(serde_json::json!({"channel": "telegram", "user_id": "blocked", "message": "hi"}))
            .await
            .unwrap();
        assert!(!result.success);
    }
}
