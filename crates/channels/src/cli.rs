//! CLI channel: interactive terminal chat.
//!
//! Reads lines from stdin (or any buffered reader) and prints replies to
//! stdout. Used by the `homeclaw` REPL.

use async_trait::async_trait;
use homeclaw_core::channel::{Channel, InboundMessage, InboundStream};
use homeclaw_core::error::ChannelError;
use std::io::Write;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::{Mutex, mpsc};

/// Inputs that end the session.
pub const EXIT_WORDS: &[&str] = &["exit", "quit", "/exit", "/quit"];

pub fn is_exit_word(line: &str) -> bool {
    EXIT_WORDS.contains(&line.trim())
}

type Input = Box<dyn AsyncBufRead + Send + Unpin>;

/// Interactive CLI channel for terminal-based chat.
pub struct CliChannel {
    input: Mutex<Option<Input>>,
}

impl CliChannel {
    /// A channel reading from stdin.
    pub fn new() -> Self {
        Self::with_input(BufReader::new(tokio::io::stdin()))
    }

    /// A channel reading from `input` instead of stdin.
    pub fn with_input(input: impl AsyncBufRead + Send + Unpin + 'static) -> Self {
        Self {
            input: Mutex::new(Some(Box::new(input))),
        }
    }
}

impl Default for CliChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Channel for CliChannel {
    fn name(&self) -> &str {
        "cli"
    }

    /// The stream ends at EOF or on an exit word. Blank lines are skipped.
    async fn start(&self) -> Result<InboundStream, ChannelError> {
        let input = self
            .input
            .lock()
            .await
            .take()
            .ok_or_else(|| ChannelError::ConnectionLost("terminal input already consumed".into()))?;

        let (tx, rx) = mpsc::channel(32);
        tokio::spawn(async move {
            let mut lines = input.lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let line = line.trim().to_string();
                        if line.is_empty() {
                            continue;
                        }
                        if is_exit_word(&line) {
                            break;
                        }

                        let msg = InboundMessage {
                            channel: "cli".into(),
                            user_id: "local".into(),
                            chat_id: "local".into(),
                            text: line,
                            sender_name: None,
                        };
                        if tx.send(Ok(msg)).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        let _ = tx.send(Err(ChannelError::ConnectionLost(e.to_string()))).await;
                        break;
                    }
                }
            }
        });

        Ok(rx)
    }

    async fn send(&self, _chat_id: &str, text: &str) -> Result<(), ChannelError> {
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{text}").and_then(|_| stdout.flush()).map_err(|e| ChannelError::DeliveryFailed {
            channel: "cli".into(),
            reason: e.to_string(),
        })
    }

    fn max_message_len(&self) -> usize {
        usize::MAX
    }
}
