//! Channel registry: the configured channel instances, addressable by name.
//!
//! The registry is also the [`MessageRouter`] behind the agent's
//! `send_message` tool, so a conversation on one platform (or a heartbeat
//! task) can deliver a message to a user on another.

use async_trait::async_trait;
use homeclaw_config::{ChannelsConfig, Credentials};
use homeclaw_core::channel::{Channel, MessageRouter};
use homeclaw_core::error::ChannelError;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Central registry holding all enabled channel instances.
#[derive(Default)]
pub struct ChannelRegistry {
    channels: BTreeMap<String, Arc<dyn Channel>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a channel for every enabled platform. Platforms that cannot be
    /// built (usually a missing token) are returned alongside the registry
    /// instead of failing the rest.
    pub fn from_config(
        channels: &ChannelsConfig,
        credentials: &Credentials,
    ) -> (Self, Vec<(String, ChannelError)>) {
        let mut registry = Self::new();
        let mut failures = Vec::new();

        for (name, config) in channels.all() {
            if !config.enabled {
                continue;
            }
            match crate::build_channel(name, config, credentials) {
                Ok(channel) => registry.register(channel),
                Err(e) => failures.push((name.to_string(), e)),
            }
        }
        (registry, failures)
    }

    /// Register a channel adapter, replacing any with the same name.
    pub fn register(&mut self, channel: Arc<dyn Channel>) {
        let name = channel.name().to_string();
        info!(channel = %name, "Registered channel");
        self.channels.insert(name, channel);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Channel>> {
        self.channels.get(name)
    }

    /// Registered channel names, sorted.
    pub fn list(&self) -> Vec<String> {
        self.channels.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Stop all channels gracefully.
    pub async fn stop_all(&self) {
        for (name, channel) in &self.channels {
            if let Err(e) = channel.stop().await {
                warn!(channel = %name, error = %e, "Failed to stop channel");
            }
        }
    }
}

#[async_trait]
impl MessageRouter for ChannelRegistry {
    fn channels(&self) -> Vec<String> {
        self.list()
    }

    async fn deliver(&self, channel: &str, user_id: &str, text: &str) -> Result<(), ChannelError> {
        let target = self
            .channels
            .get(channel)
            .ok_or_else(|| ChannelError::NotConfigured(format!("channel '{channel}' is not registered")))?;

        for chunk in crate::gateway::split_message(text, target.max_message_len()) {
            target.send_to_user(user_id, &chunk).await?;
        }
        info!(channel, user_id, "Delivered message");
        Ok(())
    }
}
