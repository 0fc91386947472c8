//! Everything a command needs, loaded once at startup.

use homeclaw_agent::AgentFactory;
use homeclaw_channels::ChannelRegistry;
use homeclaw_config::{AppConfig, ConfigError, Credentials};
use homeclaw_core::channel::MessageRouter;
use homeclaw_core::error::{SessionError, WorkspaceError};
use homeclaw_sessions::SessionManager;
use homeclaw_workspace::WorkspaceContext;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

pub struct AppContext {
    pub config: AppConfig,
    pub config_path: PathBuf,
    pub credentials: Credentials,
    pub credentials_path: PathBuf,
    pub workspace_dir: PathBuf,
}

impl AppContext {
    /// Load from `~/.homeclaw`.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(AppConfig::config_path(), AppConfig::credentials_path())
    }

    pub fn load_from(config_path: PathBuf, credentials_path: PathBuf) -> Result<Self, ConfigError> {
        let config = AppConfig::load_from(&config_path)?;
        let credentials = Credentials::load(&credentials_path)?;
        let workspace_dir = config.workspace_path();
        Ok(Self {
            config,
            config_path,
            credentials,
            credentials_path,
            workspace_dir,
        })
    }

    /// Make sure the workspace exists and read it.
    pub fn workspace(&self) -> Result<WorkspaceContext, WorkspaceError> {
        homeclaw_workspace::ensure(&self.workspace_dir)?;
        homeclaw_workspace::read_all(&self.workspace_dir)
    }

    pub async fn sessions(&self) -> Result<Arc<SessionManager>, SessionError> {
        Ok(Arc::new(SessionManager::open(&self.workspace_dir).await?))
    }

    pub fn factory(&self, model: Option<String>) -> AgentFactory<'_> {
        AgentFactory::new(&self.config, &self.credentials).with_model(model)
    }

    /// A registry of every enabled channel, for outbound delivery. Channels
    /// that cannot be built are logged and left out.
    pub fn channel_registry(&self) -> Arc<ChannelRegistry> {
        let (registry, failures) = ChannelRegistry::from_config(&self.config.channels, &self.credentials);
        for (name, e) in failures {
            error!(channel = %name, error = %e, "Channel unavailable");
        }
        if !registry.is_empty() {
            info!(channels = ?registry.list(), "Outbound channels ready");
        }
        Arc::new(registry)
    }

    /// The registry as a router, or `None` when no channel is enabled.
    pub fn router(&self) -> Option<Arc<dyn MessageRouter>> {
        if !self.config.channels.any_enabled() {
            return None;
        }
        let router: Arc<dyn MessageRouter> = self.channel_registry();
        Some(router)
    }
}
