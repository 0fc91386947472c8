//! Agent construction from configuration and workspace context.

use crate::loop_runner::AgentLoop;
use crate::prompt::build_system_prompt;
use homeclaw_config::{AppConfig, ConfigError, Credentials};
use homeclaw_core::channel::MessageRouter;
use homeclaw_core::provider::Provider;
use homeclaw_sessions::Checkpointer;
use homeclaw_tools::{ToolContext, build_registry};
use homeclaw_workspace::WorkspaceContext;
use std::sync::Arc;
use tracing::info;

/// Builds agents bound to one configuration and credential set.
pub struct AgentFactory<'a> {
    config: &'a AppConfig,
    credentials: &'a Credentials,
    model_override: Option<String>,
}

impl<'a> AgentFactory<'a> {
    pub fn new(config: &'a AppConfig, credentials: &'a Credentials) -> Self {
        Self {
            config,
            credentials,
            model_override: None,
        }
    }

    /// Use `model` (a `model_list` name or `provider:model`) instead of the
    /// configured default.
    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model_override = model;
        self
    }

    /// Resolve the model, construct its provider, and assemble the agent.
    ///
    /// Fails before any network I/O when the provider is unknown or its API
    /// key is missing.
    pub fn build(
        &self,
        workspace: &WorkspaceContext,
        checkpointer: Arc<dyn Checkpointer>,
        router: Option<Arc<dyn MessageRouter>>,
    ) -> Result<Arc<AgentLoop>, ConfigError> {
        let spec = self
            .model_override
            .as_deref()
            .unwrap_or(self.config.default_model.as_str());
        let selection = self.config.resolve_model(spec)?;
        let provider = homeclaw_providers::build_provider(&selection, self.credentials)?;

        let agent = self.assemble(provider, selection.model, workspace, checkpointer, router);
        info!(
            provider = %selection.provider,
            model = %agent.model(),
            tools = agent.tool_names().len(),
            "Agent ready"
        );
        Ok(Arc::new(agent))
    }

    /// Assemble an agent around an already constructed provider.
    pub fn assemble(
        &self,
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        workspace: &WorkspaceContext,
        checkpointer: Arc<dyn Checkpointer>,
        router: Option<Arc<dyn MessageRouter>>,
    ) -> AgentLoop {
        let tools = build_registry(ToolContext {
            workspace: workspace.root.clone(),
            tools: self.config.tools.clone(),
            credentials: self.credentials.clone(),
            router,
            channels_enabled: self.config.channels.any_enabled(),
        });

        AgentLoop::new(
            provider,
            model,
            Arc::new(tools),
            build_system_prompt(workspace),
            checkpointer,
        )
        .with_temperature(self.config.temperature)
        .with_max_iterations(self.config.max_tool_iterations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{ScriptedProvider, text_response};
    use homeclaw_config::ModelEntry;
    use homeclaw_core::agent::Agent;
    use homeclaw_sessions::InMemoryCheckpointer;

    fn workspace() -> (tempfile::TempDir, WorkspaceContext) {
        let dir = tempfile::tempdir().unwrap();
        homeclaw_workspace::ensure(dir.path()).unwrap();
        let ctx = homeclaw_workspace::read_all(dir.path()).unwrap();
        (dir, ctx)
    }

    #[test]
    fn unknown_provider_is_a_validation_error() {
        let (_dir, ctx) = workspace();
        let config = AppConfig {
            default_model: "nonexistent:some-model".into(),
            ..AppConfig::default()
        };
        let creds = Credentials::default();

        let result = AgentFactory::new(&config, &creds).build(&ctx, Arc::new(InMemoryCheckpointer::new()), None);
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn missing_key_is_reported_before_network() {
        let (_dir, ctx) = workspace();
        let mut config = AppConfig::default();
        config.model_list.push(ModelEntry {
            name: "keyless".into(),
            provider: "openai".into(),
            model: "gpt-4o-mini".into(),
            api_key_env: Some("HOMECLAW_TEST_NEVER_SET_KEY".into()),
            base_url: None,
        });
        config.default_model = "keyless".into();
        let creds = Credentials::default();

        let result = AgentFactory::new(&config, &creds).build(&ctx, Arc::new(InMemoryCheckpointer::new()), None);
        match result {
            Err(ConfigError::MissingCredential { env_var, .. }) => {
                assert_eq!(env_var, "HOMECLAW_TEST_NEVER_SET_KEY");
            }
            Err(other) => panic!("expected MissingCredential, got {other}"),
            Ok(_) => panic!("expected MissingCredential, got an agent"),
        }
    }

    #[test]
    fn keyless_provider_builds_offline() {
        let (_dir, ctx) = workspace();
        let config = AppConfig::default();
        let creds = Credentials::default();

        let agent = AgentFactory::new(&config, &creds)
            .with_model(Some("local-llama".into()))
            .build(&ctx, Arc::new(InMemoryCheckpointer::new()), None)
            .unwrap();
        assert_eq!(agent.model(), "llama3.2");
        assert!(agent.tool_names().contains(&"remember"));
        assert!(!agent.tool_names().contains(&"send_message"));
        assert!(agent.system_prompt().contains("## Persistent Memory"));
    }

    #[tokio::test]
    async fn assembled_agent_answers() {
        let (_dir, ctx) = workspace();
        let config = AppConfig::default();
        let creds = Credentials::default();
        let provider = Arc::new(ScriptedProvider::new(vec![Ok(text_response("hi there"))]));

        let agent = AgentFactory::new(&config, &creds).assemble(
            provider,
            "mock-model",
            &ctx,
            Arc::new(InMemoryCheckpointer::new()),
            None,
        );
        assert_eq!(agent.invoke("t", "hello").await.unwrap(), "hi there");
    }
}
