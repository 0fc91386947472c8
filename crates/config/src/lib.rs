//! Configuration loading, validation, and management for HomeClaw.
//!
//! Loads configuration from `~/.homeclaw/config.json`. Every optional field
//! has a typed default, and the whole document is validated at load time so
//! a bad value fails at startup rather than at first use.

pub mod catalog;
pub mod credentials;

use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};

pub use catalog::{ProviderDef, WireProtocol, catalog, find_provider};
pub use credentials::Credentials;

/// The root configuration structure.
///
/// Maps directly to `~/.homeclaw/config.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Model used when no override is given: a `model_list` name or
    /// `provider:model`.
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Named model shortcuts selectable with `--model <name>`.
    #[serde(default = "default_model_list")]
    pub model_list: Vec<ModelEntry>,

    /// Workspace directory; a leading `~` expands to the home directory.
    #[serde(default = "default_workspace")]
    pub workspace: String,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Upper bound on model round-trips per turn
    #[serde(default = "default_max_tool_iterations")]
    pub max_tool_iterations: u32,

    #[serde(default)]
    pub tools: ToolsConfig,

    #[serde(default)]
    pub channels: ChannelsConfig,

    #[serde(default)]
    pub heartbeat: HeartbeatConfig,
}

fn default_model() -> String {
    "openai:gpt-4o".into()
}
fn default_workspace() -> String {
    "~/.homeclaw/workspace".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tool_iterations() -> u32 {
    10
}
fn default_true() -> bool {
    true
}

fn default_model_list() -> Vec<ModelEntry> {
    vec![
        ModelEntry {
            name: "gpt-4o".into(),
            provider: "openai".into(),
            model: "gpt-4o".into(),
            api_key_env: Some("OPENAI_API_KEY".into()),
            base_url: None,
        },
        ModelEntry {
            name: "claude".into(),
            provider: "anthropic".into(),
            model: "claude-sonnet-4-5-20250929".into(),
            api_key_env: Some("ANTHROPIC_API_KEY".into()),
            base_url: None,
        },
        ModelEntry {
            name: "local-llama".into(),
            provider: "ollama".into(),
            model: "llama3.2".into(),
            api_key_env: None,
            base_url: Some("http://localhost:11434".into()),
        },
    ]
}

/// A named model shortcut.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelEntry {
    pub name: String,
    pub provider: String,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

/// A fully resolved model choice, ready for provider construction.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSelection {
    pub provider: String,
    pub model: String,
    /// Credential name holding the API key, if the provider needs one.
    pub api_key_env: Option<String>,
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ToolsConfig {
    #[serde(default)]
    pub web_search: WebSearchConfig,
    #[serde(default)]
    pub shell_exec: ShellExecConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebSearchConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// "tavily" or "duckduckgo"
    #[serde(default = "default_search_provider")]
    pub provider: String,
    #[serde(default = "default_search_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_max_results")]
    pub max_results: u32,
}

fn default_search_provider() -> String {
    "tavily".into()
}
fn default_search_key_env() -> String {
    "TAVILY_API_KEY".into()
}
fn default_max_results() -> u32 {
    5
}

impl Default for WebSearchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            provider: default_search_provider(),
            api_key_env: default_search_key_env(),
            max_results: default_max_results(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShellExecConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_shell_timeout")]
    pub timeout_secs: u64,
}

fn default_shell_timeout() -> u64 {
    60
}

impl Default for ShellExecConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_secs: default_shell_timeout(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelsConfig {
    #[serde(default = "default_telegram")]
    pub telegram: ChannelConfig,
    #[serde(default = "default_discord")]
    pub discord: ChannelConfig,
    #[serde(default = "default_slack")]
    pub slack: ChannelConfig,
}

impl Default for ChannelsConfig {
    fn default() -> Self {
        Self {
            telegram: default_telegram(),
            discord: default_discord(),
            slack: default_slack(),
        }
    }
}

impl ChannelsConfig {
    /// Look up a channel's settings by platform name.
    pub fn get(&self, name: &str) -> Option<&ChannelConfig> {
        match name {
            "telegram" => Some(&self.telegram),
            "discord" => Some(&self.discord),
            "slack" => Some(&self.slack),
            _ => None,
        }
    }

    /// `(name, settings)` for every platform, in a fixed order.
    pub fn all(&self) -> [(&'static str, &ChannelConfig); 3] {
        [
            ("telegram", &self.telegram),
            ("discord", &self.discord),
            ("slack", &self.slack),
        ]
    }

    pub fn any_enabled(&self) -> bool {
        self.all().iter().any(|(_, c)| c.enabled)
    }

    /// Fill in platform credential names a partial channel object left out.
    fn fill_platform_defaults(&mut self) {
        let defaults = Self::default();
        for (ours, theirs) in [
            (&mut self.telegram, defaults.telegram),
            (&mut self.discord, defaults.discord),
            (&mut self.slack, defaults.slack),
        ] {
            if ours.token_env.trim().is_empty() {
                ours.token_env = theirs.token_env;
            }
            if ours.app_token_env.is_none() {
                ours.app_token_env = theirs.app_token_env;
            }
        }
    }
}

/// Per-platform settings. Tokens are referenced by credential name, never
/// stored in this file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Credential holding the bot token; the platform's own name when omitted
    #[serde(default)]
    pub token_env: String,

    /// Second credential some platforms need (Slack's Socket Mode app token)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_token_env: Option<String>,

    /// Platform user ids allowed to talk to the bot. Empty = everyone.
    /// Numeric ids are accepted and kept as strings.
    #[serde(default, deserialize_with = "user_ids")]
    pub allowed_users: Vec<String>,
}

fn user_ids<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum UserId {
        Text(String),
        Number(i64),
    }

    Ok(Vec::<UserId>::deserialize(deserializer)?
        .into_iter()
        .map(|id| match id {
            UserId::Text(text) => text,
            UserId::Number(n) => n.to_string(),
        })
        .collect())
}

impl ChannelConfig {
    fn disabled(token_env: &str) -> Self {
        Self {
            enabled: false,
            token_env: token_env.into(),
            app_token_env: None,
            allowed_users: Vec::new(),
        }
    }

    /// Allowlist check on a platform user id.
    pub fn is_allowed(&self, user_id: &str) -> bool {
        self.allowed_users.is_empty() || self.allowed_users.iter().any(|u| u == user_id)
    }
}

fn default_telegram() -> ChannelConfig {
    ChannelConfig::disabled("TELEGRAM_BOT_TOKEN")
}
fn default_discord() -> ChannelConfig {
    ChannelConfig::disabled("DISCORD_BOT_TOKEN")
}
fn default_slack() -> ChannelConfig {
    ChannelConfig {
        app_token_env: Some("SLACK_APP_TOKEN".into()),
        ..ChannelConfig::disabled("SLACK_BOT_TOKEN")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Interval for tasks that carry no schedule of their own
    #[serde(default = "default_heartbeat_interval")]
    pub interval_minutes: u32,
}

fn default_heartbeat_interval() -> u32 {
    60
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_minutes: default_heartbeat_interval(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let mut config: Self = serde_json::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        config.channels.fill_platform_defaults();

        config.validate()?;
        Ok(config)
    }

    /// Overwrite `path` with this configuration.
    ///
    /// Writes a sibling temp file and renames it over the target so a crash
    /// never leaves a half-written config behind.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        self.validate()?;
        let write_err = |e: std::io::Error| ConfigError::WriteError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }

        let json = serde_json::to_string_pretty(self).map_err(|e| ConfigError::WriteError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json + "\n").map_err(write_err)?;
        std::fs::rename(&tmp, path).map_err(write_err)?;
        tracing::debug!(path = %path.display(), "Configuration saved");
        Ok(())
    }

    /// Save to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".homeclaw")
    }

    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.json")
    }

    /// The credential file next to the config.
    pub fn credentials_path() -> PathBuf {
        Self::config_dir().join(".env")
    }

    /// The configured workspace directory with `~` expanded.
    pub fn workspace_path(&self) -> PathBuf {
        expand_home(&self.workspace)
    }

    /// Resolve a model spec (a `model_list` name or `provider:model`).
    pub fn resolve_model(&self, spec: &str) -> Result<ModelSelection, ConfigError> {
        if let Some(entry) = self.model_list.iter().find(|m| m.name == spec) {
            let def = find_provider(&entry.provider).ok_or_else(|| {
                ConfigError::ValidationError(format!(
                    "model '{}' uses unknown provider '{}'",
                    entry.name, entry.provider
                ))
            })?;
            return Ok(ModelSelection {
                provider: entry.provider.clone(),
                model: entry.model.clone(),
                api_key_env: entry
                    .api_key_env
                    .clone()
                    .or_else(|| def.api_key_env.map(String::from)),
                base_url: entry.base_url.clone(),
            });
        }

        let Some((provider, model)) = spec.split_once(':') else {
            return Err(ConfigError::ValidationError(format!(
                "model '{spec}' is neither a model_list name nor of the form provider:model"
            )));
        };

        let def = find_provider(provider).ok_or_else(|| {
            let known: Vec<&str> = catalog().iter().map(|p| p.key).collect();
            ConfigError::ValidationError(format!(
                "unsupported provider '{provider}' (known: {})",
                known.join(", ")
            ))
        })?;

        if model.trim().is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "model '{spec}' has an empty model id"
            )));
        }

        Ok(ModelSelection {
            provider: def.key.to_string(),
            model: model.to_string(),
            api_key_env: def.api_key_env.map(String::from),
            base_url: None,
        })
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.default_model.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "default_model must not be empty".into(),
            ));
        }

        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::ValidationError(
                "temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.max_tool_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "max_tool_iterations must be at least 1".into(),
            ));
        }

        if self.heartbeat.interval_minutes == 0 {
            return Err(ConfigError::ValidationError(
                "heartbeat.interval_minutes must be at least 1".into(),
            ));
        }

        let mut names = std::collections::HashSet::new();
        for entry in &self.model_list {
            if entry.name.trim().is_empty() {
                return Err(ConfigError::ValidationError(
                    "model_list entries need a name".into(),
                ));
            }
            if !names.insert(entry.name.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate model_list name '{}'",
                    entry.name
                )));
            }
        }

        if !matches!(self.tools.web_search.provider.as_str(), "tavily" | "duckduckgo") {
            return Err(ConfigError::ValidationError(format!(
                "tools.web_search.provider must be 'tavily' or 'duckduckgo', got '{}'",
                self.tools.web_search.provider
            )));
        }

        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            default_model: default_model(),
            model_list: default_model_list(),
            workspace: default_workspace(),
            temperature: default_temperature(),
            max_tool_iterations: default_max_tool_iterations(),
            tools: ToolsConfig::default(),
            channels: ChannelsConfig::default(),
            heartbeat: HeartbeatConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

fn expand_home(path: &str) -> PathBuf {
    if path == "~" {
        return dirs_home();
    }
    match path.strip_prefix("~/") {
        Some(rest) => dirs_home().join(rest),
        None => PathBuf::from(path),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Failed to write {path}: {reason}")]
    WriteError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),

    #[error("No API key for provider '{provider}': set {env_var} in ~/.homeclaw/.env")]
    MissingCredential { provider: String, env_var: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.default_model, "openai:gpt-4o");
        assert_eq!(config.model_list.len(), 3);
        assert!(config.tools.web_search.enabled);
        assert!(!config.channels.any_enabled());
        assert!(!config.heartbeat.enabled);
        assert_eq!(config.heartbeat.interval_minutes, 60);
    }

    #[test]
    fn save_then_load_is_identity() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = AppConfig::default();
        config.default_model = "claude".into();
        config.channels.telegram.enabled = true;
        config.channels.telegram.allowed_users = vec!["1001".into()];
        config.heartbeat = HeartbeatConfig { enabled: true, interval_minutes: 15 };
        config.save_to(&path).unwrap();

        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded, config);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn partial_file_gets_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"heartbeat": {"enabled": true}}"#).unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert!(config.heartbeat.enabled);
        assert_eq!(config.heartbeat.interval_minutes, 60);
        assert_eq!(config.default_model, "openai:gpt-4o");
        assert_eq!(config.channels.slack.app_token_env.as_deref(), Some("SLACK_APP_TOKEN"));
    }

    #[test]
    fn partial_channel_objects_get_platform_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"channels": {"telegram": {"enabled": true, "allowed_users": [123456789, "42"]},
                             "slack": {"enabled": true}}}"#,
        )
        .unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert!(config.channels.telegram.enabled);
        assert_eq!(config.channels.telegram.token_env, "TELEGRAM_BOT_TOKEN");
        assert_eq!(config.channels.telegram.allowed_users, vec!["123456789", "42"]);
        assert!(config.channels.telegram.is_allowed("123456789"));
        assert_eq!(config.channels.slack.token_env, "SLACK_BOT_TOKEN");
        assert_eq!(config.channels.slack.app_token_env.as_deref(), Some("SLACK_APP_TOKEN"));
        assert_eq!(config.channels.discord.token_env, "DISCORD_BOT_TOKEN");
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/config.json")).unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn malformed_json_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            AppConfig::load_from(&path),
            Err(ConfigError::ParseError { .. })
        ));
    }

    #[test]
    fn wrong_field_type_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"heartbeat": {"interval_minutes": "hourly"}}"#).unwrap();
        assert!(matches!(
            AppConfig::load_from(&path),
            Err(ConfigError::ParseError { .. })
        ));
    }

    #[test]
    fn zero_interval_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"heartbeat": {"interval_minutes": 0}}"#).unwrap();
        assert!(matches!(
            AppConfig::load_from(&path),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn invalid_temperature_rejected() {
        let config = AppConfig {
            temperature: 5.0,
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn unknown_search_provider_rejected() {
        let mut config = AppConfig::default();
        config.tools.web_search.provider = "bing".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn duplicate_model_names_rejected() {
        let mut config = AppConfig::default();
        let dup = config.model_list[0].clone();
        config.model_list.push(dup);
        assert!(config.validate().is_err());
    }

    #[test]
    fn resolve_alias_and_provider_model() {
        let config = AppConfig::default();

        let alias = config.resolve_model("local-llama").unwrap();
        assert_eq!(alias.provider, "ollama");
        assert_eq!(alias.model, "llama3.2");
        assert_eq!(alias.base_url.as_deref(), Some("http://localhost:11434"));
        assert_eq!(alias.api_key_env, None);

        let direct = config.resolve_model("deepseek:deepseek-chat").unwrap();
        assert_eq!(direct.provider, "deepseek");
        assert_eq!(direct.model, "deepseek-chat");
        assert_eq!(direct.api_key_env.as_deref(), Some("DEEPSEEK_API_KEY"));
    }

    #[test]
    fn resolve_keeps_colons_in_model_id() {
        let config = AppConfig::default();
        let sel = config.resolve_model("ollama:qwen2.5:7b").unwrap();
        assert_eq!(sel.provider, "ollama");
        assert_eq!(sel.model, "qwen2.5:7b");
    }

    #[test]
    fn resolve_rejects_unknown_provider() {
        let config = AppConfig::default();
        let err = config.resolve_model("acme:turbo-9000").unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
        assert!(err.to_string().contains("acme"));
    }

    #[test]
    fn resolve_rejects_bare_unknown_name() {
        let config = AppConfig::default();
        assert!(config.resolve_model("gpt-5-ultra").is_err());
    }

    #[test]
    fn allowlist_semantics() {
        let mut ch = default_telegram();
        assert!(ch.is_allowed("anyone"));
        ch.allowed_users = vec!["1001".into()];
        assert!(ch.is_allowed("1001"));
        assert!(!ch.is_allowed("2002"));
    }

    #[test]
    fn workspace_tilde_expands() {
        let config = AppConfig::default();
        let ws = config.workspace_path();
        assert!(ws.ends_with(".homeclaw/workspace"));
        assert!(!ws.to_string_lossy().starts_with('~'));

        let absolute = AppConfig {
            workspace: "/srv/assistant".into(),
            ..AppConfig::default()
        };
        assert_eq!(absolute.workspace_path(), PathBuf::from("/srv/assistant"));
    }
}
