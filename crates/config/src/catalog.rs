//! Built-in catalog of LLM providers and suggested models.
//!
//! The `provider` half of a `provider:model` spec must name one of these.

/// Which HTTP API shape a provider speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireProtocol {
    /// `/chat/completions` with Bearer auth
    OpenAiCompatible,
    /// Anthropic Messages API
    Anthropic,
}

#[derive(Debug, Clone, Copy)]
pub struct ProviderDef {
    pub key: &'static str,
    pub display_name: &'static str,
    pub protocol: WireProtocol,
    /// Credential holding the API key; `None` when the provider needs none.
    pub api_key_env: Option<&'static str>,
    pub base_url: &'static str,
    /// `(model id, display name)`
    pub models: &'static [(&'static str, &'static str)],
}

impl ProviderDef {
    pub fn needs_api_key(&self) -> bool {
        self.api_key_env.is_some()
    }
}

const PROVIDERS: &[ProviderDef] = &[
    ProviderDef {
        key: "openai",
        display_name: "OpenAI",
        protocol: WireProtocol::OpenAiCompatible,
        api_key_env: Some("OPENAI_API_KEY"),
        base_url: "https://api.openai.com/v1",
        models: &[
            ("gpt-4o", "GPT-4o"),
            ("gpt-4o-mini", "GPT-4o mini"),
            ("o3-mini", "o3-mini"),
        ],
    },
    ProviderDef {
        key: "anthropic",
        display_name: "Anthropic",
        protocol: WireProtocol::Anthropic,
        api_key_env: Some("ANTHROPIC_API_KEY"),
        base_url: "https://api.anthropic.com",
        models: &[
            ("claude-sonnet-4-5-20250929", "Claude Sonnet 4.5"),
            ("claude-haiku-4-5-20251001", "Claude Haiku 4.5"),
        ],
    },
    ProviderDef {
        key: "google_genai",
        display_name: "Google Gemini",
        protocol: WireProtocol::OpenAiCompatible,
        api_key_env: Some("GOOGLE_API_KEY"),
        base_url: "https://generativelanguage.googleapis.com/v1beta/openai",
        models: &[
            ("gemini-2.0-flash", "Gemini 2.0 Flash"),
            ("gemini-2.5-pro", "Gemini 2.5 Pro"),
        ],
    },
    ProviderDef {
        key: "deepseek",
        display_name: "DeepSeek",
        protocol: WireProtocol::OpenAiCompatible,
        api_key_env: Some("DEEPSEEK_API_KEY"),
        base_url: "https://api.deepseek.com",
        models: &[
            ("deepseek-chat", "DeepSeek Chat"),
            ("deepseek-reasoner", "DeepSeek Reasoner"),
        ],
    },
    ProviderDef {
        key: "openrouter",
        display_name: "OpenRouter",
        protocol: WireProtocol::OpenAiCompatible,
        api_key_env: Some("OPENROUTER_API_KEY"),
        base_url: "https://openrouter.ai/api/v1",
        models: &[
            ("anthropic/claude-sonnet-4", "Claude Sonnet 4 (via OpenRouter)"),
            ("openai/gpt-4o", "GPT-4o (via OpenRouter)"),
        ],
    },
    ProviderDef {
        key: "ollama",
        display_name: "Ollama (local)",
        protocol: WireProtocol::OpenAiCompatible,
        api_key_env: None,
        base_url: "http://localhost:11434",
        models: &[("llama3.2", "Llama 3.2"), ("qwen2.5", "Qwen 2.5")],
    },
];

pub fn catalog() -> &'static [ProviderDef] {
    PROVIDERS
}

pub fn find_provider(key: &str) -> Option<&'static ProviderDef> {
    PROVIDERS.iter().find(|p| p.key == key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_has_expected_providers() {
        let keys: Vec<&str> = catalog().iter().map(|p| p.key).collect();
        for expected in ["openai", "anthropic", "google_genai", "deepseek", "ollama"] {
            assert!(keys.contains(&expected), "missing {expected}");
        }
    }

    #[test]
    fn deepseek_is_openai_compatible() {
        let ds = find_provider("deepseek").unwrap();
        assert_eq!(ds.protocol, WireProtocol::OpenAiCompatible);
        assert_eq!(ds.base_url, "https://api.deepseek.com");
        assert!(ds.needs_api_key());
        let ids: Vec<&str> = ds.models.iter().map(|(id, _)| *id).collect();
        assert!(ids.contains(&"deepseek-chat"));
        assert!(ids.contains(&"deepseek-reasoner"));
    }

    #[test]
    fn ollama_needs_no_key() {
        assert!(!find_provider("ollama").unwrap().needs_api_key());
        assert!(find_provider("nonexistent").is_none());
    }
}
