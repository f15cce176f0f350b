//! Configuration schema for toolgate.toml.

use serde::{Deserialize, Serialize};

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Model provider settings.
    pub model: ModelConfig,

    /// Backends to mount at startup, in mount order.
    pub backends: Vec<BackendConfig>,

    /// Per-tool result formatting strategies.
    pub formatting: FormattingConfig,
}

/// Model provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Base URL of the model provider API.
    pub base_url: String,

    /// Model identifier sent with every request.
    pub model: String,

    /// Environment variable holding the provider API key.
    pub api_key_env: String,

    /// Maximum output tokens per model turn.
    pub max_tokens: u32,

    /// Maximum conversation turns before a session is cut off. Must be >= 1.
    pub max_turns: u32,

    /// Request timeout for model calls, in seconds.
    pub timeout_secs: u64,

    /// System instructions prepended to every session. Empty means none.
    pub system_prompt: String,
}

/// One backend API to mount: a base address, a static auth header, and the
/// OpenAPI specification its tools are compiled from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Binding identifier, unique across the config.
    pub name: String,

    /// Base URL requests are issued against.
    pub base_url: String,

    /// Path to the OpenAPI specification file (YAML or JSON).
    pub spec_path: String,

    /// Name of the static authorization header.
    pub auth_header: String,

    /// Environment variable whose value becomes the auth header value.
    pub credential_env: String,

    /// Request timeout for this backend, in seconds.
    pub timeout_secs: u64,
}

/// Maps tool names to the strategy used to format their results for the
/// model. Tools listed nowhere get the generic fallback.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FormattingConfig {
    /// Tools whose result is condensed to a single extracted price.
    pub price_quote: Vec<String>,

    /// Tools whose full JSON payload is passed to the model verbatim.
    pub verbatim: Vec<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            model: ModelConfig::default(),
            backends: vec![
                BackendConfig {
                    name: "blockfrost".into(),
                    base_url: "https://cardano-mainnet.blockfrost.io/api/v0".into(),
                    spec_path: "specs/blockfrost_openapi.yaml".into(),
                    auth_header: "project_id".into(),
                    credential_env: "BLOCKFROST_PROJECT_ID".into(),
                    timeout_secs: 30,
                },
                BackendConfig {
                    name: "coinmarketcap".into(),
                    base_url: "https://pro-api.coinmarketcap.com".into(),
                    spec_path: "specs/coinmarketcap_openapi.yaml".into(),
                    auth_header: "X-CMC_PRO_API_KEY".into(),
                    credential_env: "COINMARKETCAP_API_KEY".into(),
                    timeout_secs: 30,
                },
            ],
            formatting: FormattingConfig::default(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.anthropic.com".into(),
            model: "claude-sonnet-4-20250514".into(),
            api_key_env: "ANTHROPIC_API_KEY".into(),
            max_tokens: 2048,
            max_turns: 8,
            timeout_secs: 120,
            system_prompt: String::new(),
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            base_url: String::new(),
            spec_path: String::new(),
            auth_header: "Authorization".into(),
            credential_env: String::new(),
            timeout_secs: 30,
        }
    }
}

impl Default for FormattingConfig {
    fn default() -> Self {
        Self {
            price_quote: vec!["get_latest_crypto_quotes".into()],
            verbatim: vec![
                "get_address_transactions".into(),
                "get_address_info".into(),
                "get_address_totals".into(),
                "get_address_extended_info".into(),
            ],
        }
    }
}

impl GatewayConfig {
    /// Resolve a path that may contain `~` to an absolute path.
    pub fn resolve_path(&self, path: &str) -> String {
        shellexpand::tilde(path).into_owned()
    }

    /// Check cross-field invariants not expressible in the schema.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.model.max_turns == 0 {
            anyhow::bail!("model.max_turns must be at least 1");
        }
        let mut seen = std::collections::HashSet::new();
        for backend in &self.backends {
            if backend.name.is_empty() {
                anyhow::bail!("every backend needs a non-empty name");
            }
            if !seen.insert(backend.name.as_str()) {
                anyhow::bail!("duplicate backend name: {}", backend.name);
            }
        }
        Ok(())
    }
}
