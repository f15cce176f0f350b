pub mod schema;

pub use schema::{BackendConfig, FormattingConfig, GatewayConfig, ModelConfig};

use anyhow::{Context, Result};
use std::path::Path;

/// Load config from the given path, or return defaults.
pub fn load_config(path: &Path) -> Result<GatewayConfig> {
    let config = if path.exists() {
        let contents =
            std::fs::read_to_string(path).context("Failed to read toolgate config file")?;
        toml::from_str(&contents).context("Failed to parse toolgate config (TOML)")?
    } else {
        GatewayConfig::default()
    };
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_config_with_overrides() {
        let toml_text = r#"
            [model]
            model = "claude-haiku-3-5-20241022"
            max_turns = 3

            [[backends]]
            name = "ledger"
            base_url = "https://ledger.example.com/v1"
            spec_path = "ledger.yaml"
            auth_header = "project_id"
            credential_env = "LEDGER_KEY"
        "#;
        let config: GatewayConfig = toml::from_str(toml_text).unwrap();
        config.validate().unwrap();

        assert_eq!(config.model.model, "claude-haiku-3-5-20241022");
        assert_eq!(config.model.max_turns, 3);
        assert_eq!(config.model.max_tokens, 2048); // default survives
        assert_eq!(config.backends.len(), 1);
        assert_eq!(config.backends[0].auth_header, "project_id");
        assert_eq!(config.backends[0].timeout_secs, 30);
    }

    #[test]
    fn rejects_zero_turn_bound() {
        let config: GatewayConfig = toml::from_str("[model]\nmax_turns = 0\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_duplicate_backend_names() {
        let toml_text = r#"
            [[backends]]
            name = "a"
            [[backends]]
            name = "a"
        "#;
        let config: GatewayConfig = toml::from_str(toml_text).unwrap();
        assert!(config.validate().is_err());
    }
}
