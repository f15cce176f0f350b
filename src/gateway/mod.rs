//! Startup assembly: turns a `GatewayConfig` into a ready `Registry`.
//!
//! Mounting happens once, before any session runs. A compile or
//! registration failure aborts only the affected backend; a missing
//! credential is fatal to startup as a whole.

use crate::config::{BackendConfig, GatewayConfig};
use crate::registry::{BackendBinding, Registry, RegistryError};
use crate::spec::{self, CompileError};
use crate::tools;
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum MountError {
    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("failed to construct backend binding: {0}")]
    Binding(String),
}

/// Outcome of mounting one backend.
#[derive(Debug, Clone)]
pub struct MountReport {
    pub backend: String,
    pub tools: usize,
}

/// Compile one backend's specification and register its tool set. Returns
/// the number of tools mounted. Nothing is registered on failure.
pub fn mount_backend(
    registry: &mut Registry,
    config: &BackendConfig,
    spec_text: &str,
    credential: &str,
) -> Result<usize, MountError> {
    let operations = spec::compile(spec_text)?;

    let mut batch = Vec::with_capacity(operations.len());
    for operation in operations {
        let tool = tools::build_tool(&operation)?;
        batch.push((tool, operation));
    }
    let count = batch.len();

    let binding = Arc::new(
        BackendBinding::new(
            &config.name,
            &config.base_url,
            vec![(config.auth_header.clone(), credential.to_string())],
            Duration::from_secs(config.timeout_secs),
        )
        .map_err(|e| MountError::Binding(e.to_string()))?,
    );
    registry.register(binding, batch)?;

    Ok(count)
}

/// Build the registry from configuration: resolve credentials, read and
/// compile every spec, and mount each backend in config order.
pub fn build_registry(config: &GatewayConfig) -> Result<(Registry, Vec<MountReport>)> {
    let mut registry = Registry::new();
    let mut reports = Vec::new();

    for backend in &config.backends {
        // Credentials are resolved before anything else; their absence is
        // startup-fatal, not a per-backend condition.
        let credential = require_env(&backend.credential_env)?;

        let spec_path = config.resolve_path(&backend.spec_path);
        let spec_text = match std::fs::read_to_string(&spec_path) {
            Ok(text) => text,
            Err(e) => {
                error!("Failed to mount '{}': cannot read spec {}: {}", backend.name, spec_path, e);
                continue;
            }
        };

        match mount_backend(&mut registry, backend, &spec_text, &credential) {
            Ok(count) => {
                info!("Mounted '{}' with {} tool(s)", backend.name, count);
                reports.push(MountReport {
                    backend: backend.name.clone(),
                    tools: count,
                });
            }
            Err(e) => {
                // Other already-mounted backends remain usable.
                error!("Failed to mount '{}': {}", backend.name, e);
            }
        }
    }

    Ok((registry, reports))
}

/// Read a required environment variable, failing startup when absent.
pub fn require_env(name: &str) -> Result<String> {
    std::env::var(name)
        .with_context(|| format!("required credential environment variable '{name}' is not set"))
}
