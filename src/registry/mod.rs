//! Namespace registry: merges tool sets from independently compiled
//! backends into one addressable namespace.
//!
//! Registration is append-only and happens at startup, before any session
//! runs; afterwards the registry is shared immutably across sessions.

use crate::spec::OperationSpec;
use crate::tools::ToolDefinition;
use anyhow::{Context, Result};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("tool '{tool}' is already registered by backend '{existing_binding}' (rejected batch from '{new_binding}')")]
    ToolCollision {
        tool: String,
        existing_binding: String,
        new_binding: String,
    },

    #[error("unknown tool: {tool}")]
    NotFound { tool: String },
}

/// A mounted backend: base address, static authorization headers, and the
/// HTTP client every tool bound to it dispatches through. Shared read-only
/// across invocations.
#[derive(Debug)]
pub struct BackendBinding {
    pub id: String,
    pub base_url: String,
    pub static_headers: Vec<(String, String)>,
    pub http: reqwest::Client,
}

impl BackendBinding {
    pub fn new(
        id: &str,
        base_url: &str,
        static_headers: Vec<(String, String)>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .with_context(|| format!("Failed to build HTTP client for backend '{id}'"))?;
        Ok(Self {
            id: id.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            static_headers,
            http,
        })
    }
}

/// One registry entry: the tool, the operation it was compiled from, and
/// the binding its calls route to. A tool name, once bound, is never
/// rebound to a different backend.
#[derive(Debug, Clone)]
pub struct RegisteredTool {
    pub tool: ToolDefinition,
    pub operation: OperationSpec,
    pub binding: Arc<BackendBinding>,
}

/// Tool name -> (definition, operation, binding), in registration order.
#[derive(Debug, Default)]
pub struct Registry {
    entries: Vec<RegisteredTool>,
    by_name: HashMap<String, usize>,
    catalogue: Vec<ToolDefinition>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one backend's compiled tool set. All-or-nothing: a name
    /// collision (with an earlier backend or within the batch) rejects the
    /// entire batch and leaves the registry untouched.
    pub fn register(
        &mut self,
        binding: Arc<BackendBinding>,
        batch: Vec<(ToolDefinition, OperationSpec)>,
    ) -> Result<(), RegistryError> {
        let mut incoming: HashSet<&str> = HashSet::with_capacity(batch.len());
        for (tool, _) in &batch {
            if let Some(index) = self.by_name.get(&tool.name) {
                return Err(RegistryError::ToolCollision {
                    tool: tool.name.clone(),
                    existing_binding: self.entries[*index].binding.id.clone(),
                    new_binding: binding.id.clone(),
                });
            }
            if !incoming.insert(&tool.name) {
                return Err(RegistryError::ToolCollision {
                    tool: tool.name.clone(),
                    existing_binding: binding.id.clone(),
                    new_binding: binding.id.clone(),
                });
            }
        }

        for (tool, operation) in batch {
            self.by_name.insert(tool.name.clone(), self.entries.len());
            self.catalogue.push(tool.clone());
            self.entries.push(RegisteredTool {
                tool,
                operation,
                binding: binding.clone(),
            });
        }
        info!("Registered backend '{}' ({} tools total)", binding.id, self.entries.len());
        Ok(())
    }

    pub fn lookup(&self, tool: &str) -> Result<&RegisteredTool, RegistryError> {
        self.by_name
            .get(tool)
            .map(|index| &self.entries[*index])
            .ok_or_else(|| RegistryError::NotFound {
                tool: tool.to_string(),
            })
    }

    /// Tool catalogue in registration order, stable across calls.
    pub fn list(&self) -> &[ToolDefinition] {
        &self.catalogue
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::HttpMethod;
    use serde_json::json;

    fn binding(id: &str) -> Arc<BackendBinding> {
        Arc::new(BackendBinding::new(id, "https://example.com", vec![], Duration::from_secs(5)).unwrap())
    }

    fn entry(name: &str) -> (ToolDefinition, OperationSpec) {
        (
            ToolDefinition {
                name: name.into(),
                description: String::new(),
                input_schema: json!({ "type": "object", "properties": {}, "required": [] }),
            },
            OperationSpec {
                id: name.into(),
                method: HttpMethod::Get,
                path_template: format!("/{name}"),
                params: vec![],
                request_body: None,
                description: String::new(),
            },
        )
    }

    #[test]
    fn colliding_batch_is_rejected_atomically() {
        let mut registry = Registry::new();
        registry
            .register(binding("ledger"), vec![entry("get_info"), entry("get_totals")])
            .unwrap();

        let err = registry
            .register(binding("quotes"), vec![entry("get_prices"), entry("get_info")])
            .unwrap_err();
        match err {
            RegistryError::ToolCollision { tool, existing_binding, new_binding } => {
                assert_eq!(tool, "get_info");
                assert_eq!(existing_binding, "ledger");
                assert_eq!(new_binding, "quotes");
            }
            other => panic!("expected ToolCollision, got {other:?}"),
        }

        // Nothing from the rejected batch is visible, the first batch is intact.
        assert_eq!(registry.len(), 2);
        assert!(registry.lookup("get_prices").is_err());
        assert_eq!(registry.lookup("get_info").unwrap().binding.id, "ledger");
        assert_eq!(registry.lookup("get_totals").unwrap().binding.id, "ledger");
    }

    #[test]
    fn list_preserves_registration_order() {
        let mut registry = Registry::new();
        registry
            .register(binding("a"), vec![entry("zeta"), entry("alpha")])
            .unwrap();
        registry.register(binding("b"), vec![entry("mid")]).unwrap();

        let names: Vec<_> = registry.list().iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["zeta", "alpha", "mid"]);
        // Stable across calls.
        let again: Vec<_> = registry.list().iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, again);
    }

    #[test]
    fn lookup_unknown_tool_is_not_found() {
        let registry = Registry::new();
        assert!(matches!(
            registry.lookup("missing").unwrap_err(),
            RegistryError::NotFound { .. }
        ));
    }
}
