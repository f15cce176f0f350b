//! Dispatcher: resolves a tool call to its backend, materializes the HTTP
//! request, executes it, and normalizes the response.
//!
//! The dispatcher holds no invocation-scoped state; every call is
//! independently replayable.

use crate::registry::{BackendBinding, Registry, RegistryError};
use crate::spec::{HttpMethod, OperationSpec, ParamLocation};
use crate::tools::ToolDefinition;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Fixed backoff before the single transport-failure retry.
const RETRY_BACKOFF: Duration = Duration::from_millis(500);

#[derive(Debug, Error)]
pub enum InvokeError {
    #[error("unknown tool: {tool}")]
    NotFound { tool: String },

    #[error("invalid argument '{field}': {reason}")]
    Validation { field: String, reason: String },

    #[error("backend unavailable for tool '{tool}': {cause}")]
    Unavailable { tool: String, cause: String },

    #[error("backend returned HTTP {status}: {body}")]
    Backend { status: u16, body: String },

    #[error("internal invariant violated: {0}")]
    Internal(String),
}

/// Transport-level failure (connection refused, timeout). The only failure
/// class eligible for retry.
#[derive(Debug, Error)]
#[error("{cause}")]
pub struct TransportError {
    pub cause: String,
    pub timeout: bool,
}

#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

/// A fully materialized request, ready to execute against a binding's base
/// address. Built as a pure function of operation + arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedRequest {
    pub method: HttpMethod,
    /// Path with every placeholder substituted and percent-encoded.
    pub path: String,
    pub query: Vec<(String, String)>,
    /// Header-located arguments, already filtered so they never override
    /// the binding's static headers.
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
}

/// Seam between request materialization and the wire. Production code uses
/// [`ReqwestTransport`]; tests substitute counting stubs.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(
        &self,
        binding: &BackendBinding,
        request: &PreparedRequest,
    ) -> Result<TransportResponse, TransportError>;
}

/// Executes prepared requests over the binding's shared `reqwest` client.
pub struct ReqwestTransport;

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(
        &self,
        binding: &BackendBinding,
        request: &PreparedRequest,
    ) -> Result<TransportResponse, TransportError> {
        let url = format!("{}{}", binding.base_url, request.path);
        let method = match request.method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
        };

        let mut builder = binding.http.request(method, url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        for (name, value) in &binding.static_headers {
            builder = builder.header(name, value);
        }
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| TransportError {
            timeout: e.is_timeout(),
            cause: e.to_string(),
        })?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| TransportError {
            timeout: e.is_timeout(),
            cause: format!("failed to read response body: {e}"),
        })?;

        Ok(TransportResponse { status, body })
    }
}

/// Result of a successful tool invocation.
#[derive(Debug, Clone)]
pub struct InvocationResult {
    /// Response parsed as JSON where possible, else the raw body as a
    /// JSON string.
    pub structured: Value,
    pub raw_body: String,
}

/// The seam the orchestration loop invokes tools through.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn invoke(&self, tool: &str, arguments: &Value) -> Result<InvocationResult, InvokeError>;
}

pub struct Dispatcher {
    registry: Arc<Registry>,
    transport: Arc<dyn Transport>,
}

impl Dispatcher {
    pub fn new(registry: Arc<Registry>, transport: Arc<dyn Transport>) -> Self {
        Self { registry, transport }
    }

    /// Dispatcher wired to the live HTTP transport.
    pub fn over_http(registry: Arc<Registry>) -> Self {
        Self::new(registry, Arc::new(ReqwestTransport))
    }
}

#[async_trait]
impl ToolExecutor for Dispatcher {
    async fn invoke(&self, tool: &str, arguments: &Value) -> Result<InvocationResult, InvokeError> {
        let entry = self.registry.lookup(tool).map_err(|e| match e {
            RegistryError::NotFound { tool } => InvokeError::NotFound { tool },
            other => InvokeError::Internal(other.to_string()),
        })?;

        validate_arguments(&entry.tool, arguments)?;

        let reserved: Vec<String> = entry
            .binding
            .static_headers
            .iter()
            .map(|(name, _)| name.to_ascii_lowercase())
            .collect();
        let request = prepare_request(&entry.operation, arguments, &reserved)?;
        debug!("Dispatching {} {}{}", request.method, entry.binding.base_url, request.path);

        let response = match self.transport.execute(&entry.binding, &request).await {
            Ok(response) => response,
            Err(first) => {
                warn!("Transport failure for '{}', retrying once: {}", tool, first);
                tokio::time::sleep(RETRY_BACKOFF).await;
                self.transport
                    .execute(&entry.binding, &request)
                    .await
                    .map_err(|e| InvokeError::Unavailable {
                        tool: tool.to_string(),
                        cause: e.cause,
                    })?
            }
        };

        if !(200..300).contains(&response.status) {
            return Err(InvokeError::Backend {
                status: response.status,
                body: response.body,
            });
        }

        let structured = serde_json::from_str(&response.body)
            .unwrap_or_else(|_| Value::String(response.body.clone()));
        Ok(InvocationResult {
            structured,
            raw_body: response.body,
        })
    }
}

/// Validate an argument map against a tool's input schema: every required
/// field present, every supplied field declared and of the declared type.
pub fn validate_arguments(tool: &ToolDefinition, arguments: &Value) -> Result<(), InvokeError> {
    let args = arguments.as_object().ok_or_else(|| InvokeError::Validation {
        field: "arguments".into(),
        reason: "arguments must be a JSON object".into(),
    })?;

    let properties = tool
        .input_schema
        .get("properties")
        .and_then(Value::as_object);

    if let Some(required) = tool.input_schema.get("required").and_then(Value::as_array) {
        for field in required.iter().filter_map(Value::as_str) {
            if !args.contains_key(field) {
                return Err(InvokeError::Validation {
                    field: field.to_string(),
                    reason: "required argument is missing".into(),
                });
            }
        }
    }

    for (name, value) in args {
        let Some(schema) = properties.and_then(|p| p.get(name)) else {
            return Err(InvokeError::Validation {
                field: name.clone(),
                reason: "not a declared argument".into(),
            });
        };
        if let Some(expected) = schema.get("type").and_then(Value::as_str) {
            if !type_matches(value, expected) {
                return Err(InvokeError::Validation {
                    field: name.clone(),
                    reason: format!("expected {expected}"),
                });
            }
        }
    }

    Ok(())
}

fn type_matches(value: &Value, expected: &str) -> bool {
    match expected {
        "string" => value.is_string(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        _ => true,
    }
}

/// Materialize the concrete request from an operation and validated
/// arguments. Pure; `reserved_headers` holds the lowercased names of the
/// binding's static headers, which argument headers may never override.
pub fn prepare_request(
    op: &OperationSpec,
    arguments: &Value,
    reserved_headers: &[String],
) -> Result<PreparedRequest, InvokeError> {
    let args = arguments.as_object().cloned().unwrap_or_default();

    let mut path = op.path_template.clone();
    let mut query = Vec::new();
    let mut headers = Vec::new();
    let mut body = Map::new();

    for param in &op.params {
        let Some(value) = args.get(&param.name) else {
            continue;
        };
        match param.location {
            ParamLocation::Path => {
                let encoded = urlencoding::encode(&scalar_text(value)).into_owned();
                path = path.replace(&format!("{{{}}}", param.name), &encoded);
            }
            ParamLocation::Query => query.push((param.name.clone(), scalar_text(value))),
            ParamLocation::Header => {
                if reserved_headers.contains(&param.name.to_ascii_lowercase()) {
                    warn!("Ignoring argument header '{}': reserved by the backend binding", param.name);
                } else {
                    headers.push((param.name.clone(), scalar_text(value)));
                }
            }
            ParamLocation::Body => {
                body.insert(param.name.clone(), value.clone());
            }
        }
    }

    // Compilation guarantees every placeholder has a required path
    // parameter, and validation guarantees required arguments are present.
    if path.contains('{') || path.contains('}') {
        return Err(InvokeError::Internal(format!(
            "unresolved placeholder in path '{path}' for operation '{}'",
            op.id
        )));
    }

    let body = if body.is_empty() && op.request_body.is_none() {
        None
    } else if body.is_empty() {
        op.request_body.as_ref().filter(|b| b.required).map(|_| Value::Object(Map::new()))
    } else {
        Some(Value::Object(body))
    };

    Ok(PreparedRequest {
        method: op.method,
        path,
        query,
        headers,
        body,
    })
}

/// Render a JSON scalar the way it appears on the wire in a path, query,
/// or header position.
fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
