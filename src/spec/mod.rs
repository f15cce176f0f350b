//! Specification compiler: OpenAPI document -> ordered `OperationSpec` list.
//!
//! Compilation is pure — it never performs network I/O and has no side
//! effects beyond producing the list. Every internal reference must resolve
//! before any operation is extracted, so a broken document can never leave a
//! backend partially mounted.

pub mod resolver;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;

/// Errors that abort compilation of one specification document.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("failed to parse specification document: {0}")]
    Parse(String),

    #[error("dangling reference: {pointer}")]
    DanglingReference { pointer: String },

    #[error("circular reference: {pointer}")]
    CircularReference { pointer: String },

    #[error("duplicate operation id: {operation_id}")]
    DuplicateOperation { operation_id: String },

    #[error("operation '{operation_id}': argument name '{name}' is claimed by more than one parameter location")]
    AmbiguousParameter { operation_id: String, name: String },

    #[error("invalid specification: {reason}")]
    Invalid { reason: String },
}

/// HTTP methods a path item may declare operations under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    /// All method keys recognized under a path item, in extraction order.
    const ALL: [HttpMethod; 5] = [
        HttpMethod::Get,
        HttpMethod::Post,
        HttpMethod::Put,
        HttpMethod::Patch,
        HttpMethod::Delete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }

    fn key(&self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Post => "post",
            Self::Put => "put",
            Self::Patch => "patch",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Where an argument is placed when the request is materialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamLocation {
    Path,
    Query,
    Header,
    Body,
}

impl fmt::Display for ParamLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path => write!(f, "path"),
            Self::Query => write!(f, "query"),
            Self::Header => write!(f, "header"),
            Self::Body => write!(f, "body"),
        }
    }
}

/// One declared parameter of an operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    pub location: ParamLocation,
    pub required: bool,
    /// Value schema as declared (defaults to a plain string schema).
    pub schema: Value,
    pub description: Option<String>,
}

/// JSON request body declared by an operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BodySpec {
    pub required: bool,
    pub schema: Value,
}

/// One API operation extracted from a specification. Immutable after
/// compilation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationSpec {
    pub id: String,
    pub method: HttpMethod,
    pub path_template: String,
    /// Parameters in specification order; body properties are appended as
    /// `Body`-located entries after the declared parameters.
    pub params: Vec<ParamSpec>,
    pub request_body: Option<BodySpec>,
    pub description: String,
}

/// Compile one specification document (YAML or JSON text) into an ordered
/// list of operations.
pub fn compile(text: &str) -> Result<Vec<OperationSpec>, CompileError> {
    let raw: Value =
        serde_yaml::from_str(text).map_err(|e| CompileError::Parse(e.to_string()))?;
    let doc = resolver::resolve_refs(&raw)?;

    let paths = doc
        .get("paths")
        .and_then(Value::as_object)
        .ok_or_else(|| CompileError::Invalid {
            reason: "document has no 'paths' object".into(),
        })?;

    let mut operations = Vec::new();
    let mut seen_ids = HashSet::new();

    for (path_template, item) in paths {
        let item = item.as_object().ok_or_else(|| CompileError::Invalid {
            reason: format!("path item '{path_template}' is not an object"),
        })?;

        // Parameters shared by every operation under this path.
        let shared_params = match item.get("parameters") {
            Some(list) => extract_params(path_template, list)?,
            None => Vec::new(),
        };

        for method in HttpMethod::ALL {
            let Some(op) = item.get(method.key()) else {
                continue;
            };
            let operation = extract_operation(path_template, method, op, &shared_params)?;
            if !seen_ids.insert(operation.id.clone()) {
                return Err(CompileError::DuplicateOperation {
                    operation_id: operation.id,
                });
            }
            operations.push(operation);
        }
    }

    Ok(operations)
}

fn extract_operation(
    path_template: &str,
    method: HttpMethod,
    op: &Value,
    shared_params: &[ParamSpec],
) -> Result<OperationSpec, CompileError> {
    let id = match op.get("operationId").and_then(Value::as_str) {
        Some(id) => id.to_string(),
        None => derive_operation_id(method, path_template),
    };

    let description = op
        .get("description")
        .or_else(|| op.get("summary"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    // Shared path-item parameters come first; an operation-level parameter
    // with the same (name, location) replaces the shared one in place.
    let mut params = shared_params.to_vec();
    if let Some(list) = op.get("parameters") {
        for param in extract_params(&id, list)? {
            match params
                .iter_mut()
                .find(|p| p.name == param.name && p.location == param.location)
            {
                Some(existing) => *existing = param,
                None => params.push(param),
            }
        }
    }

    let request_body = extract_body(&id, op)?;
    if let Some(body) = &request_body {
        append_body_params(&mut params, body);
    }

    check_path_coverage(&id, path_template, &params)?;

    Ok(OperationSpec {
        id,
        method,
        path_template: path_template.to_string(),
        params,
        request_body,
        description,
    })
}

fn extract_params(context: &str, list: &Value) -> Result<Vec<ParamSpec>, CompileError> {
    let list = list.as_array().ok_or_else(|| CompileError::Invalid {
        reason: format!("'{context}': parameters is not an array"),
    })?;

    let mut params = Vec::with_capacity(list.len());
    for entry in list {
        let name = entry
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| CompileError::Invalid {
                reason: format!("'{context}': parameter without a name"),
            })?
            .to_string();

        let location = match entry.get("in").and_then(Value::as_str) {
            Some("path") => ParamLocation::Path,
            Some("query") => ParamLocation::Query,
            Some("header") => ParamLocation::Header,
            Some(other) => {
                return Err(CompileError::Invalid {
                    reason: format!("'{context}': parameter '{name}' has unsupported location '{other}'"),
                })
            }
            None => {
                return Err(CompileError::Invalid {
                    reason: format!("'{context}': parameter '{name}' has no location"),
                })
            }
        };

        let required = entry.get("required").and_then(Value::as_bool).unwrap_or(false);
        if location == ParamLocation::Path && !required {
            return Err(CompileError::Invalid {
                reason: format!("'{context}': path parameter '{name}' must be required"),
            });
        }

        params.push(ParamSpec {
            name,
            location,
            required,
            schema: entry
                .get("schema")
                .cloned()
                .unwrap_or_else(|| json!({ "type": "string" })),
            description: entry
                .get("description")
                .and_then(Value::as_str)
                .map(str::to_string),
        });
    }
    Ok(params)
}

fn extract_body(operation_id: &str, op: &Value) -> Result<Option<BodySpec>, CompileError> {
    let Some(body) = op.get("requestBody") else {
        return Ok(None);
    };
    let schema = body
        .pointer("/content/application~1json/schema")
        .ok_or_else(|| CompileError::Invalid {
            reason: format!("operation '{operation_id}': request body has no application/json schema"),
        })?;
    Ok(Some(BodySpec {
        required: body.get("required").and_then(Value::as_bool).unwrap_or(false),
        schema: schema.clone(),
    }))
}

/// Flatten the body schema's top-level properties into `Body`-located
/// parameters so they share the tool's single argument namespace.
fn append_body_params(params: &mut Vec<ParamSpec>, body: &BodySpec) {
    let Some(properties) = body.schema.get("properties").and_then(Value::as_object) else {
        return;
    };
    let required_fields: HashSet<&str> = body
        .schema
        .get("required")
        .and_then(Value::as_array)
        .map(|list| list.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    for (name, schema) in properties {
        params.push(ParamSpec {
            name: name.clone(),
            location: ParamLocation::Body,
            required: body.required && required_fields.contains(name.as_str()),
            schema: schema.clone(),
            description: schema
                .get("description")
                .and_then(Value::as_str)
                .map(str::to_string),
        });
    }
}

/// Every `{placeholder}` in the template must be covered by a path
/// parameter, so substitution at dispatch time is total.
fn check_path_coverage(
    operation_id: &str,
    path_template: &str,
    params: &[ParamSpec],
) -> Result<(), CompileError> {
    for placeholder in placeholders(path_template) {
        let covered = params
            .iter()
            .any(|p| p.location == ParamLocation::Path && p.name == placeholder);
        if !covered {
            return Err(CompileError::Invalid {
                reason: format!(
                    "operation '{operation_id}': path placeholder '{{{placeholder}}}' has no matching path parameter"
                ),
            });
        }
    }
    Ok(())
}

fn placeholders(template: &str) -> Vec<&str> {
    let mut found = Vec::new();
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        let Some(len) = rest[start + 1..].find('}') else {
            break;
        };
        found.push(&rest[start + 1..start + 1 + len]);
        rest = &rest[start + 1 + len + 1..];
    }
    found
}

fn derive_operation_id(method: HttpMethod, path_template: &str) -> String {
    let mut id = method.key().to_string();
    for segment in path_template.split('/') {
        if segment.is_empty() {
            continue;
        }
        id.push('_');
        id.push_str(segment.trim_start_matches('{').trim_end_matches('}'));
    }
    id
}
