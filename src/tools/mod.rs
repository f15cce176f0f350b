//! Tool schema builder: `OperationSpec` -> model-facing `ToolDefinition`.

use crate::spec::{CompileError, OperationSpec, ParamLocation};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashMap;

/// Definition of a tool exposed to the model, in the shape the tool-call
/// interface expects: name, description, and a JSON Schema for arguments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// Derive the tool name for an operation. Deterministic and total: the same
/// operation always produces the same name, so two independent compilations
/// of one spec compare equal for collision detection.
pub fn tool_name(op: &OperationSpec) -> String {
    let mut name = String::with_capacity(op.id.len());
    let mut last_was_separator = true;
    for ch in op.id.chars() {
        if ch.is_ascii_alphanumeric() {
            name.push(ch.to_ascii_lowercase());
            last_was_separator = false;
        } else if !last_was_separator {
            name.push('_');
            last_was_separator = true;
        }
    }
    while name.ends_with('_') {
        name.pop();
    }
    if name.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        name.insert(0, '_');
    }
    name
}

/// Build the tool definition for one operation, flattening path, query,
/// header, and body parameters into a single argument namespace.
pub fn build_tool(op: &OperationSpec) -> Result<ToolDefinition, CompileError> {
    let mut properties = Map::with_capacity(op.params.len());
    let mut required = Vec::new();
    let mut locations: HashMap<&str, ParamLocation> = HashMap::new();

    for param in &op.params {
        if locations.insert(&param.name, param.location).is_some() {
            // Same name in two locations: the dispatcher could not decide
            // where to place the value.
            return Err(CompileError::AmbiguousParameter {
                operation_id: op.id.clone(),
                name: param.name.clone(),
            });
        }

        let mut schema = param.schema.clone();
        if let (Value::Object(obj), Some(text)) = (&mut schema, &param.description) {
            obj.entry("description").or_insert_with(|| json!(text));
        }
        properties.insert(param.name.clone(), schema);

        if param.required {
            required.push(Value::String(param.name.clone()));
        }
    }

    Ok(ToolDefinition {
        name: tool_name(op),
        description: op.description.clone(),
        input_schema: json!({
            "type": "object",
            "properties": properties,
            "required": required,
        }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::{HttpMethod, ParamSpec};

    fn operation(id: &str, params: Vec<ParamSpec>) -> OperationSpec {
        OperationSpec {
            id: id.to_string(),
            method: HttpMethod::Get,
            path_template: "/quotes".into(),
            params,
            request_body: None,
            description: "Latest quotes.".into(),
        }
    }

    fn param(name: &str, location: ParamLocation, required: bool) -> ParamSpec {
        ParamSpec {
            name: name.into(),
            location,
            required,
            schema: json!({ "type": "string" }),
            description: None,
        }
    }

    #[test]
    fn name_derivation_is_deterministic_and_sanitized() {
        let op = operation("Get-Latest.Crypto Quotes", vec![]);
        assert_eq!(tool_name(&op), "get_latest_crypto_quotes");
        assert_eq!(tool_name(&op), tool_name(&op.clone()));

        let numeric = operation("2fa_status", vec![]);
        assert_eq!(tool_name(&numeric), "_2fa_status");
    }

    #[test]
    fn required_fields_match_required_parameters_exactly() {
        let op = operation(
            "get_quotes",
            vec![
                param("symbol", ParamLocation::Query, true),
                param("convert", ParamLocation::Query, false),
                param("trace", ParamLocation::Header, false),
            ],
        );
        let tool = build_tool(&op).unwrap();

        assert_eq!(tool.input_schema["required"], json!(["symbol"]));
        assert!(tool.input_schema["properties"].get("convert").is_some());
        assert!(tool.input_schema["properties"].get("trace").is_some());
        assert_eq!(tool.description, "Latest quotes.");
    }

    #[test]
    fn cross_location_name_collision_is_rejected() {
        let op = operation(
            "get_quotes",
            vec![
                param("symbol", ParamLocation::Query, true),
                param("symbol", ParamLocation::Body, false),
            ],
        );
        match build_tool(&op).unwrap_err() {
            CompileError::AmbiguousParameter { operation_id, name } => {
                assert_eq!(operation_id, "get_quotes");
                assert_eq!(name, "symbol");
            }
            other => panic!("expected AmbiguousParameter, got {other:?}"),
        }
    }

    #[test]
    fn description_defaults_to_empty() {
        let mut op = operation("get_quotes", vec![]);
        op.description = String::new();
        let tool = build_tool(&op).unwrap();
        assert_eq!(tool.description, "");
    }
}
