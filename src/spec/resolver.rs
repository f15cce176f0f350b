//! Internal `$ref` resolution for specification documents.
//!
//! Produces a fully dereferenced copy of the document. Every reference must
//! point inside the same document; external references and pointers to
//! nowhere fail resolution before any operation is extracted.

use super::CompileError;
use serde_json::Value;

/// Resolve all `$ref` pointers in `doc`, returning a dereferenced copy.
pub fn resolve_refs(doc: &Value) -> Result<Value, CompileError> {
    let mut stack = Vec::new();
    resolve_node(doc, doc, &mut stack)
}

fn resolve_node(node: &Value, root: &Value, stack: &mut Vec<String>) -> Result<Value, CompileError> {
    match node {
        Value::Object(map) => {
            if let Some(reference) = map.get("$ref") {
                let reference = reference.as_str().ok_or_else(|| CompileError::Invalid {
                    reason: "$ref value is not a string".into(),
                })?;
                return resolve_reference(reference, root, stack);
            }
            let mut resolved = serde_json::Map::with_capacity(map.len());
            for (key, value) in map {
                resolved.insert(key.clone(), resolve_node(value, root, stack)?);
            }
            Ok(Value::Object(resolved))
        }
        Value::Array(items) => {
            let mut resolved = Vec::with_capacity(items.len());
            for item in items {
                resolved.push(resolve_node(item, root, stack)?);
            }
            Ok(Value::Array(resolved))
        }
        other => Ok(other.clone()),
    }
}

fn resolve_reference(
    reference: &str,
    root: &Value,
    stack: &mut Vec<String>,
) -> Result<Value, CompileError> {
    let pointer = reference.strip_prefix('#').ok_or_else(|| CompileError::Invalid {
        reason: format!("external reference not supported: {reference}"),
    })?;

    if stack.iter().any(|seen| seen == reference) {
        return Err(CompileError::CircularReference {
            pointer: reference.to_string(),
        });
    }

    let target = root
        .pointer(pointer)
        .ok_or_else(|| CompileError::DanglingReference {
            pointer: reference.to_string(),
        })?;

    stack.push(reference.to_string());
    let resolved = resolve_node(target, root, stack)?;
    stack.pop();
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn resolves_nested_references() {
        let doc = json!({
            "components": {
                "schemas": {
                    "Amount": { "type": "string" },
                    "Totals": {
                        "type": "object",
                        "properties": { "sum": { "$ref": "#/components/schemas/Amount" } }
                    }
                }
            },
            "paths": { "item": { "$ref": "#/components/schemas/Totals" } }
        });

        let resolved = resolve_refs(&doc).unwrap();
        assert_eq!(
            resolved["paths"]["item"]["properties"]["sum"],
            json!({ "type": "string" })
        );
    }

    #[test]
    fn reports_dangling_pointer() {
        let doc = json!({ "paths": { "item": { "$ref": "#/components/schemas/Missing" } } });
        let err = resolve_refs(&doc).unwrap_err();
        match err {
            CompileError::DanglingReference { pointer } => {
                assert_eq!(pointer, "#/components/schemas/Missing");
            }
            other => panic!("expected DanglingReference, got {other:?}"),
        }
    }

    #[test]
    fn reports_reference_cycle() {
        let doc = json!({
            "components": { "schemas": {
                "A": { "$ref": "#/components/schemas/B" },
                "B": { "$ref": "#/components/schemas/A" }
            }},
            "paths": { "item": { "$ref": "#/components/schemas/A" } }
        });
        assert!(matches!(
            resolve_refs(&doc).unwrap_err(),
            CompileError::CircularReference { .. }
        ));
    }

    #[test]
    fn rejects_external_reference() {
        let doc = json!({ "paths": { "item": { "$ref": "other.yaml#/Thing" } } });
        assert!(matches!(resolve_refs(&doc).unwrap_err(), CompileError::Invalid { .. }));
    }
}
