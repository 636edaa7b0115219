//! Gemini / Vertex AI schema conversion
//!
//! Gemini's schema validator rejects `$ref` and treats properties that carry
//! a `default` as an error unless they are listed as required. Both quirks are
//! handled here and nowhere else; the neutral schema keeps its declared
//! required/optional split.

use serde_json::{json, Map, Value};

/// Convert a neutral schema into Gemini's `{type, properties, required}` form
pub fn to_gemini_schema(schema: &Value) -> Value {
    let inlined = inline_refs(schema, schema, 0);

    let properties = inlined
        .get("properties")
        .cloned()
        .unwrap_or_else(|| Value::Object(Map::new()));

    let mut required: Vec<Value> = inlined
        .get("required")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    if let Value::Object(props) = &properties {
        for (name, prop) in props {
            let listed = required.iter().any(|r| r.as_str() == Some(name.as_str()));
            if prop.get("default").is_some() && !listed {
                required.push(Value::String(name.clone()));
            }
        }
    }

    json!({
        "type": inlined.get("type").cloned().unwrap_or_else(|| json!("object")),
        "properties": properties,
        "required": required,
    })
}

const MAX_DEPTH: usize = 32;

/// Replace every local `$ref` with the referenced definition
fn inline_refs(node: &Value, root: &Value, depth: usize) -> Value {
    if depth > MAX_DEPTH {
        return node.clone();
    }

    match node {
        Value::Object(map) => {
            if let Some(target) = map
                .get("$ref")
                .and_then(Value::as_str)
                .and_then(|r| r.strip_prefix('#'))
                .and_then(|pointer| root.pointer(pointer))
            {
                let mut resolved = inline_refs(target, root, depth + 1);
                // Sibling keywords (description, default) override the target's
                if let Value::Object(resolved_map) = &mut resolved {
                    for (key, value) in map {
                        if key != "$ref" {
                            resolved_map.insert(key.clone(), inline_refs(value, root, depth + 1));
                        }
                    }
                }
                return resolved;
            }

            Value::Object(
                map.iter()
                    .filter(|(key, _)| key.as_str() != "$defs" && key.as_str() != "definitions")
                    .map(|(key, value)| (key.clone(), inline_refs(value, root, depth + 1)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| inline_refs(item, root, depth + 1))
                .collect(),
        ),
        other => other.clone(),
    }
}
