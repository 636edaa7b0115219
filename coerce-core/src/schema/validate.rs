//! JSON Schema validation and lax scalar coercion

use crate::error::{CoerceError, FieldViolation, ValidationError, ViolationKind};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

/// Caller-supplied values made available to context validators
pub type ValidationContext = Map<String, Value>;

/// A JSON Schema compiled once and reused for every attempt
#[derive(Clone)]
pub struct CompiledSchema {
    name: String,
    schema: Value,
    validator: Arc<jsonschema::Validator>,
}

impl fmt::Debug for CompiledSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledSchema")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl CompiledSchema {
    pub fn compile(name: impl Into<String>, schema: &Value) -> Result<Self, CoerceError> {
        let name = name.into();
        let validator = jsonschema::validator_for(schema).map_err(|e| {
            CoerceError::precondition(format!("Invalid JSON Schema for {}: {}", name, e))
        })?;

        Ok(Self {
            name,
            schema: schema.clone(),
            validator: Arc::new(validator),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Validate `instance`, coercing string-encoded scalars first unless strict
    pub fn check(&self, instance: &mut Value, strict: bool) -> Result<(), ValidationError> {
        if !strict {
            coerce_scalars(instance, &self.schema, &self.schema);
        }

        let violations: Vec<FieldViolation> = self
            .validator
            .iter_errors(instance)
            .map(|err| {
                FieldViolation::new(err.instance_path.to_string(), ViolationKind::Schema, err.to_string())
            })
            .collect();

        if violations.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::new(self.name.clone(), violations))
        }
    }
}

/// Follow a local `$ref` (`#/$defs/X` or `#/definitions/X`) against the root
fn resolve<'a>(schema: &'a Value, root: &'a Value) -> &'a Value {
    let mut current = schema;
    // Bounded so a self-referential alias cannot loop forever
    for _ in 0..32 {
        let Some(reference) = current.get("$ref").and_then(Value::as_str) else {
            return current;
        };
        let Some(pointer) = reference.strip_prefix('#') else {
            return current;
        };
        match root.pointer(pointer) {
            Some(target) => current = target,
            None => return current,
        }
    }
    current
}

fn declared_types(schema: &Value) -> Vec<&str> {
    match schema.get("type") {
        Some(Value::String(t)) => vec![t.as_str()],
        Some(Value::Array(ts)) => ts.iter().filter_map(Value::as_str).collect(),
        _ => Vec::new(),
    }
}

/// Rewrite string-encoded numbers and booleans where the schema asks for them
pub(crate) fn coerce_scalars(instance: &mut Value, schema: &Value, root: &Value) {
    let schema = resolve(schema, root);

    for key in ["anyOf", "oneOf", "allOf"] {
        if let Some(Value::Array(branches)) = schema.get(key) {
            for branch in branches {
                coerce_scalars(instance, branch, root);
            }
        }
    }

    match instance {
        Value::String(s) => {
            let types = declared_types(schema);
            if types.contains(&"string") {
                return;
            }
            let trimmed = s.trim();
            if types.contains(&"integer") {
                if let Ok(n) = trimmed.parse::<i64>() {
                    *instance = Value::from(n);
                    return;
                }
            }
            if types.contains(&"number") {
                if let Some(n) = trimmed.parse::<f64>().ok().and_then(serde_json::Number::from_f64) {
                    *instance = Value::Number(n);
                    return;
                }
            }
            if types.contains(&"boolean") {
                match trimmed.to_ascii_lowercase().as_str() {
                    "true" => *instance = Value::Bool(true),
                    "false" => *instance = Value::Bool(false),
                    _ => {}
                }
            }
        }
        Value::Object(map) => {
            if let Some(Value::Object(props)) = schema.get("properties") {
                for (key, prop_schema) in props {
                    if let Some(child) = map.get_mut(key) {
                        coerce_scalars(child, prop_schema, root);
                    }
                }
            }
        }
        Value::Array(items) => {
            if let Some(item_schema) = schema.get("items") {
                for item in items.iter_mut() {
                    coerce_scalars(item, item_schema, root);
                }
            }
        }
        _ => {}
    }
}
