//! Progressive instances from a streamed response

use super::{json_delta, payload_start, partial_json::parse_partial};
use crate::error::{CoerceError, ValidationError};
use crate::modes::Mode;
use crate::protocol::StreamChunk;
use crate::schema::extract::decode;
use crate::schema::validate::coerce_scalars;
use crate::schema::{extract_json_from_codeblock, SchemaAdapter, SchemaDoc, ValidationContext};
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

/// Streams snapshots of `T` with unseen fields defaulted
#[derive(Debug)]
pub struct PartialAdapter<T> {
    inner: SchemaAdapter<T>,
    literal: bool,
}

impl<T> Clone for PartialAdapter<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            literal: self.literal,
        }
    }
}

impl<T: JsonSchema + DeserializeOwned> PartialAdapter<T> {
    pub fn new() -> Result<Self, CoerceError> {
        Ok(Self::from_adapter(SchemaAdapter::new()?))
    }
}

impl<T: DeserializeOwned> PartialAdapter<T> {
    pub fn from_adapter(inner: SchemaAdapter<T>) -> Self {
        Self {
            inner,
            literal: false,
        }
    }

    /// Suppress snapshots identical to the previous one
    pub fn literal(mut self, literal: bool) -> Self {
        self.literal = literal;
        self
    }

    pub fn describe(&self) -> &SchemaDoc {
        self.inner.describe()
    }

    pub fn inner(&self) -> &SchemaAdapter<T> {
        &self.inner
    }

    /// Deserialize an incomplete value, filling unseen fields with empty values
    pub fn snapshot(&self, value: &Value) -> Option<T> {
        let schema = &self.inner.describe().schema;
        let mut filled = value.clone();
        coerce_scalars(&mut filled, schema, schema);
        fill_defaults(&mut filled, schema, schema, 0);
        serde_json::from_value(filled).ok()
    }

    /// Fresh per-call stream state
    pub fn stream_state(
        &self,
        mode: Mode,
        validation_context: Option<ValidationContext>,
        strict: bool,
    ) -> PartialStreamState<T> {
        PartialStreamState {
            adapter: self.clone(),
            mode,
            validation_context,
            strict,
            buffer: String::new(),
            last: None,
            finished: false,
        }
    }
}

/// Accumulates stream deltas for one call
#[derive(Debug)]
pub struct PartialStreamState<T> {
    adapter: PartialAdapter<T>,
    mode: Mode,
    validation_context: Option<ValidationContext>,
    strict: bool,
    buffer: String,
    last: Option<Value>,
    finished: bool,
}

impl<T: DeserializeOwned> PartialStreamState<T> {
    pub fn push(&mut self, chunk: &StreamChunk) -> Option<T> {
        let delta = json_delta(chunk, self.mode)?;
        self.push_text(&delta)
    }

    /// Append raw payload text and return the new snapshot, if any
    pub fn push_text(&mut self, delta: &str) -> Option<T> {
        if self.finished {
            return None;
        }
        self.buffer.push_str(delta);

        let value = parse_partial(payload_start(&self.buffer)?).ok()??;
        if self.adapter.literal && self.last.as_ref() == Some(&value) {
            return None;
        }
        let snapshot = self.adapter.snapshot(&value)?;
        self.last = Some(value);
        Some(snapshot)
    }

    /// Fully validate the complete payload; `None` once already finished or
    /// when literal mode finds nothing new
    pub fn finish(&mut self) -> Option<Result<T, CoerceError>> {
        if self.finished {
            return None;
        }
        self.finished = true;

        let name = self.adapter.describe().name.clone();
        if payload_start(&self.buffer).is_none() {
            return Some(Err(ValidationError::payload(name, "stream ended without a JSON payload").into()));
        }

        let value = match decode(extract_json_from_codeblock(&self.buffer)) {
            Ok(value) => value,
            Err(e) => return Some(Err(e.into())),
        };
        if self.adapter.literal && self.last.as_ref() == Some(&value) {
            // Still validate so an invalid final payload surfaces
            return match self.adapter.inner.validate_value(value, self.validation_context.as_ref(), self.strict) {
                Ok(_) => None,
                Err(e) => Some(Err(e)),
            };
        }
        Some(
            self.adapter
                .inner
                .validate_value(value, self.validation_context.as_ref(), self.strict),
        )
    }
}

const MAX_DEPTH: usize = 32;

fn resolve<'a>(schema: &'a Value, root: &'a Value) -> &'a Value {
    schema
        .get("$ref")
        .and_then(Value::as_str)
        .and_then(|r| r.strip_prefix('#'))
        .and_then(|pointer| root.pointer(pointer))
        .unwrap_or(schema)
}

fn is_nullable(schema: &Value) -> bool {
    let type_null = match schema.get("type") {
        Some(Value::Array(types)) => types.iter().any(|t| t == "null"),
        Some(Value::String(t)) => t == "null",
        _ => false,
    };
    let branch_null = ["anyOf", "oneOf"].iter().any(|key| {
        schema
            .get(*key)
            .and_then(Value::as_array)
            .is_some_and(|branches| branches.iter().any(|b| b.get("type").is_some_and(|t| t == "null")))
    });
    type_null || branch_null
}

/// The empty value for a schema: its default, null when nullable, else a
/// type-appropriate zero
fn empty_value(schema: &Value, root: &Value, depth: usize) -> Option<Value> {
    let schema = resolve(schema, root);
    if let Some(default) = schema.get("default") {
        return Some(default.clone());
    }
    if is_nullable(schema) {
        return Some(Value::Null);
    }

    let ty = match schema.get("type") {
        Some(Value::String(t)) => t.as_str(),
        _ => return None,
    };
    match ty {
        "string" => Some(Value::String(String::new())),
        "integer" | "number" => Some(Value::from(0)),
        "boolean" => Some(Value::Bool(false)),
        "array" => Some(Value::Array(Vec::new())),
        "object" => {
            let mut obj = Value::Object(Map::new());
            fill_defaults(&mut obj, schema, root, depth + 1);
            Some(obj)
        }
        _ => None,
    }
}

fn fill_defaults(instance: &mut Value, schema: &Value, root: &Value, depth: usize) {
    if depth > MAX_DEPTH {
        return;
    }
    let schema = resolve(schema, root);

    match instance {
        Value::Object(map) => {
            let Some(Value::Object(props)) = schema.get("properties") else {
                return;
            };
            for (key, prop_schema) in props {
                match map.get_mut(key) {
                    Some(child) => fill_defaults(child, prop_schema, root, depth + 1),
                    None => {
                        if let Some(empty) = empty_value(prop_schema, root, depth + 1) {
                            map.insert(key.clone(), empty);
                        }
                    }
                }
            }
        }
        Value::Array(items) => {
            if let Some(item_schema) = schema.get("items") {
                for item in items.iter_mut() {
                    fill_defaults(item, item_schema, root, depth + 1);
                }
            }
        }
        _ => {}
    }
}
