//! Many instances of one schema from a single response

use super::{json_delta, nest_error, payload_start, partial_json::parse_partial};
use crate::error::{CoerceError, ValidationError};
use crate::modes::Mode;
use crate::protocol::{RawResponse, StreamChunk};
use crate::schema::extract::{decode, tool_calls};
use crate::schema::{
    extract_json_from_codeblock, extract_payload, CompiledSchema, SchemaAdapter, SchemaDoc, Structured,
    ValidationContext,
};
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::debug;

/// Field of the wrapper record that carries the elements
const TASKS: &str = "tasks";

/// Declares `Iterable{Name}` with a `tasks` array and yields every element
#[derive(Debug)]
pub struct IterableAdapter<T> {
    element: SchemaAdapter<T>,
    wrapper: SchemaDoc,
    compiled: CompiledSchema,
}

impl<T> Clone for IterableAdapter<T> {
    fn clone(&self) -> Self {
        Self {
            element: self.element.clone(),
            wrapper: self.wrapper.clone(),
            compiled: self.compiled.clone(),
        }
    }
}

impl<T: JsonSchema + DeserializeOwned> IterableAdapter<T> {
    pub fn new() -> Result<Self, CoerceError> {
        Self::from_element(SchemaAdapter::new()?)
    }
}

/// Wrapper schema referencing the element through `$defs`
fn wrapper_schema(element: &SchemaDoc) -> Value {
    let mut element_schema = element.schema.clone();
    let mut defs = match element_schema.as_object_mut().and_then(|m| m.remove("$defs")) {
        Some(Value::Object(defs)) => defs,
        _ => Map::new(),
    };
    defs.insert(element.name.clone(), element_schema);

    json!({
        "type": "object",
        "title": format!("Iterable{}", element.name),
        "properties": {
            TASKS: {
                "type": "array",
                "items": {"$ref": format!("#/$defs/{}", element.name)}
            }
        },
        "required": [TASKS],
        "$defs": defs,
    })
}

impl<T: DeserializeOwned> IterableAdapter<T> {
    pub fn from_element(element: SchemaAdapter<T>) -> Result<Self, CoerceError> {
        let doc = element.describe();
        let wrapper = SchemaDoc::new(
            format!("Iterable{}", doc.name),
            Some(format!("Correct segmentation of `{}` tasks", doc.name)),
            wrapper_schema(doc),
        );
        let compiled = CompiledSchema::compile(wrapper.name.clone(), &wrapper.schema)?;

        Ok(Self {
            element,
            wrapper,
            compiled,
        })
    }

    /// The declared wrapper schema
    pub fn describe(&self) -> &SchemaDoc {
        &self.wrapper
    }

    pub fn element(&self) -> &SchemaAdapter<T> {
        &self.element
    }

    pub fn parse(
        &self,
        raw: Arc<RawResponse>,
        mode: Mode,
        validation_context: Option<&ValidationContext>,
        strict: bool,
    ) -> Result<Structured<Vec<T>>, CoerceError> {
        if mode.is_tool_mode() {
            let mut calls = tool_calls(&raw, mode)?;
            let element_name = self.element.name();
            // Models often answer with one call per element instead of the wrapper
            if !calls.is_empty() && calls.iter().all(|(name, _)| name == element_name) {
                debug!(count = calls.len(), element = element_name, "parsing one element per call");
                let items = calls
                    .into_iter()
                    .enumerate()
                    .map(|(i, (_, args))| {
                        self.element
                            .validate_value(args, validation_context, strict)
                            .map_err(|e| nest_error(e, &format!("/{}", i)))
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                return Ok(Structured::new(items, raw));
            }
            if mode == Mode::ParallelTools {
                let args = match calls.pop() {
                    Some((name, args)) if calls.is_empty() && name == self.wrapper.name => args,
                    _ => {
                        return Err(ValidationError::payload(
                            self.wrapper.name.clone(),
                            format!("expected calls to `{}` or one call to `{}`", element_name, self.wrapper.name),
                        )
                        .into())
                    }
                };
                let items = self.elements(args, validation_context, strict)?;
                return Ok(Structured::new(items, raw));
            }
        }

        let payload = extract_payload(&raw, mode, &self.wrapper.name)?;
        let items = self.elements(payload, validation_context, strict)?;
        Ok(Structured::new(items, raw))
    }

    /// Validate a full wrapper value into its elements
    pub fn elements(
        &self,
        mut value: Value,
        validation_context: Option<&ValidationContext>,
        strict: bool,
    ) -> Result<Vec<T>, CoerceError> {
        self.compiled.check(&mut value, strict)?;
        let tasks = match value.get_mut(TASKS).map(Value::take) {
            Some(Value::Array(tasks)) => tasks,
            _ => {
                return Err(ValidationError::payload(self.wrapper.name.clone(), "`tasks` is not an array").into())
            }
        };

        tasks
            .into_iter()
            .enumerate()
            .map(|(i, task)| self.validate_task(i, task, validation_context, strict))
            .collect()
    }

    fn validate_task(
        &self,
        index: usize,
        task: Value,
        validation_context: Option<&ValidationContext>,
        strict: bool,
    ) -> Result<T, CoerceError> {
        self.element
            .validate_value(task, validation_context, strict)
            .map_err(|e| nest_error(e, &format!("/{}/{}", TASKS, index)))
    }

    /// Fresh per-call stream state
    pub fn stream_state(
        &self,
        mode: Mode,
        validation_context: Option<ValidationContext>,
        strict: bool,
    ) -> IterableStreamState<T> {
        IterableStreamState {
            adapter: self.clone(),
            mode,
            validation_context,
            strict,
            buffer: String::new(),
            emitted: 0,
            finished: false,
        }
    }
}

/// Emits each element once the stream has moved past it
#[derive(Debug)]
pub struct IterableStreamState<T> {
    adapter: IterableAdapter<T>,
    mode: Mode,
    validation_context: Option<ValidationContext>,
    strict: bool,
    buffer: String,
    emitted: usize,
    finished: bool,
}

impl<T: DeserializeOwned> IterableStreamState<T> {
    pub fn push(&mut self, chunk: &StreamChunk) -> Vec<Result<T, CoerceError>> {
        match json_delta(chunk, self.mode) {
            Some(delta) => self.push_text(&delta),
            None => Vec::new(),
        }
    }

    /// Append raw payload text and return the elements completed by it
    pub fn push_text(&mut self, delta: &str) -> Vec<Result<T, CoerceError>> {
        if self.finished {
            return Vec::new();
        }
        self.buffer.push_str(delta);

        let Some(Ok(Some(mut value))) = payload_start(&self.buffer).map(parse_partial) else {
            return Vec::new();
        };
        let tasks = match value.get_mut(TASKS).map(Value::take) {
            Some(Value::Array(tasks)) => tasks,
            _ => return Vec::new(),
        };

        // The last element may still be growing
        let ready = tasks.len().saturating_sub(1);
        self.emit(tasks, ready)
    }

    /// Decode the complete payload and return the elements not yet emitted
    pub fn finish(&mut self) -> Vec<Result<T, CoerceError>> {
        if self.finished {
            return Vec::new();
        }
        self.finished = true;

        let mut value = match decode(extract_json_from_codeblock(&self.buffer)) {
            Ok(value) => value,
            Err(e) => return vec![Err(e.into())],
        };
        match value.get_mut(TASKS).map(Value::take) {
            Some(Value::Array(tasks)) => {
                let total = tasks.len();
                self.emit(tasks, total)
            }
            _ => vec![Err(ValidationError::payload(
                self.adapter.wrapper.name.clone(),
                "`tasks` is not an array",
            )
            .into())],
        }
    }

    fn emit(&mut self, tasks: Vec<Value>, ready: usize) -> Vec<Result<T, CoerceError>> {
        let start = self.emitted;
        if ready <= start {
            return Vec::new();
        }
        self.emitted = ready;

        tasks
            .into_iter()
            .enumerate()
            .skip(start)
            .take(ready - start)
            .map(|(i, task)| {
                self.adapter
                    .validate_task(i, task, self.validation_context.as_ref(), self.strict)
            })
            .collect()
    }
}
