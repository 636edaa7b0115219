//! Schema adapter
//!
//! A [`SchemaAdapter`] holds a typed record's JSON Schema, the provider
//! declarations derived from it and the validator used to rehydrate a raw
//! response into the record. It is built by composition: the caller's type is
//! never touched.

pub mod extract;
pub mod gemini;
pub mod validate;

pub use extract::{extract_json_from_codeblock, extract_payload};
pub use validate::{CompiledSchema, ValidationContext};

use crate::error::{CoerceError, FieldViolation, ValidationError, ViolationKind};
use crate::modes::Mode;
use crate::protocol::{CompletionUsage, FunctionDefinition, RawResponse, ToolDefinition};
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::marker::PhantomData;
use std::ops::Deref;
use std::sync::Arc;

/// Provider-neutral description of a target schema
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaDoc {
    pub name: String,
    pub description: String,
    /// JSON Schema with nested definitions under `$defs`
    pub schema: Value,
}

impl SchemaDoc {
    pub fn new(name: impl Into<String>, description: Option<String>, mut schema: Value) -> Self {
        let name = name.into();
        if let Value::Object(map) = &mut schema {
            map.remove("$schema");
        }
        let description = description
            .or_else(|| {
                schema
                    .get("description")
                    .and_then(Value::as_str)
                    .map(str::to_string)
            })
            .unwrap_or_else(|| {
                format!(
                    "Correctly extracted `{}` with all the required parameters with correct types",
                    name
                )
            });

        Self {
            name,
            description,
            schema,
        }
    }

    /// Schema rendered for prompt injection
    pub fn pretty(&self) -> String {
        serde_json::to_string_pretty(&self.schema).unwrap_or_else(|_| self.schema.to_string())
    }

    /// Function parameters: the schema minus its own title and description
    fn parameters(&self) -> Value {
        let mut params = self.schema.clone();
        if let Value::Object(map) = &mut params {
            map.remove("title");
            map.remove("description");
        }
        params
    }

    /// OpenAI function declaration
    pub fn openai_function(&self) -> FunctionDefinition {
        FunctionDefinition {
            name: self.name.clone(),
            description: Some(self.description.clone()),
            parameters: Some(self.parameters()),
        }
    }

    /// OpenAI tool declaration
    pub fn openai_tool(&self) -> ToolDefinition {
        ToolDefinition::function(self.openai_function())
    }

    /// Anthropic tool declaration
    pub fn anthropic_tool(&self) -> ToolDefinition {
        ToolDefinition::Anthropic {
            name: self.name.clone(),
            description: self.description.clone(),
            input_schema: self.schema.clone(),
        }
    }

    /// Gemini response/parameter schema
    pub fn gemini_schema(&self) -> Value {
        gemini::to_gemini_schema(&self.schema)
    }

    /// Gemini/Vertex function declaration
    pub fn gemini_function_declaration(&self) -> FunctionDefinition {
        FunctionDefinition {
            name: self.name.clone(),
            description: Some(self.description.clone()),
            parameters: Some(self.gemini_schema()),
        }
    }
}

/// Post-validation hook run against the typed instance
pub type ContextValidator<T> = Arc<dyn Fn(&T, &ValidationContext) -> Result<(), String> + Send + Sync>;

/// A parsed instance annotated with the response it came from
#[derive(Debug, Clone)]
pub struct Structured<T> {
    value: T,
    raw_response: Arc<RawResponse>,
}

impl<T> Structured<T> {
    pub fn new(value: T, raw_response: Arc<RawResponse>) -> Self {
        Self {
            value,
            raw_response,
        }
    }

    pub fn raw_response(&self) -> &RawResponse {
        &self.raw_response
    }

    /// Usage as reported on the attached response (cumulative across attempts)
    pub fn usage(&self) -> Option<CompletionUsage> {
        self.raw_response.usage()
    }

    pub fn into_inner(self) -> T {
        self.value
    }

    pub fn into_parts(self) -> (T, Arc<RawResponse>) {
        (self.value, self.raw_response)
    }
}

impl<T> Deref for Structured<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

/// Wraps a typed record with its schema, declarations and validators
pub struct SchemaAdapter<T> {
    doc: SchemaDoc,
    compiled: CompiledSchema,
    validators: Vec<ContextValidator<T>>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for SchemaAdapter<T> {
    fn clone(&self) -> Self {
        Self {
            doc: self.doc.clone(),
            compiled: self.compiled.clone(),
            validators: self.validators.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for SchemaAdapter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaAdapter")
            .field("name", &self.doc.name)
            .field("validators", &self.validators.len())
            .finish()
    }
}

impl<T: JsonSchema + DeserializeOwned> SchemaAdapter<T> {
    /// Derive the schema from `T`'s `JsonSchema` implementation
    pub fn new() -> Result<Self, CoerceError> {
        let schema = serde_json::to_value(schemars::schema_for!(T)).map_err(|e| {
            CoerceError::precondition(format!("could not render schema: {}", e))
        })?;
        Self::from_schema(T::schema_name(), None, schema)
    }
}

impl<T: DeserializeOwned> SchemaAdapter<T> {
    /// Build from an explicit schema, e.g. one declared at runtime
    pub fn from_schema(
        name: impl Into<String>,
        description: Option<String>,
        schema: Value,
    ) -> Result<Self, CoerceError> {
        let doc = SchemaDoc::new(name, description, schema);
        let compiled = CompiledSchema::compile(doc.name.clone(), &doc.schema)?;

        Ok(Self {
            doc,
            compiled,
            validators: Vec::new(),
            _marker: PhantomData,
        })
    }

    /// Register a validator that sees the caller's validation context
    pub fn with_validator<F>(mut self, validator: F) -> Self
    where
        F: Fn(&T, &ValidationContext) -> Result<(), String> + Send + Sync + 'static,
    {
        self.validators.push(Arc::new(validator));
        self
    }

    pub fn describe(&self) -> &SchemaDoc {
        &self.doc
    }

    pub fn name(&self) -> &str {
        &self.doc.name
    }

    /// Extract, decode and validate the payload for `mode`
    pub fn parse(
        &self,
        raw: Arc<RawResponse>,
        mode: Mode,
        validation_context: Option<&ValidationContext>,
        strict: bool,
    ) -> Result<Structured<T>, CoerceError> {
        let payload = extract_payload(&raw, mode, &self.doc.name)?;
        let value = self.validate_value(payload, validation_context, strict)?;
        Ok(Structured::new(value, raw))
    }

    /// Validate an already-extracted JSON value into `T`
    pub fn validate_value(
        &self,
        mut value: Value,
        validation_context: Option<&ValidationContext>,
        strict: bool,
    ) -> Result<T, CoerceError> {
        self.compiled.check(&mut value, strict)?;

        let instance: T = serde_json::from_value(value).map_err(|e| {
            ValidationError::new(
                self.doc.name.clone(),
                vec![FieldViolation::new("", ViolationKind::Type, e.to_string())],
            )
        })?;

        self.run_validators(&instance, validation_context)?;
        Ok(instance)
    }

    fn run_validators(
        &self,
        instance: &T,
        validation_context: Option<&ValidationContext>,
    ) -> Result<(), ValidationError> {
        if self.validators.is_empty() {
            return Ok(());
        }

        let empty = ValidationContext::new();
        let ctx = validation_context.unwrap_or(&empty);
        let violations: Vec<FieldViolation> = self
            .validators
            .iter()
            .filter_map(|validator| validator(instance, ctx).err())
            .map(|message| FieldViolation::new("", ViolationKind::Custom, message))
            .collect();

        if violations.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::new(self.doc.name.clone(), violations))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ChatResponse, FunctionCall, Message, ResponseChoice, ToolCall};
    use serde::Deserialize;
    use serde_json::json;

    /// A person
    #[derive(Debug, Deserialize, JsonSchema, PartialEq)]
    struct User {
        name: String,
        age: u32,
    }

    fn tool_response(name: &str, arguments: &str) -> Arc<RawResponse> {
        let mut message = Message::assistant("");
        message.tool_calls = Some(vec![ToolCall {
            id: "call_1".into(),
            tool_type: "function".into(),
            function: FunctionCall {
                name: name.into(),
                arguments: arguments.into(),
            },
        }]);
        Arc::new(RawResponse::OpenAi(ChatResponse {
            choices: vec![ResponseChoice {
                index: 0,
                message,
                finish_reason: None,
            }],
            ..Default::default()
        }))
    }

    #[test]
    fn test_describe_uses_doc_comment_and_strips_meta_schema() {
        let adapter = SchemaAdapter::<User>::new().unwrap();
        let doc = adapter.describe();

        assert_eq!(doc.name, "User");
        assert_eq!(doc.description, "A person");
        assert!(doc.schema.get("$schema").is_none());
        let required = doc.schema["required"].as_array().unwrap();
        assert!(required.contains(&json!("name")));
        assert!(required.contains(&json!("age")));
    }

    #[test]
    fn test_default_description() {
        let doc = SchemaDoc::new("Thing", None, json!({"type": "object"}));
        assert_eq!(
            doc.description,
            "Correctly extracted `Thing` with all the required parameters with correct types"
        );
    }

    #[test]
    fn test_openai_function_drops_title() {
        let adapter = SchemaAdapter::<User>::new().unwrap();
        let function = adapter.describe().openai_function();

        assert_eq!(function.name, "User");
        let params = function.parameters.unwrap();
        assert!(params.get("title").is_none());
        assert!(params["properties"].get("age").is_some());
    }

    #[test]
    fn test_parse_tool_call() {
        let adapter = SchemaAdapter::<User>::new().unwrap();
        let parsed = adapter
            .parse(tool_response("User", r#"{"name": "Jason", "age": 25}"#), Mode::Tools, None, false)
            .unwrap();

        assert_eq!(parsed.name, "Jason");
        assert!(matches!(parsed.raw_response(), RawResponse::OpenAi(_)));
    }

    #[test]
    fn test_parse_reports_decode_error() {
        let adapter = SchemaAdapter::<User>::new().unwrap();
        let err = adapter
            .parse(tool_response("User", r#"{"name": "#), Mode::Tools, None, false)
            .unwrap_err();

        assert!(matches!(err, CoerceError::Decode(_)));
    }

    #[test]
    fn test_parse_rejects_wrong_tool_name() {
        let adapter = SchemaAdapter::<User>::new().unwrap();
        let err = adapter
            .parse(tool_response("Other", r#"{"name": "x", "age": 1}"#), Mode::Tools, None, false)
            .unwrap_err();

        assert!(matches!(err, CoerceError::Validation(_)));
    }

    #[test]
    fn test_context_validator_failure_is_validation_error() {
        let adapter = SchemaAdapter::<User>::new()
            .unwrap()
            .with_validator(|user: &User, ctx: &ValidationContext| {
                let banned = ctx.get("banned").and_then(Value::as_str).unwrap_or_default();
                if user.name == banned {
                    Err(format!("name `{}` is not allowed", user.name))
                } else {
                    Ok(())
                }
            });

        let mut ctx = ValidationContext::new();
        ctx.insert("banned".into(), json!("Jason"));
        let err = adapter
            .validate_value(json!({"name": "Jason", "age": 1}), Some(&ctx), false)
            .unwrap_err();

        match err {
            CoerceError::Validation(e) => {
                assert_eq!(e.violations[0].kind, ViolationKind::Custom);
                assert!(e.violations[0].message.contains("not allowed"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
