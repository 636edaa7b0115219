//! Gemini and Vertex AI handlers
//!
//! Both protocols take `contents` instead of `messages`, so after these
//! handlers run the canonical message list is empty and the conversation
//! lives in `extra["contents"]`.

use super::messages::{inject_instruction, json_instruction};
use super::Target;
use crate::error::CoerceError;
use crate::modes::Mode;
use crate::protocol::{ChatRequest, GeminiContent, GeminiPart, Message, MessageRole, ToolDefinition};
use serde_json::{json, Map, Value};
use tracing::debug;

const SAFETY_DEFAULTS: [(&str, &str); 3] = [
    ("HARM_CATEGORY_HATE_SPEECH", "BLOCK_ONLY_HIGH"),
    ("HARM_CATEGORY_HARASSMENT", "BLOCK_ONLY_HIGH"),
    ("HARM_CATEGORY_DANGEROUS_CONTENT", "BLOCK_ONLY_HIGH"),
];

/// Convert chat messages to Gemini contents
///
/// System texts, joined with blank lines, become an emphasized leading part
/// of the first turn; assistant turns are renamed `model`.
pub fn transform_to_gemini_prompt(messages: &[Message]) -> Vec<GeminiContent> {
    let mut system_texts: Vec<String> = Vec::new();
    let mut contents = Vec::with_capacity(messages.len());

    for message in messages {
        match message.role {
            MessageRole::System => system_texts.push(message.text()),
            MessageRole::Assistant => contents.push(GeminiContent::text("model", message.text())),
            _ => contents.push(GeminiContent::text("user", message.text())),
        }
    }

    system_texts.retain(|s| !s.is_empty());
    if !system_texts.is_empty() {
        let system = system_texts.join("\n\n");
        let part = GeminiPart::text(format!("*{}*", system));
        match contents.first_mut() {
            Some(first) => first.parts.insert(0, part),
            None => contents.push(GeminiContent {
                role: "user".to_string(),
                parts: vec![part],
            }),
        }
    }

    contents
}

/// Edit the object stored under `key`, replacing any non-object value
fn update_object(extra: &mut Map<String, Value>, key: &str, f: impl FnOnce(&mut Map<String, Value>)) {
    let mut map = match extra.remove(key) {
        Some(Value::Object(map)) => map,
        _ => Map::new(),
    };
    f(&mut map);
    extra.insert(key.to_string(), Value::Object(map));
}

/// Move explicitly-set sampling parameters into `generation_config`
fn move_sampling_params(request: &mut ChatRequest) {
    let mut moved = Map::new();
    if let Some(v) = request.max_tokens.take() {
        moved.insert("max_output_tokens".into(), json!(v));
    }
    if let Some(v) = request.temperature.take() {
        moved.insert("temperature".into(), json!(v));
    }
    if let Some(v) = request.n.take() {
        moved.insert("candidate_count".into(), json!(v));
    }
    if let Some(v) = request.top_p.take() {
        moved.insert("top_p".into(), json!(v));
    }
    if let Some(v) = request.stop.take() {
        moved.insert("stop_sequences".into(), json!(v));
    }

    if !moved.is_empty() {
        debug!(params = ?moved.keys().collect::<Vec<_>>(), "moved sampling params into generation_config");
    }
    update_object(&mut request.extra, "generation_config", |config| config.extend(moved));
}

fn set_contents(request: &mut ChatRequest) -> Result<(), CoerceError> {
    let contents = transform_to_gemini_prompt(&std::mem::take(&mut request.messages));
    let contents = serde_json::to_value(contents)
        .map_err(|e| CoerceError::precondition(format!("could not encode contents: {}", e)))?;
    request.extra.insert("contents".into(), contents);
    Ok(())
}

pub(super) fn gemini_json(mut request: ChatRequest, target: &Target<'_>) -> Result<ChatRequest, CoerceError> {
    let doc = target.single(Mode::GeminiJson)?;
    if request.model.is_some() {
        return Err(CoerceError::precondition(
            "Gemini `model` must be bound to the client, not passed as a request parameter",
        ));
    }

    inject_instruction(&mut request.messages, &json_instruction(doc));

    update_object(&mut request.extra, "generation_config", |config| {
        config.insert("response_mime_type".into(), json!("application/json"));
    });
    move_sampling_params(&mut request);
    set_contents(&mut request)?;

    update_object(&mut request.extra, "safety_settings", |safety| {
        for (category, threshold) in SAFETY_DEFAULTS {
            safety
                .entry(category.to_string())
                .or_insert_with(|| json!(threshold));
        }
    });

    Ok(request)
}

pub(super) fn vertexai_tools(mut request: ChatRequest, target: &Target<'_>) -> Result<ChatRequest, CoerceError> {
    let doc = target.single(Mode::VertexaiTools)?;
    set_contents(&mut request)?;
    move_sampling_params(&mut request);

    request.tools = Some(vec![ToolDefinition::Gemini {
        function_declarations: vec![doc.gemini_function_declaration()],
    }]);
    request.extra.insert(
        "tool_config".into(),
        json!({"function_calling_config": {"mode": "ANY"}}),
    );
    Ok(request)
}

pub(super) fn vertexai_json(mut request: ChatRequest, target: &Target<'_>) -> Result<ChatRequest, CoerceError> {
    let doc = target.single(Mode::VertexaiJson)?;
    set_contents(&mut request)?;
    move_sampling_params(&mut request);

    let response_schema = doc.gemini_schema();
    update_object(&mut request.extra, "generation_config", |config| {
        config.insert("response_mime_type".into(), json!("application/json"));
        config.insert("response_schema".into(), response_schema);
    });
    Ok(request)
}
