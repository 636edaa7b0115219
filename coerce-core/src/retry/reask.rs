//! Corrective turns appended after a failed attempt
//!
//! Order is always: the failing assistant turn, then a tool-failure marker
//! where the protocol needs one, then the corrective instruction.

use crate::error::ParseFailure;
use crate::modes::cohere::history_entry;
use crate::modes::Mode;
use crate::protocol::{
    AnthropicContent, ChatRequest, ContentPart, GeminiContent, GeminiPart, Message,
    MessageContent, MessageRole, RawResponse,
};
use crate::protocol::native::GeminiFunctionResponse;
use serde_json::{json, Value};
use tracing::warn;

/// Content of the tool result that marks a failed call
pub const TOOL_FAILURE: &str = "failure";

pub fn corrective_text(error: &ParseFailure) -> String {
    format!(
        "Recall the function correctly, fix the errors and exceptions found\n{}",
        error
    )
}

/// Append the corrective turns for `mode` to `request`
pub fn append_reask(request: &mut ChatRequest, mode: Mode, raw: &RawResponse, error: &ParseFailure) {
    match mode {
        Mode::Functions
        | Mode::Tools
        | Mode::MistralTools
        | Mode::ParallelTools
        | Mode::Json
        | Mode::JsonSchema
        | Mode::MdJson => reask_openai(request, mode, raw, error),
        Mode::AnthropicTools | Mode::AnthropicJson => reask_anthropic(request, raw, error),
        Mode::GeminiJson | Mode::VertexaiJson => reask_gemini_text(request, raw, error),
        Mode::VertexaiTools => reask_vertex_tools(request, raw, error),
        Mode::CohereTools => reask_cohere(request, raw, error),
    }
}

/// Assistant text plus any serialized function call, so JSON-only protocols
/// still show the model what it produced
fn dump_message(message: &Message) -> Message {
    let mut content = message.text();
    if let Some(tool_calls) = &message.tool_calls {
        content.push_str(&serde_json::to_string(tool_calls).unwrap_or_default());
    }
    if let Some(function_call) = &message.function_call {
        content.push_str(&serde_json::to_string(function_call).unwrap_or_default());
    }
    Message::assistant(content)
}

fn reask_openai(request: &mut ChatRequest, mode: Mode, raw: &RawResponse, error: &ParseFailure) {
    match raw.openai_message() {
        Some(message) if mode.needs_tool_failure_marker() => {
            let mut assistant = message.clone();
            assistant.role = MessageRole::Assistant;
            request.messages.push(assistant);
            for call in message.tool_calls.iter().flatten() {
                request.messages.push(Message::tool(
                    call.id.clone(),
                    call.function.name.clone(),
                    TOOL_FAILURE,
                ));
            }
        }
        Some(message) => request.messages.push(dump_message(message)),
        None => warn!(mode = %mode, "failed response carried no message to replay"),
    }

    request.messages.push(Message::user(corrective_text(error)));

    if mode == Mode::MdJson {
        request.messages.push(Message::assistant("```json"));
    }
}

fn reask_anthropic(request: &mut ChatRequest, raw: &RawResponse, error: &ParseFailure) {
    let RawResponse::Anthropic(response) = raw else {
        request.messages.push(Message::user(corrective_text(error)));
        return;
    };

    let mut replayed = Vec::with_capacity(response.content.len());
    let mut markers = Vec::new();
    for block in &response.content {
        match block {
            AnthropicContent::Text { text } => replayed.push(ContentPart::Text { text: text.clone() }),
            AnthropicContent::ToolUse { id, name, input } => {
                replayed.push(ContentPart::ToolUse {
                    id: id.clone(),
                    name: name.clone(),
                    input: input.clone(),
                });
                markers.push(ContentPart::ToolResult {
                    tool_use_id: id.clone(),
                    content: TOOL_FAILURE.to_string(),
                    is_error: true,
                });
            }
            _ => {}
        }
    }

    request.messages.push(Message {
        content: MessageContent::Parts(replayed),
        ..Message::assistant("")
    });

    // Anthropic requires alternation, so markers and correction share one user turn
    let mut user_parts = markers;
    user_parts.push(ContentPart::Text {
        text: corrective_text(error),
    });
    request.messages.push(Message {
        content: MessageContent::Parts(user_parts),
        ..Message::user("")
    });
}

fn push_content(request: &mut ChatRequest, content: Value) {
    match request.extra.get_mut("contents") {
        Some(Value::Array(contents)) => contents.push(content),
        _ => {
            request.extra.insert("contents".into(), Value::Array(vec![content]));
        }
    }
}

fn reask_gemini_text(request: &mut ChatRequest, raw: &RawResponse, error: &ParseFailure) {
    let text = raw.text().unwrap_or_default();
    push_content(request, json!(GeminiContent::text("model", text)));
    push_content(request, json!(GeminiContent::text("user", corrective_text(error))));
}

fn reask_vertex_tools(request: &mut ChatRequest, raw: &RawResponse, error: &ParseFailure) {
    let Some(content) = raw.gemini_content() else {
        push_content(request, json!(GeminiContent::text("user", corrective_text(error))));
        return;
    };

    let mut model_turn = content.clone();
    model_turn.role = "model".to_string();
    push_content(request, json!(model_turn));

    let name = content
        .parts
        .iter()
        .find_map(|p| p.function_call.as_ref().map(|c| c.name.clone()))
        .unwrap_or_default();
    let marker = GeminiPart {
        function_response: Some(GeminiFunctionResponse {
            name,
            response: json!({
                "content": format!(
                    "Validation Error found:\n{}\nRecall the function correctly, fix the errors",
                    error
                )
            }),
        }),
        ..Default::default()
    };
    push_content(
        request,
        json!(GeminiContent {
            role: "user".to_string(),
            parts: vec![marker],
        }),
    );
}

fn reask_cohere(request: &mut ChatRequest, raw: &RawResponse, error: &ParseFailure) {
    let previous = request
        .extra
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let reply = raw.text().unwrap_or_default();

    let entries = [
        history_entry(&Message::user(previous)),
        history_entry(&Message::assistant(reply)),
    ];
    match request.extra.get_mut("chat_history") {
        Some(Value::Array(history)) => history.extend(entries),
        _ => {
            request
                .extra
                .insert("chat_history".into(), Value::Array(entries.to_vec()));
        }
    }

    request
        .extra
        .insert("message".into(), Value::String(corrective_text(error)));
}
