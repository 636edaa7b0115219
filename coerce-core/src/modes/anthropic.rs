//! Anthropic Messages handlers

use super::messages::{extract_system, merge_consecutive_messages};
use super::Target;
use crate::error::CoerceError;
use crate::modes::Mode;
use crate::protocol::{ChatRequest, ToolChoice};
use crate::schema::SchemaDoc;

fn json_system_text(doc: &SchemaDoc) -> String {
    format!(
        "You must only respond in JSON format that adheres to the following schema:\n\n\
         <JSON_SCHEMA>\n{}\n</JSON_SCHEMA>",
        doc.pretty()
    )
}

pub(super) fn anthropic_tools(mut request: ChatRequest, target: &Target<'_>) -> Result<ChatRequest, CoerceError> {
    let doc = target.single(Mode::AnthropicTools)?;
    let (system, messages) =
        extract_system(request.system.as_deref(), std::mem::take(&mut request.messages))?;

    request.system = system;
    request.messages = messages;
    request.tools = Some(vec![doc.anthropic_tool()]);
    request.tool_choice = Some(ToolChoice::tool(doc.name.clone()));
    Ok(request)
}

pub(super) fn anthropic_json(mut request: ChatRequest, target: &Target<'_>) -> Result<ChatRequest, CoerceError> {
    let doc = target.single(Mode::AnthropicJson)?;
    let (system, messages) =
        extract_system(request.system.as_deref(), std::mem::take(&mut request.messages))?;

    let schema_text = json_system_text(doc);
    request.system = Some(match system {
        Some(existing) if !existing.is_empty() => format!("{}\n\n{}", existing, schema_text),
        _ => schema_text,
    });
    request.messages = merge_consecutive_messages(messages);
    Ok(request)
}
