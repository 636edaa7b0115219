//! Cohere chat handler

use super::Target;
use crate::error::CoerceError;
use crate::modes::Mode;
use crate::protocol::{ChatRequest, Message, MessageRole};
use crate::schema::SchemaDoc;
use serde_json::{json, Value};

pub(crate) fn cohere_role(role: MessageRole) -> &'static str {
    match role {
        MessageRole::System => "SYSTEM",
        MessageRole::Assistant => "CHATBOT",
        _ => "USER",
    }
}

pub(crate) fn history_entry(message: &Message) -> Value {
    json!({
        "role": cohere_role(message.role),
        "message": message.text(),
    })
}

fn instruction(doc: &SchemaDoc) -> String {
    format!(
        "Extract a valid {name} object based on the chat history and the json schema below.\n\
         {schema}\n\
         The output must be a valid JSON object that matches the {name} schema above.",
        name = doc.name,
        schema = doc.schema,
    )
}

pub(super) fn cohere_tools(mut request: ChatRequest, target: &Target<'_>) -> Result<ChatRequest, CoerceError> {
    let doc = target.single(Mode::CohereTools)?;
    let history: Vec<Value> = std::mem::take(&mut request.messages)
        .iter()
        .map(history_entry)
        .collect();

    request.extra.insert("message".into(), Value::String(instruction(doc)));
    request.extra.insert("chat_history".into(), Value::Array(history));
    Ok(request)
}
