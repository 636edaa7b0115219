//! Conversation rewriting shared by the mode handlers

use crate::error::CoerceError;
use crate::protocol::{ContentPart, Message, MessageContent, MessageRole};
use crate::schema::SchemaDoc;

/// Instruction used by the prompt-based JSON modes
pub fn json_instruction(doc: &SchemaDoc) -> String {
    format!(
        "As a genius expert, your task is to understand the content and provide\n\
         the parsed objects in json that match the following json_schema:\n\n\
         {}\n\n\
         Make sure to return an instance of the JSON, not the schema itself",
        doc.pretty()
    )
}

/// Put `instruction` in the leading system message, creating one if needed
pub fn inject_instruction(messages: &mut Vec<Message>, instruction: &str) {
    match messages.first_mut() {
        Some(first) if first.role == MessageRole::System => append_text(first, instruction),
        _ => messages.insert(0, Message::system(instruction)),
    }
}

fn append_text(message: &mut Message, text: &str) {
    match &mut message.content {
        MessageContent::Text(existing) => {
            existing.push_str("\n\n");
            existing.push_str(text);
        }
        MessageContent::Parts(parts) => parts.push(ContentPart::Text {
            text: text.to_string(),
        }),
    }
}

/// Merge runs of same-role messages; messages carrying call metadata are kept
/// as they are
pub fn merge_consecutive_messages(messages: Vec<Message>) -> Vec<Message> {
    let mut merged: Vec<Message> = Vec::with_capacity(messages.len());

    for message in messages {
        match merged.last_mut() {
            Some(last)
                if last.role == message.role
                    && !last.has_call_metadata()
                    && !message.has_call_metadata() =>
            {
                let content = std::mem::take(&mut last.content);
                last.content = merge_content(content, message.content);
            }
            _ => merged.push(message),
        }
    }

    merged
}

fn merge_content(left: MessageContent, right: MessageContent) -> MessageContent {
    match (left, right) {
        (MessageContent::Text(a), MessageContent::Text(b)) => {
            MessageContent::Text(format!("{}\n\n{}", a, b))
        }
        (left, right) => {
            let mut parts = left.into_parts();
            parts.extend(right.into_parts());
            MessageContent::Parts(parts)
        }
    }
}

/// Pull every system message out of the list, joined with blank lines
///
/// Fails when a top-level system string is already present and the list
/// also carries system messages.
pub fn extract_system(
    system: Option<&str>,
    messages: Vec<Message>,
) -> Result<(Option<String>, Vec<Message>), CoerceError> {
    let (system_messages, rest): (Vec<Message>, Vec<Message>) = messages
        .into_iter()
        .partition(|m| m.role == MessageRole::System);

    if system.is_some() && !system_messages.is_empty() {
        return Err(CoerceError::precondition(
            "Only a single system message is supported - either set it as a message in the messages array or use the system parameter",
        ));
    }

    let joined = system.map(str::to_string).or_else(|| {
        (!system_messages.is_empty()).then(|| {
            system_messages
                .iter()
                .map(Message::text)
                .collect::<Vec<_>>()
                .join("\n\n")
        })
    });

    Ok((joined, rest))
}
