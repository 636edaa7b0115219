//! Locating the structured payload inside a raw response

use crate::error::{CoerceError, DecodeError, ValidationError};
use crate::modes::Mode;
use crate::protocol::{AnthropicContent, RawResponse};
use serde_json::Value;

/// Slice from the first `{` to the last `}`; the whole text when absent
pub fn extract_json_from_codeblock(content: &str) -> &str {
    match (content.find('{'), content.rfind('}')) {
        (Some(start), Some(end)) if start <= end => &content[start..=end],
        _ => content.trim(),
    }
}

pub(crate) fn decode(text: &str) -> Result<Value, DecodeError> {
    serde_json::from_str(text).map_err(|e| DecodeError::new(e.to_string(), text))
}

fn mismatch(mode: Mode, raw: &RawResponse) -> CoerceError {
    let provider = match raw {
        RawResponse::OpenAi(_) => "OpenAI",
        RawResponse::Anthropic(_) => "Anthropic",
        RawResponse::Gemini(_) => "Gemini",
        RawResponse::Cohere(_) => "Cohere",
    };
    CoerceError::precondition(format!(
        "mode {} cannot parse a {} response",
        mode, provider
    ))
}

fn text_of(raw: &RawResponse, name: &str) -> Result<String, CoerceError> {
    raw.text()
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| ValidationError::payload(name, "response has no text content").into())
}

/// Every tool/function call in the response as `(name, arguments)`
pub(crate) fn tool_calls(raw: &RawResponse, mode: Mode) -> Result<Vec<(String, Value)>, CoerceError> {
    match (mode, raw) {
        (Mode::Functions, RawResponse::OpenAi(_)) => Ok(raw
            .openai_message()
            .and_then(|m| m.function_call.as_ref())
            .map(|call| -> Result<_, CoerceError> {
                Ok(vec![(call.name.clone(), decode(&call.arguments)?)])
            })
            .transpose()?
            .unwrap_or_default()),
        (Mode::Tools | Mode::MistralTools | Mode::ParallelTools, RawResponse::OpenAi(_)) => raw
            .openai_message()
            .and_then(|m| m.tool_calls.as_ref())
            .map(|calls| {
                calls
                    .iter()
                    .map(|call| -> Result<(String, Value), CoerceError> {
                        Ok((call.function.name.clone(), decode(&call.function.arguments)?))
                    })
                    .collect()
            })
            .unwrap_or_else(|| Ok(Vec::new())),
        (Mode::AnthropicTools, RawResponse::Anthropic(resp)) => Ok(resp
            .content
            .iter()
            .filter_map(|block| match block {
                AnthropicContent::ToolUse { name, input, .. } => Some((name.clone(), input.clone())),
                _ => None,
            })
            .collect()),
        (Mode::VertexaiTools, RawResponse::Gemini(_)) => Ok(raw
            .gemini_content()
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|p| p.function_call.as_ref())
                    .map(|call| (call.name.clone(), call.args.clone()))
                    .collect()
            })
            .unwrap_or_default()),
        _ => Err(mismatch(mode, raw)),
    }
}

/// The single JSON payload a mode expects for the schema named `name`
pub fn extract_payload(raw: &RawResponse, mode: Mode, name: &str) -> Result<Value, CoerceError> {
    match mode {
        Mode::Functions
        | Mode::Tools
        | Mode::MistralTools
        | Mode::AnthropicTools
        | Mode::VertexaiTools => {
            let mut calls = tool_calls(raw, mode)?;
            if calls.len() != 1 {
                return Err(ValidationError::payload(
                    name,
                    format!("expected exactly one call to `{}`, got {}", name, calls.len()),
                )
                .into());
            }
            let (called, args) = calls.remove(0);
            // Vertex forces ANY, so the name is not checked there
            if called != name && mode != Mode::VertexaiTools {
                return Err(ValidationError::payload(
                    name,
                    format!("expected a call to `{}`, got `{}`", name, called),
                )
                .into());
            }
            Ok(args)
        }
        Mode::Json | Mode::JsonSchema => match raw {
            RawResponse::OpenAi(_) => Ok(decode(&text_of(raw, name)?)?),
            _ => Err(mismatch(mode, raw)),
        },
        Mode::MdJson => match raw {
            RawResponse::OpenAi(_) => Ok(decode(extract_json_from_codeblock(&text_of(raw, name)?))?),
            _ => Err(mismatch(mode, raw)),
        },
        Mode::AnthropicJson => match raw {
            RawResponse::Anthropic(_) => {
                Ok(decode(extract_json_from_codeblock(&text_of(raw, name)?))?)
            }
            _ => Err(mismatch(mode, raw)),
        },
        Mode::GeminiJson | Mode::VertexaiJson => match raw {
            RawResponse::Gemini(_) => Ok(decode(extract_json_from_codeblock(&text_of(raw, name)?))?),
            _ => Err(mismatch(mode, raw)),
        },
        Mode::CohereTools => match raw {
            RawResponse::Cohere(_) => Ok(decode(extract_json_from_codeblock(&text_of(raw, name)?))?),
            _ => Err(mismatch(mode, raw)),
        },
        Mode::ParallelTools => Err(CoerceError::precondition(
            "PARALLEL_TOOLS responses are parsed by a parallel response model",
        )),
    }
}
