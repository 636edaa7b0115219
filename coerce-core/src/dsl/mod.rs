//! Response-model variants beyond a single record
//!
//! - [`IterableAdapter`]: many instances of one schema from one response
//! - [`PartialAdapter`]: progressively filled instances from a stream
//! - [`ParallelAdapter`]: heterogeneous tool calls mapped onto a union

pub mod iterable;
pub mod parallel;
pub mod partial;
pub mod partial_json;

pub use iterable::{IterableAdapter, IterableStreamState};
pub use parallel::ParallelAdapter;
pub use partial::{PartialAdapter, PartialStreamState};
pub use partial_json::parse_partial;

use crate::error::CoerceError;
use crate::modes::Mode;
use crate::protocol::{AnthropicDelta, AnthropicStreamEvent, StreamChunk};

/// The slice of structured payload text carried by one stream event
pub fn json_delta(chunk: &StreamChunk, mode: Mode) -> Option<String> {
    match chunk {
        StreamChunk::OpenAi(chunk) => {
            let delta = &chunk.choices.first()?.delta;
            match mode {
                Mode::Functions => delta.function_call.as_ref()?.arguments.clone(),
                Mode::Tools | Mode::MistralTools | Mode::ParallelTools => {
                    let args: String = delta
                        .tool_calls
                        .as_ref()?
                        .iter()
                        .filter_map(|call| call.function.as_ref()?.arguments.as_deref())
                        .collect();
                    (!args.is_empty()).then_some(args)
                }
                _ => delta.content.clone(),
            }
        }
        StreamChunk::Anthropic(AnthropicStreamEvent::ContentBlockDelta { delta, .. }) => {
            match (mode, delta) {
                (Mode::AnthropicTools, AnthropicDelta::InputJsonDelta { partial_json }) => {
                    Some(partial_json.clone())
                }
                (Mode::AnthropicJson, AnthropicDelta::TextDelta { text }) => Some(text.clone()),
                _ => None,
            }
        }
        StreamChunk::Anthropic(_) => None,
        StreamChunk::Gemini(resp) => {
            let parts = &resp.candidates.first()?.content.parts;
            let text: String = if mode == Mode::VertexaiTools {
                parts
                    .iter()
                    .filter_map(|p| p.function_call.as_ref())
                    .map(|call| call.args.to_string())
                    .collect()
            } else {
                parts.iter().filter_map(|p| p.text.as_deref()).collect()
            };
            (!text.is_empty()).then_some(text)
        }
        StreamChunk::Cohere(event) if event.event_type == "text-generation" => event.text.clone(),
        StreamChunk::Cohere(_) => None,
    }
}

/// Where the structured payload starts inside accumulated text
pub(crate) fn payload_start(buffer: &str) -> Option<&str> {
    buffer.find('{').map(|start| &buffer[start..])
}

/// Re-root the field paths of an element's validation error under `prefix`
pub(crate) fn nest_error(err: CoerceError, prefix: &str) -> CoerceError {
    match err {
        CoerceError::Validation(mut e) => {
            for violation in &mut e.violations {
                violation.field_path = format!("{}{}", prefix, violation.field_path);
            }
            CoerceError::Validation(e)
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{
        ChatStreamChunk, FunctionCallDelta, MessageDelta, StreamChoice, ToolCallDelta,
    };

    fn openai_chunk(delta: MessageDelta) -> StreamChunk {
        StreamChunk::OpenAi(ChatStreamChunk {
            choices: vec![StreamChoice {
                index: 0,
                delta,
                finish_reason: None,
            }],
            ..Default::default()
        })
    }

    #[test]
    fn test_tool_call_arguments_are_extracted() {
        let chunk = openai_chunk(MessageDelta {
            tool_calls: Some(vec![ToolCallDelta {
                index: 0,
                id: None,
                function: Some(FunctionCallDelta {
                    name: None,
                    arguments: Some("{\"na".into()),
                }),
            }]),
            ..Default::default()
        });

        assert_eq!(json_delta(&chunk, Mode::Tools).as_deref(), Some("{\"na"));
        assert_eq!(json_delta(&chunk, Mode::Json), None);
    }

    #[test]
    fn test_anthropic_json_delta_requires_matching_mode() {
        let chunk = StreamChunk::Anthropic(AnthropicStreamEvent::ContentBlockDelta {
            index: 0,
            delta: AnthropicDelta::InputJsonDelta {
                partial_json: "{\"a\"".into(),
            },
        });

        assert_eq!(json_delta(&chunk, Mode::AnthropicTools).as_deref(), Some("{\"a\""));
        assert_eq!(json_delta(&chunk, Mode::AnthropicJson), None);
    }

    #[test]
    fn test_payload_start_skips_fence() {
        assert_eq!(payload_start("```json\n{\"a\""), Some("{\"a\""));
        assert_eq!(payload_start("```json\n"), None);
    }
}
