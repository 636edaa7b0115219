//! Provider-native payloads
//!
//! Responses that do not fit the canonical chat-completion shape are kept in
//! their native form and wrapped in [`RawResponse`], so the parser for each
//! mode can reach exactly the field it needs.

use crate::protocol::types::{ChatResponse, ChatStreamChunk, CompletionUsage, Message};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Anthropic
// ============================================================================

/// Anthropic Messages API response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AnthropicResponse {
    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub model: String,

    #[serde(default = "assistant_role")]
    pub role: String,

    #[serde(default)]
    pub content: Vec<AnthropicContent>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<AnthropicUsage>,
}

fn assistant_role() -> String {
    "assistant".to_string()
}

/// Anthropic content block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnthropicContent {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AnthropicUsage {
    #[serde(default)]
    pub input_tokens: u32,
    #[serde(default)]
    pub output_tokens: u32,
}

/// Anthropic server-sent stream event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnthropicStreamEvent {
    ContentBlockDelta {
        #[serde(default)]
        index: usize,
        delta: AnthropicDelta,
    },
    MessageStop,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnthropicDelta {
    TextDelta { text: String },
    InputJsonDelta { partial_json: String },
    #[serde(other)]
    Other,
}

// ============================================================================
// Gemini / Vertex AI
// ============================================================================

/// Gemini `generateContent` response; also used for each streamed chunk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct GeminiResponse {
    #[serde(default)]
    pub candidates: Vec<GeminiCandidate>,

    #[serde(
        alias = "usageMetadata",
        skip_serializing_if = "Option::is_none"
    )]
    pub usage_metadata: Option<GeminiUsage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct GeminiCandidate {
    #[serde(default)]
    pub content: GeminiContent,

    #[serde(alias = "finishReason", skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

/// A Gemini content entry (`role` is `user` or `model`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct GeminiContent {
    #[serde(default)]
    pub role: String,

    #[serde(default)]
    pub parts: Vec<GeminiPart>,
}

impl GeminiContent {
    pub fn text(role: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            parts: vec![GeminiPart::text(text)],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct GeminiPart {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    #[serde(alias = "functionCall", skip_serializing_if = "Option::is_none")]
    pub function_call: Option<GeminiFunctionCall>,

    #[serde(alias = "functionResponse", skip_serializing_if = "Option::is_none")]
    pub function_response: Option<GeminiFunctionResponse>,
}

impl GeminiPart {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeminiFunctionCall {
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeminiFunctionResponse {
    pub name: String,
    pub response: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct GeminiUsage {
    #[serde(default, alias = "promptTokenCount")]
    pub prompt_token_count: u32,
    #[serde(default, alias = "candidatesTokenCount")]
    pub candidates_token_count: u32,
    #[serde(default, alias = "totalTokenCount")]
    pub total_token_count: u32,
}

// ============================================================================
// Cohere
// ============================================================================

/// Cohere chat response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CohereResponse {
    #[serde(default)]
    pub text: String,

    #[serde(default)]
    pub generation_id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<CohereMeta>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CohereMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub billed_units: Option<CohereBilledUnits>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CohereBilledUnits {
    #[serde(default)]
    pub input_tokens: u32,
    #[serde(default)]
    pub output_tokens: u32,
}

/// Cohere streamed chat event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CohereStreamEvent {
    pub event_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

// ============================================================================
// Raw response and stream chunk wrappers
// ============================================================================

/// Opaque provider payload returned by a transport
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RawResponse {
    OpenAi(ChatResponse),
    Anthropic(AnthropicResponse),
    Gemini(GeminiResponse),
    Cohere(CohereResponse),
}

impl RawResponse {
    /// Token usage, normalized to prompt/completion/total
    pub fn usage(&self) -> Option<CompletionUsage> {
        match self {
            Self::OpenAi(resp) => resp.usage,
            Self::Anthropic(resp) => resp.usage.map(|u| {
                CompletionUsage::new(
                    u.input_tokens,
                    u.output_tokens,
                    u.input_tokens.saturating_add(u.output_tokens),
                )
            }),
            Self::Gemini(resp) => resp.usage_metadata.map(|u| {
                CompletionUsage::new(
                    u.prompt_token_count,
                    u.candidates_token_count,
                    u.total_token_count,
                )
            }),
            Self::Cohere(resp) => resp.meta.and_then(|m| m.billed_units).map(|u| {
                CompletionUsage::new(
                    u.input_tokens,
                    u.output_tokens,
                    u.input_tokens.saturating_add(u.output_tokens),
                )
            }),
        }
    }

    /// Overwrite the usage field in the provider's own vocabulary
    pub fn set_usage(&mut self, usage: CompletionUsage) {
        match self {
            Self::OpenAi(resp) => resp.usage = Some(usage),
            Self::Anthropic(resp) => {
                resp.usage = Some(AnthropicUsage {
                    input_tokens: usage.prompt_tokens,
                    output_tokens: usage.completion_tokens,
                })
            }
            Self::Gemini(resp) => {
                resp.usage_metadata = Some(GeminiUsage {
                    prompt_token_count: usage.prompt_tokens,
                    candidates_token_count: usage.completion_tokens,
                    total_token_count: usage.total_tokens,
                })
            }
            Self::Cohere(resp) => {
                resp.meta = Some(CohereMeta {
                    billed_units: Some(CohereBilledUnits {
                        input_tokens: usage.prompt_tokens,
                        output_tokens: usage.completion_tokens,
                    }),
                })
            }
        }
    }

    /// First candidate message of an OpenAI-shaped response
    pub fn openai_message(&self) -> Option<&Message> {
        match self {
            Self::OpenAi(resp) => resp.choices.first().map(|choice| &choice.message),
            _ => None,
        }
    }

    /// First Gemini candidate content
    pub fn gemini_content(&self) -> Option<&GeminiContent> {
        match self {
            Self::Gemini(resp) => resp.candidates.first().map(|c| &c.content),
            _ => None,
        }
    }

    /// Plain text of the first completion, whatever the provider
    pub fn text(&self) -> Option<String> {
        match self {
            Self::OpenAi(_) => self.openai_message().map(Message::text),
            Self::Anthropic(resp) => {
                let texts: Vec<&str> = resp
                    .content
                    .iter()
                    .filter_map(|block| match block {
                        AnthropicContent::Text { text } => Some(text.as_str()),
                        _ => None,
                    })
                    .collect();
                (!texts.is_empty()).then(|| texts.concat())
            }
            Self::Gemini(_) => self.gemini_content().and_then(|content| {
                let texts: Vec<&str> = content
                    .parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect();
                (!texts.is_empty()).then(|| texts.concat())
            }),
            Self::Cohere(resp) => Some(resp.text.clone()),
        }
    }
}

impl From<ChatResponse> for RawResponse {
    fn from(resp: ChatResponse) -> Self {
        Self::OpenAi(resp)
    }
}

impl From<AnthropicResponse> for RawResponse {
    fn from(resp: AnthropicResponse) -> Self {
        Self::Anthropic(resp)
    }
}

impl From<GeminiResponse> for RawResponse {
    fn from(resp: GeminiResponse) -> Self {
        Self::Gemini(resp)
    }
}

impl From<CohereResponse> for RawResponse {
    fn from(resp: CohereResponse) -> Self {
        Self::Cohere(resp)
    }
}

/// One event of a streamed response
#[derive(Debug, Clone, PartialEq)]
pub enum StreamChunk {
    OpenAi(ChatStreamChunk),
    Anthropic(AnthropicStreamEvent),
    Gemini(GeminiResponse),
    Cohere(CohereStreamEvent),
}
