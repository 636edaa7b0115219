//! Mode strategy table
//!
//! Each [`Mode`] maps to one pure handler that rewrites a request so the
//! provider returns the target schema. Dispatch is a plain `match` over the
//! enum; handlers never see each other.

mod anthropic;
pub(crate) mod cohere;
pub mod gemini;
pub mod messages;
pub(crate) mod openai;

pub use gemini::transform_to_gemini_prompt;
pub use messages::merge_consecutive_messages;

use crate::error::CoerceError;
use crate::protocol::ChatRequest;
use crate::schema::SchemaDoc;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Provider protocol variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Functions,
    ParallelTools,
    Tools,
    MistralTools,
    Json,
    MdJson,
    JsonSchema,
    AnthropicTools,
    AnthropicJson,
    CohereTools,
    VertexaiTools,
    VertexaiJson,
    GeminiJson,
}

impl Mode {
    pub const ALL: [Mode; 13] = [
        Mode::Functions,
        Mode::ParallelTools,
        Mode::Tools,
        Mode::MistralTools,
        Mode::Json,
        Mode::MdJson,
        Mode::JsonSchema,
        Mode::AnthropicTools,
        Mode::AnthropicJson,
        Mode::CohereTools,
        Mode::VertexaiTools,
        Mode::VertexaiJson,
        Mode::GeminiJson,
    ];

    /// Name as written in configuration files
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Functions => "functions",
            Self::ParallelTools => "parallel_tools",
            Self::Tools => "tools",
            Self::MistralTools => "mistral_tools",
            Self::Json => "json",
            Self::MdJson => "md_json",
            Self::JsonSchema => "json_schema",
            Self::AnthropicTools => "anthropic_tools",
            Self::AnthropicJson => "anthropic_json",
            Self::CohereTools => "cohere_tools",
            Self::VertexaiTools => "vertexai_tools",
            Self::VertexaiJson => "vertexai_json",
            Self::GeminiJson => "gemini_json",
        }
    }

    /// Modes whose failed attempt must be answered with a tool result
    pub fn needs_tool_failure_marker(&self) -> bool {
        matches!(
            self,
            Self::Tools | Self::MistralTools | Self::ParallelTools | Self::AnthropicTools
        )
    }

    /// Modes whose payload arrives as tool/function call arguments
    pub fn is_tool_mode(&self) -> bool {
        matches!(
            self,
            Self::Functions
                | Self::Tools
                | Self::MistralTools
                | Self::ParallelTools
                | Self::AnthropicTools
                | Self::VertexaiTools
        )
    }

    /// The provider family this mode speaks to
    pub fn provider(&self) -> Provider {
        match self {
            Self::Functions
            | Self::ParallelTools
            | Self::Tools
            | Self::Json
            | Self::MdJson
            | Self::JsonSchema => Provider::OpenAi,
            Self::MistralTools => Provider::Mistral,
            Self::AnthropicTools | Self::AnthropicJson => Provider::Anthropic,
            Self::CohereTools => Provider::Cohere,
            Self::VertexaiTools | Self::VertexaiJson => Provider::VertexAi,
            Self::GeminiJson => Provider::Gemini,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provider family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    OpenAi,
    Anthropic,
    Gemini,
    VertexAi,
    Cohere,
    Mistral,
}

impl Provider {
    /// Native tool-calling mode, used when no mode is requested
    pub fn default_mode(&self) -> Mode {
        match self {
            Self::OpenAi => Mode::Tools,
            Self::Anthropic => Mode::AnthropicTools,
            Self::Gemini => Mode::GeminiJson,
            Self::VertexAi => Mode::VertexaiTools,
            Self::Cohere => Mode::CohereTools,
            Self::Mistral => Mode::MistralTools,
        }
    }

    pub fn supports(&self, mode: Mode) -> bool {
        mode.provider() == *self
    }
}

/// What a handler declares: one schema, or every member of a union
#[derive(Debug, Clone, Copy)]
pub enum Target<'a> {
    One(&'a SchemaDoc),
    AnyOf(&'a [SchemaDoc]),
}

impl<'a> Target<'a> {
    /// The single schema a non-parallel mode needs
    pub fn single(&self, mode: Mode) -> Result<&'a SchemaDoc, CoerceError> {
        match *self {
            Self::One(doc) => Ok(doc),
            Self::AnyOf([doc]) => Ok(doc),
            Self::AnyOf(docs) => Err(CoerceError::precondition(format!(
                "mode {} takes a single schema, got a union of {}",
                mode,
                docs.len()
            ))),
        }
    }

    pub fn docs(&self) -> &'a [SchemaDoc] {
        match *self {
            Self::One(doc) => std::slice::from_ref(doc),
            Self::AnyOf(docs) => docs,
        }
    }
}

/// Signature shared by every mode handler
pub type ModeHandler = fn(ChatRequest, &Target<'_>) -> Result<ChatRequest, CoerceError>;

/// Look up the handler for `mode`
pub fn handler_for(mode: Mode) -> ModeHandler {
    match mode {
        Mode::Functions => openai::functions,
        Mode::ParallelTools => openai::parallel_tools,
        Mode::Tools => openai::tools,
        Mode::MistralTools => openai::mistral_tools,
        Mode::Json => openai::json,
        Mode::MdJson => openai::md_json,
        Mode::JsonSchema => openai::json_schema,
        Mode::AnthropicTools => anthropic::anthropic_tools,
        Mode::AnthropicJson => anthropic::anthropic_json,
        Mode::CohereTools => cohere::cohere_tools,
        Mode::VertexaiTools => gemini::vertexai_tools,
        Mode::VertexaiJson => gemini::vertexai_json,
        Mode::GeminiJson => gemini::gemini_json,
    }
}

/// Transform a copy of `request` for `mode`; the caller's request is untouched
pub fn apply(mode: Mode, request: &ChatRequest, target: Target<'_>) -> Result<ChatRequest, CoerceError> {
    let transformed = handler_for(mode)(request.clone(), &target)?;
    debug!(
        mode = %mode,
        schemas = ?target.docs().iter().map(|d| d.name.as_str()).collect::<Vec<_>>(),
        "transformed request for response model"
    );
    Ok(transformed)
}
