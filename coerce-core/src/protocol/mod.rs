//! Protocol module for LLM request/response structures
//!
//! Canonical (OpenAI-shaped) request and response types, plus the native
//! payloads of providers whose wire format differs.

pub mod native;
pub mod types;

pub use native::{
    AnthropicContent, AnthropicDelta, AnthropicResponse, AnthropicStreamEvent, AnthropicUsage,
    CohereResponse, CohereStreamEvent, GeminiContent, GeminiFunctionCall, GeminiPart,
    GeminiResponse, GeminiUsage, RawResponse, StreamChunk,
};
pub use types::{
    ChatRequest, ChatResponse, ChatStreamChunk, CompletionUsage, ContentPart, FunctionCall,
    FunctionCallDelta, FunctionChoice, FunctionDefinition, JsonSchemaFormat, Message,
    MessageContent, MessageDelta, MessageRole, ResponseChoice, ResponseFormat, StreamChoice,
    StreamOptions, ToolCall, ToolCallDelta, ToolChoice, ToolDefinition,
};

// Re-export common traits for convenience
pub use types::IntoMessage;
