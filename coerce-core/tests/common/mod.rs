//! Scripted transports and response builders shared by integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use coerce_core::protocol::native::{CohereBilledUnits, CohereMeta, GeminiCandidate};
use coerce_core::protocol::{
    AnthropicContent, AnthropicResponse, AnthropicUsage, ChatResponse, ChatStreamChunk,
    CohereResponse, CompletionUsage, FunctionCall, GeminiContent, GeminiFunctionCall, GeminiPart,
    GeminiResponse, GeminiUsage, Message, MessageDelta, ResponseChoice, StreamChoice, ToolCall,
};
use coerce_core::transport::{BlockingTransport, ChunkIter, ChunkStream};
use coerce_core::{ChatRequest, RawResponse, Transport, TransportError};
use coerce_core::protocol::StreamChunk;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Mutex;

/// A person
#[derive(Debug, Clone, PartialEq, Deserialize, JsonSchema)]
pub struct User {
    pub name: String,
    pub age: u32,
}

/// Replays scripted results and records every request it sees
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    responses: Mutex<VecDeque<Result<RawResponse, TransportError>>>,
    chunks: Mutex<Vec<StreamChunk>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedTransport {
    pub fn new(responses: Vec<Result<RawResponse, TransportError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            ..Default::default()
        }
    }

    pub fn streaming(chunks: Vec<StreamChunk>) -> Self {
        Self {
            chunks: Mutex::new(chunks),
            ..Default::default()
        }
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn next(&self, request: &ChatRequest) -> Result<RawResponse, TransportError> {
        self.requests.lock().unwrap().push(request.clone());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::Custom {
                code: "EXHAUSTED".into(),
                message: "script ran out of responses".into(),
            }))
    }

    fn take_chunks(&self, request: &ChatRequest) -> Vec<StreamChunk> {
        self.requests.lock().unwrap().push(request.clone());
        std::mem::take(&mut *self.chunks.lock().unwrap())
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn invoke(&self, request: &ChatRequest) -> Result<RawResponse, TransportError> {
        self.next(request)
    }

    async fn invoke_stream(&self, request: &ChatRequest) -> Result<ChunkStream, TransportError> {
        let chunks = self.take_chunks(request);
        Ok(Box::pin(futures::stream::iter(chunks.into_iter().map(Ok))))
    }
}

impl BlockingTransport for ScriptedTransport {
    fn invoke(&self, request: &ChatRequest) -> Result<RawResponse, TransportError> {
        self.next(request)
    }

    fn invoke_stream(&self, request: &ChatRequest) -> Result<ChunkIter, TransportError> {
        let chunks = self.take_chunks(request);
        Ok(Box::new(chunks.into_iter().map(Ok)))
    }
}

/// Route engine logs to the test harness; honours `RUST_LOG`
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn usage() -> CompletionUsage {
    CompletionUsage::new(10, 5, 15)
}

fn openai(message: Message) -> RawResponse {
    RawResponse::OpenAi(ChatResponse {
        id: "chatcmpl-1".into(),
        model: "gpt-4o".into(),
        choices: vec![ResponseChoice {
            index: 0,
            message,
            finish_reason: Some("stop".into()),
        }],
        usage: Some(usage()),
        ..Default::default()
    })
}

/// An assistant turn calling each `(name, arguments)` tool in order
pub fn tool_calls(calls: &[(&str, &str)]) -> RawResponse {
    let mut message = Message::assistant("");
    message.tool_calls = Some(
        calls
            .iter()
            .enumerate()
            .map(|(i, (name, arguments))| ToolCall {
                id: format!("call_{}", i),
                tool_type: "function".into(),
                function: FunctionCall {
                    name: name.to_string(),
                    arguments: arguments.to_string(),
                },
            })
            .collect(),
    );
    openai(message)
}

pub fn tool_call(name: &str, arguments: &str) -> RawResponse {
    tool_calls(&[(name, arguments)])
}

pub fn text(content: &str) -> RawResponse {
    openai(Message::assistant(content))
}

/// An Anthropic message holding a single `tool_use` block
pub fn anthropic_tool_use(name: &str, input: Value) -> RawResponse {
    RawResponse::Anthropic(AnthropicResponse {
        id: "msg_1".into(),
        model: "claude-3-5-sonnet".into(),
        content: vec![AnthropicContent::ToolUse {
            id: "toolu_1".into(),
            name: name.to_string(),
            input,
        }],
        stop_reason: Some("tool_use".into()),
        usage: Some(AnthropicUsage {
            input_tokens: 10,
            output_tokens: 5,
        }),
        ..Default::default()
    })
}

fn gemini(part: GeminiPart) -> RawResponse {
    RawResponse::Gemini(GeminiResponse {
        candidates: vec![GeminiCandidate {
            content: GeminiContent {
                role: "model".into(),
                parts: vec![part],
            },
            finish_reason: Some("STOP".into()),
        }],
        usage_metadata: Some(GeminiUsage {
            prompt_token_count: 10,
            candidates_token_count: 5,
            total_token_count: 15,
        }),
    })
}

pub fn gemini_text(text: &str) -> RawResponse {
    gemini(GeminiPart::text(text))
}

pub fn gemini_function_call(name: &str, args: Value) -> RawResponse {
    gemini(GeminiPart {
        function_call: Some(GeminiFunctionCall {
            name: name.to_string(),
            args,
        }),
        ..Default::default()
    })
}

pub fn cohere_text(text: &str) -> RawResponse {
    RawResponse::Cohere(CohereResponse {
        text: text.to_string(),
        generation_id: "gen-1".into(),
        meta: Some(CohereMeta {
            billed_units: Some(CohereBilledUnits {
                input_tokens: 10,
                output_tokens: 5,
            }),
        }),
    })
}

/// A content delta chunk
pub fn content_chunk(content: &str) -> StreamChunk {
    StreamChunk::OpenAi(ChatStreamChunk {
        choices: vec![StreamChoice {
            index: 0,
            delta: MessageDelta {
                content: Some(content.to_string()),
                ..Default::default()
            },
            finish_reason: None,
        }],
        ..Default::default()
    })
}

pub fn request() -> ChatRequest {
    ChatRequest::without_model(vec![Message::user("Extract: Jason is 25 years old")])
}
