//! OpenAI-compatible HTTP transport using reqwest

use super::error::map_http_error;
use crate::config::{SecretString, TransportConfig};
use crate::protocol::{ChatRequest, ChatResponse, ChatStreamChunk, RawResponse, StreamChunk};
use crate::transport::{ChunkStream, Transport, TransportError};
use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use reqwest::{Client, ClientBuilder, Response};
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Maximum accepted response body
const MAX_RESPONSE_SIZE: usize = 10 * 1024 * 1024;

const USER_AGENT: &str = concat!("coerce/", env!("CARGO_PKG_VERSION"));

/// Posts canonical requests to `{base_url}/chat/completions`
#[derive(Debug, Clone)]
pub struct OpenAiHttpTransport {
    client: Client,
    base_url: String,
    api_key: Option<SecretString>,
    max_response_size: usize,
}

impl OpenAiHttpTransport {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<SecretString>,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let client = ClientBuilder::new()
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .connect_timeout(Duration::from_secs(10))
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .gzip(true)
            .build()
            .map_err(|e| TransportError::Custom {
                code: "CLIENT_BUILD".to_string(),
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            max_response_size: MAX_RESPONSE_SIZE,
        })
    }

    pub fn from_config(config: &TransportConfig) -> Result<Self, TransportError> {
        Self::new(
            config.base_url.clone(),
            config.api_key.clone(),
            Duration::from_millis(config.timeout_ms),
        )
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    async fn send(&self, request: &ChatRequest, request_id: Uuid) -> Result<Response, TransportError> {
        let url = self.endpoint();
        debug!(url = %url, request_id = %request_id, "sending chat request");

        let mut builder = self
            .client
            .post(&url)
            .json(request)
            .header("X-Request-ID", request_id.to_string());
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key.expose_secret());
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                warn!(request_id = %request_id, "request timed out");
                TransportError::Timeout
            } else if e.is_connect() {
                error!(request_id = %request_id, error = %e, "connection failed");
                TransportError::Network {
                    message: format!("Connection failed: {} [request_id: {}]", e, request_id),
                }
            } else {
                error!(request_id = %request_id, error = %e, "request failed");
                TransportError::Network {
                    message: format!("{} [request_id: {}]", e, request_id),
                }
            }
        })?;

        let status = response.status();
        debug!(status = %status, request_id = %request_id, "response status");

        if !status.is_success() {
            let headers = response.headers().clone();
            let body = response.text().await.ok();
            warn!(status = %status, request_id = %request_id, "request rejected");
            return Err(map_http_error(status, Some(&headers), body, request_id));
        }

        Ok(response)
    }

    fn check_content_length(&self, response: &Response, request_id: Uuid) -> Result<(), TransportError> {
        match response.content_length() {
            Some(len) if len as usize > self.max_response_size => Err(too_large(len as usize, self.max_response_size, request_id)),
            _ => Ok(()),
        }
    }
}

fn too_large(size: usize, max: usize, request_id: Uuid) -> TransportError {
    TransportError::Custom {
        code: "RESPONSE_TOO_LARGE".to_string(),
        message: format!(
            "Response size {} exceeds maximum {} [request_id: {}]",
            size, max, request_id
        ),
    }
}

#[async_trait]
impl Transport for OpenAiHttpTransport {
    async fn invoke(&self, request: &ChatRequest) -> Result<RawResponse, TransportError> {
        let request_id = Uuid::new_v4();
        info!(request_id = %request_id, model = ?request.model, "executing chat completion");

        let response = self.send(request, request_id).await?;

        if let Some(content_type) = response.headers().get(reqwest::header::CONTENT_TYPE) {
            let content_type = content_type.to_str().unwrap_or_default().to_lowercase();
            if !content_type.contains("application/json") {
                return Err(TransportError::MalformedResponse {
                    message: format!("Expected application/json, got: {} [request_id: {}]", content_type, request_id),
                });
            }
        }
        self.check_content_length(&response, request_id)?;

        let text = response.text().await.map_err(|e| TransportError::Network {
            message: format!("Failed to read response body: {} [request_id: {}]", e, request_id),
        })?;
        if text.len() > self.max_response_size {
            return Err(too_large(text.len(), self.max_response_size, request_id));
        }

        let parsed: ChatResponse = serde_json::from_str(&text).map_err(|e| {
            error!(request_id = %request_id, error = %e, "failed to parse response");
            TransportError::MalformedResponse {
                message: format!("Invalid response format: {} [request_id: {}]", e, request_id),
            }
        })?;

        info!(request_id = %request_id, "chat completion finished");
        Ok(RawResponse::OpenAi(parsed))
    }

    async fn invoke_stream(&self, request: &ChatRequest) -> Result<ChunkStream, TransportError> {
        let request_id = Uuid::new_v4();
        info!(request_id = %request_id, model = ?request.model, "executing streamed chat completion");

        let mut streamed = request.clone();
        streamed.stream = Some(true);
        let response = self.send(&streamed, request_id).await?;

        let events = response.bytes_stream().eventsource();
        Ok(Box::pin(events.filter_map(move |result| async move {
            match result {
                // The last event is "data: [DONE]"
                Ok(event) if event.data == "[DONE]" => None,
                Ok(event) => match serde_json::from_str::<ChatStreamChunk>(&event.data) {
                    Ok(chunk) => Some(Ok(StreamChunk::OpenAi(chunk))),
                    Err(e) => {
                        warn!(request_id = %request_id, error = %e, "skipping unparseable stream event");
                        None
                    }
                },
                Err(e) => Some(Err(TransportError::Network {
                    message: format!("Stream error: {} [request_id: {}]", e, request_id),
                })),
            }
        })))
    }
}
