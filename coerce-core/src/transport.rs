//! Transport collaborator seam
//!
//! A transport turns a fully transformed [`ChatRequest`] into a
//! [`RawResponse`]. Authentication, socket-level retries and timeouts are its
//! business; anything it raises is propagated by the orchestrator untouched.

use crate::protocol::{ChatRequest, RawResponse, StreamChunk};
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Stream of provider events produced by [`Transport::invoke_stream`]
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<StreamChunk, TransportError>> + Send>>;

/// Iterator of provider events produced by [`BlockingTransport::invoke_stream`]
pub type ChunkIter = Box<dyn Iterator<Item = Result<StreamChunk, TransportError>> + Send>;

/// Errors raised by a transport
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("Rate limit exceeded")]
    RateLimit { retry_after: Option<Duration> },

    #[error("Request timeout")]
    Timeout,

    #[error("Server error ({status_code}): {message}")]
    ServerError { status_code: u16, message: String },

    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    #[error("Model '{model}' not available")]
    ModelNotAvailable { model: String },

    #[error("Network error: {message}")]
    Network { message: String },

    /// The provider answered but the body could not be read as its protocol
    #[error("Malformed provider response: {message}")]
    MalformedResponse { message: String },

    #[error("Operation not supported by this transport: {0}")]
    Unsupported(String),

    #[error("Error [{code}]: {message}")]
    Custom { code: String, message: String },
}

impl TransportError {
    /// Whether a transport-level retry could help; the coercion loop itself
    /// never retries these
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimit { .. }
                | Self::Timeout
                | Self::ServerError { .. }
                | Self::Network { .. }
                | Self::ModelNotAvailable { .. }
        )
    }

    /// Suggested delay before a transport-level retry
    pub fn retry_delay(&self) -> Option<Duration> {
        match self {
            Self::RateLimit { retry_after } => *retry_after,
            Self::Timeout => Some(Duration::from_secs(1)),
            Self::ServerError { .. } => Some(Duration::from_secs(2)),
            Self::Network { .. } => Some(Duration::from_secs(1)),
            _ => None,
        }
    }
}

/// Suspend-capable transport
#[async_trait]
pub trait Transport: Send + Sync {
    async fn invoke(&self, request: &ChatRequest) -> Result<RawResponse, TransportError>;

    /// Start a streamed call; the default refuses
    async fn invoke_stream(&self, request: &ChatRequest) -> Result<ChunkStream, TransportError> {
        let _ = request;
        Err(TransportError::Unsupported("streaming".to_string()))
    }
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn invoke(&self, request: &ChatRequest) -> Result<RawResponse, TransportError> {
        (**self).invoke(request).await
    }

    async fn invoke_stream(&self, request: &ChatRequest) -> Result<ChunkStream, TransportError> {
        (**self).invoke_stream(request).await
    }
}

/// Blocking transport
pub trait BlockingTransport {
    fn invoke(&self, request: &ChatRequest) -> Result<RawResponse, TransportError>;

    fn invoke_stream(&self, request: &ChatRequest) -> Result<ChunkIter, TransportError> {
        let _ = request;
        Err(TransportError::Unsupported("streaming".to_string()))
    }
}

impl<T: BlockingTransport + ?Sized> BlockingTransport for Arc<T> {
    fn invoke(&self, request: &ChatRequest) -> Result<RawResponse, TransportError> {
        (**self).invoke(request)
    }

    fn invoke_stream(&self, request: &ChatRequest) -> Result<ChunkIter, TransportError> {
        (**self).invoke_stream(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(TransportError::Timeout.is_retryable());
        assert!(TransportError::RateLimit { retry_after: None }.is_retryable());
        assert!(!TransportError::Authentication {
            message: "bad key".into()
        }
        .is_retryable());
        assert!(!TransportError::Unsupported("streaming".into()).is_retryable());
    }

    #[test]
    fn test_retry_delay_honours_retry_after() {
        let err = TransportError::RateLimit {
            retry_after: Some(Duration::from_secs(7)),
        };
        assert_eq!(err.retry_delay(), Some(Duration::from_secs(7)));
        assert_eq!(
            TransportError::InvalidRequest {
                message: "x".into()
            }
            .retry_delay(),
            None
        );
    }
}
