//! HTTP transport for OpenAI-compatible chat endpoints
//!
//! Handles connection pooling, request id correlation, status mapping and
//! server-sent event streams. Everything it raises is a
//! [`TransportError`](crate::transport::TransportError).

pub mod client;
pub mod error;

pub use client::OpenAiHttpTransport;
pub use error::{map_http_error, parse_retry_after};
