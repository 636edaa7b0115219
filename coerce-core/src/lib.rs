//! Coerce Core Library
//!
//! Turns chat-completion calls into typed, validated records. A response
//! model (a [`SchemaAdapter`] or one of the [`dsl`] variants) is declared to
//! the provider according to a [`Mode`]; the reply is decoded and validated,
//! and on failure the conversation is extended with corrective turns and the
//! call is retried up to `max_retries` times.
//!
//! ```ignore
//! let config = ClientConfig::new(Provider::OpenAi).with_model("gpt-4o");
//! let client = StructuredClient::new(transport, config)?;
//! let user = client
//!     .create(&request, &SchemaAdapter::<User>::new()?, CreateOptions::default())
//!     .await?;
//! ```

pub mod client;
pub mod config;
pub mod dsl;
pub mod error;
pub mod http;
pub mod modes;
pub mod protocol;
pub mod retry;
pub mod schema;
pub mod transport;

pub use client::{BlockingStructuredClient, CoerceStream, CreateOptions, PassThrough, ResponseModel, StructuredClient};
pub use config::{load_from_json, load_from_yaml, ClientConfig, TransportConfig};
pub use dsl::{IterableAdapter, ParallelAdapter, PartialAdapter};
pub use error::{CoerceError, CoerceResult, DecodeError, FieldViolation, ParseFailure, TerminalRetryError, ValidationError};
pub use modes::{Mode, Provider};
pub use protocol::{ChatRequest, CompletionUsage, Message, RawResponse};
pub use retry::RetryPolicy;
pub use schema::{SchemaAdapter, SchemaDoc, Structured, ValidationContext};
pub use transport::{BlockingTransport, Transport, TransportError};

/// Returns the version of the Coerce Core library.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }
}
