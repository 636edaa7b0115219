//! Error taxonomy for structured-output calls
//!
//! Only [`DecodeError`] and [`ValidationError`] are retried; everything else
//! surfaces on the attempt where it happened.

use crate::config::ConfigError;
use crate::protocol::{CompletionUsage, RawResponse};
use crate::transport::TransportError;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Result type for coercion operations
pub type CoerceResult<T> = Result<T, CoerceError>;

/// Errors surfaced to callers of the structured client
#[derive(Debug, Error)]
pub enum CoerceError {
    /// Forbidden mode/parameter combination, raised before any transport call
    #[error("Precondition failed: {0}")]
    Precondition(String),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The transport failed; never retried
    #[error("Transport failed on attempt {attempt}: {source}")]
    Transport {
        attempt: u32,
        /// Parse failures of the attempts that preceded this one
        failures: Vec<ParseFailure>,
        #[source]
        source: TransportError,
    },

    #[error(transparent)]
    RetriesExhausted(#[from] Box<TerminalRetryError>),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl CoerceError {
    pub fn precondition(message: impl Into<String>) -> Self {
        Self::Precondition(message.into())
    }

    /// Whether the orchestrator may answer this error with a corrective turn
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Decode(_) | Self::Validation(_))
    }

    /// The last raw response, when the error carries one
    pub fn last_completion(&self) -> Option<&Arc<RawResponse>> {
        match self {
            Self::RetriesExhausted(terminal) => terminal.last_completion.as_ref(),
            _ => None,
        }
    }
}

impl From<ParseFailure> for CoerceError {
    fn from(failure: ParseFailure) -> Self {
        match failure {
            ParseFailure::Decode(e) => Self::Decode(e),
            ParseFailure::Validation(e) => Self::Validation(e),
        }
    }
}

/// The payload was not syntactically valid JSON
#[derive(Debug, Clone, PartialEq, Error)]
#[error("Failed to decode JSON payload: {message}")]
pub struct DecodeError {
    pub message: String,
    /// The text that failed to decode
    pub payload: String,
}

impl DecodeError {
    pub fn new(message: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            payload: payload.into(),
        }
    }
}

impl From<serde_json::Error> for DecodeError {
    fn from(err: serde_json::Error) -> Self {
        Self::new(err.to_string(), String::new())
    }
}

/// Well-formed JSON failing schema constraints
#[derive(Debug, Clone, PartialEq, Error)]
pub struct ValidationError {
    /// Name of the schema that was being validated
    pub model: String,
    pub violations: Vec<FieldViolation>,
}

impl ValidationError {
    pub fn new(model: impl Into<String>, violations: Vec<FieldViolation>) -> Self {
        Self {
            model: model.into(),
            violations,
        }
    }

    /// A single violation not tied to a field (e.g. a missing tool call)
    pub fn payload(model: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(
            model,
            vec![FieldViolation::new("", ViolationKind::Payload, message)],
        )
    }

    pub fn field_paths(&self) -> Vec<&str> {
        self.violations.iter().map(|v| v.field_path.as_str()).collect()
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let n = self.violations.len();
        write!(
            f,
            "{} validation error{} for {}",
            n,
            if n == 1 { "" } else { "s" },
            self.model
        )?;
        for violation in &self.violations {
            write!(f, "\n{}", violation)?;
        }
        Ok(())
    }
}

/// A single violated field and the reason
#[derive(Debug, Clone, PartialEq)]
pub struct FieldViolation {
    /// JSON pointer-ish path, e.g. `/tasks/0/age`; empty for the root
    pub field_path: String,
    pub kind: ViolationKind,
    pub message: String,
}

impl FieldViolation {
    pub fn new(field_path: impl Into<String>, kind: ViolationKind, message: impl Into<String>) -> Self {
        Self {
            field_path: field_path.into(),
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = if self.field_path.is_empty() {
            "<root>"
        } else {
            self.field_path.as_str()
        };
        write!(f, "{}\n  {} [{}]", path, self.message, self.kind)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationKind {
    /// JSON Schema constraint (missing field, wrong type, enum, ...)
    Schema,
    /// The typed record rejected the value during deserialization
    Type,
    /// A registered context validator rejected the instance
    Custom,
    /// The response did not carry the expected payload at all
    Payload,
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Schema => "schema",
            Self::Type => "type",
            Self::Custom => "custom",
            Self::Payload => "payload",
        };
        f.write_str(s)
    }
}

/// A retriable parse failure from one attempt
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseFailure {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl TryFrom<CoerceError> for ParseFailure {
    type Error = CoerceError;

    fn try_from(err: CoerceError) -> Result<Self, Self::Error> {
        match err {
            CoerceError::Decode(e) => Ok(Self::Decode(e)),
            CoerceError::Validation(e) => Ok(Self::Validation(e)),
            other => Err(other),
        }
    }
}

/// Raised when the retry budget is spent on decode/validation failures
#[derive(Debug, Error)]
#[error("Retries exhausted after {attempts} attempt(s): {cause}")]
pub struct TerminalRetryError {
    pub attempts: u32,
    /// Raw response of the final attempt
    pub last_completion: Option<Arc<RawResponse>>,
    /// Usage summed over every attempt
    pub total_usage: CompletionUsage,
    #[source]
    pub cause: ParseFailure,
    /// Every failure in attempt order; the last entry equals `cause`
    pub history: Vec<ParseFailure>,
}
