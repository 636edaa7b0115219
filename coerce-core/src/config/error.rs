//! Failures while loading or checking a [`ClientConfig`](super::ClientConfig)

use super::schema::CONFIG_VERSION;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read client config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("client config {path} is malformed{}: {message}", location(.line, .column))]
    Syntax {
        path: String,
        line: Option<usize>,
        column: Option<usize>,
        message: String,
    },

    #[error("client config references ${{{name}}} but it is not set")]
    MissingEnvVar { name: String },

    #[error("interpolation pattern does not compile: {0}")]
    Pattern(#[from] regex::Error),

    #[error(transparent)]
    Rejected(#[from] FieldError),
}

fn location(line: &Option<usize>, column: &Option<usize>) -> String {
    match (line, column) {
        (Some(line), Some(column)) => format!(" at {}:{}", line, column),
        (Some(line), None) => format!(" at line {}", line),
        _ => String::new(),
    }
}

/// One configuration field the client cannot run with
#[derive(Debug, Error)]
#[error("`{field}` {problem}{}", .hint.as_ref().map(|h| format!(" ({})", h)).unwrap_or_default())]
pub struct FieldError {
    /// Dotted path, e.g. `transport.base_url`
    pub field: String,
    pub problem: Problem,
    pub hint: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Problem {
    Missing,
    OutOfRange(String),
    /// The value contradicts another field
    Conflict(String),
    BadUrl(String),
    UnsupportedVersion(String),
}

impl std::fmt::Display for Problem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Missing => f.write_str("must be set"),
            Self::OutOfRange(why) => write!(f, "is out of range: {}", why),
            Self::Conflict(why) => write!(f, "conflicts with the rest of the config: {}", why),
            Self::BadUrl(why) => write!(f, "is not a usable endpoint: {}", why),
            Self::UnsupportedVersion(found) => {
                write!(f, "is {}, only {} is understood", found, CONFIG_VERSION)
            }
        }
    }
}

impl FieldError {
    pub fn new(field: impl Into<String>, problem: Problem) -> Self {
        Self {
            field: field.into(),
            problem,
            hint: None,
        }
    }

    pub fn hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn missing(field: impl Into<String>) -> Self {
        Self::new(field, Problem::Missing)
    }

    pub fn out_of_range(field: impl Into<String>, why: impl Into<String>) -> Self {
        Self::new(field, Problem::OutOfRange(why.into()))
    }

    pub fn conflict(field: impl Into<String>, why: impl Into<String>) -> Self {
        Self::new(field, Problem::Conflict(why.into()))
    }
}
