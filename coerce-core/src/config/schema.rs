//! Client configuration structures

use super::error::{FieldError, Problem};
use super::secrets::{SafeLogging, SecretString};
use crate::modes::{Mode, Provider};
use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};

/// Configuration version this crate understands
pub const CONFIG_VERSION: &str = "0.1";

/// Everything a structured client needs, passed explicitly to each client
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    /// Schema version (required - no default)
    pub version: String,

    pub provider: Provider,

    /// Protocol variant; the provider's native tool mode when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<Mode>,

    /// Model bound to the client
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Corrective rounds after the first attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Disable lax scalar coercion
    #[serde(default)]
    pub strict: bool,

    /// Delay between attempts
    #[serde(default)]
    pub retry: RetryPolicy,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transport: Option<TransportConfig>,
}

/// Settings for the bundled HTTP transport
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TransportConfig {
    pub base_url: String,

    /// Supports `${ENV_VAR}` interpolation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<SecretString>,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_max_retries() -> u32 {
    1
}

fn default_timeout_ms() -> u64 {
    60_000
}

impl ClientConfig {
    pub fn new(provider: Provider) -> Self {
        Self {
            version: CONFIG_VERSION.to_string(),
            provider,
            mode: None,
            model: None,
            max_retries: default_max_retries(),
            strict: false,
            retry: RetryPolicy::default(),
            transport: None,
        }
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_transport(mut self, transport: TransportConfig) -> Self {
        self.transport = Some(transport);
        self
    }

    /// The configured mode, or the provider's native tool mode
    pub fn effective_mode(&self) -> Mode {
        self.mode.unwrap_or_else(|| self.provider.default_mode())
    }

    /// Structural validation
    pub fn validate(&self) -> Result<(), FieldError> {
        if self.version.is_empty() {
            return Err(FieldError::missing("version"));
        }
        if self.version != CONFIG_VERSION {
            return Err(FieldError::new(
                "version",
                Problem::UnsupportedVersion(self.version.clone()),
            ));
        }

        if let Some(model) = &self.model {
            if model.trim().is_empty() {
                return Err(FieldError::missing("model").hint("model must not be blank"));
            }
        }

        if let Some(transport) = &self.transport {
            transport.validate("transport")?;
        }

        Ok(())
    }
}

impl TransportConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            timeout_ms: default_timeout_ms(),
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<SecretString>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn validate(&self, path: &str) -> Result<(), FieldError> {
        if self.base_url.is_empty() {
            return Err(FieldError::missing(format!("{}.base_url", path)));
        }

        match url::Url::parse(&self.base_url) {
            Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
            Ok(url) => {
                return Err(FieldError::new(
                    format!("{}.base_url", path),
                    Problem::BadUrl(format!("scheme {} is neither http nor https", url.scheme())),
                ))
            }
            Err(e) => {
                return Err(FieldError::new(format!("{}.base_url", path), Problem::BadUrl(e.to_string())))
            }
        }

        if self.timeout_ms == 0 {
            return Err(FieldError::out_of_range(
                format!("{}.timeout_ms", path),
                "Must be greater than 0",
            ));
        }

        Ok(())
    }
}

impl SafeLogging for ClientConfig {
    fn safe_for_logging(&self) -> String {
        let api_key = self
            .transport
            .as_ref()
            .and_then(|t| t.api_key.as_ref())
            .map(SecretString::partial_redact)
            .unwrap_or_else(|| "[NONE]".to_string());
        format!(
            "ClientConfig {{ provider: {:?}, mode: {}, model: {:?}, max_retries: {}, strict: {}, api_key: {} }}",
            self.provider,
            self.effective_mode(),
            self.model,
            self.max_retries,
            self.strict,
            api_key
        )
    }
}
