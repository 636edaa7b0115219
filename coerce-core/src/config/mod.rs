//! Client configuration
//!
//! A [`ClientConfig`] is an explicit value handed to each client; nothing is
//! stored in process-wide state. Files may be YAML or JSON and may reference
//! environment variables as `${VAR}`.

mod env;
mod error;
mod schema;
mod secrets;
mod validator;

pub use env::interpolate_env_vars;
pub use error::{ConfigError, FieldError, Problem};
pub use schema::{ClientConfig, TransportConfig, CONFIG_VERSION};
pub use secrets::{SafeLogging, SecretString};
pub use validator::ConfigValidator;

use std::fs;
use std::path::Path;
use tracing::debug;

fn read(path: &Path) -> Result<String, ConfigError> {
    let content = fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.to_string_lossy().to_string(),
        source: e,
    })?;
    env::interpolate_env_vars(&content)
}

fn finish(config: ClientConfig) -> Result<ClientConfig, ConfigError> {
    ConfigValidator::new().validate(&config)?;
    debug!(config = %config.safe_for_logging(), "loaded client configuration");
    Ok(config)
}

/// Load a configuration from a YAML file
pub fn load_from_yaml<P: AsRef<Path>>(path: P) -> Result<ClientConfig, ConfigError> {
    let path = path.as_ref();
    let interpolated = read(path)?;

    let config: ClientConfig = serde_yaml::from_str(&interpolated).map_err(|e| ConfigError::Syntax {
        path: path.to_string_lossy().to_string(),
        line: e.location().map(|l| l.line()),
        column: e.location().map(|l| l.column()),
        message: e.to_string(),
    })?;

    finish(config)
}

/// Load a configuration from a JSON file
pub fn load_from_json<P: AsRef<Path>>(path: P) -> Result<ClientConfig, ConfigError> {
    let path = path.as_ref();
    let interpolated = read(path)?;

    let config: ClientConfig = serde_json::from_str(&interpolated).map_err(|e| ConfigError::Syntax {
        path: path.to_string_lossy().to_string(),
        line: Some(e.line()),
        column: Some(e.column()),
        message: e.to_string(),
    })?;

    finish(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modes::{Mode, Provider};

    #[test]
    fn test_parse_full_yaml() {
        let yaml = r#"
version: "0.1"
provider: vertexai
mode: vertexai_json
model: gemini-1.5-pro
max_retries: 3
strict: true
retry:
  initial_delay_ms: 100
  max_delay_ms: 1000
transport:
  base_url: https://example.com/v1
  timeout_ms: 5000
"#;
        let config: ClientConfig = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.provider, Provider::VertexAi);
        assert_eq!(config.effective_mode(), Mode::VertexaiJson);
        assert_eq!(config.retry.initial_delay_ms, 100);
        assert!(ConfigValidator::new().validate(&config).is_ok());
    }
}
