//! Cross-field configuration rules

use super::error::FieldError;
use super::schema::ClientConfig;
use crate::retry::RetryPolicy;

/// Validator layering semantic rules over [`ClientConfig::validate`]
#[derive(Debug, Default, Clone, Copy)]
pub struct ConfigValidator;

impl ConfigValidator {
    pub fn new() -> Self {
        Self
    }

    pub fn validate(&self, config: &ClientConfig) -> Result<(), FieldError> {
        config.validate()?;

        self.validate_mode(config)?;
        self.validate_retry_policy(&config.retry, "retry")?;

        Ok(())
    }

    /// A mode only works against its own provider family
    fn validate_mode(&self, config: &ClientConfig) -> Result<(), FieldError> {
        let Some(mode) = config.mode else {
            return Ok(());
        };

        if !config.provider.supports(mode) {
            let allowed: Vec<&str> = crate::modes::Mode::ALL
                .iter()
                .filter(|m| config.provider.supports(**m))
                .map(|m| m.as_str())
                .collect();
            return Err(FieldError::conflict(
                "mode",
                format!("mode {} is not available for provider {:?}", mode, config.provider),
            )
            .hint(format!("expected one of: {}", allowed.join(", "))));
        }

        Ok(())
    }

    fn validate_retry_policy(&self, policy: &RetryPolicy, path: &str) -> Result<(), FieldError> {
        if policy.max_delay_ms < policy.initial_delay_ms {
            return Err(FieldError::conflict(
                format!("{}.max_delay_ms", path),
                "Must be >= initial_delay_ms",
            ));
        }

        if policy.exponential_base < 1.0 {
            return Err(FieldError::out_of_range(
                format!("{}.exponential_base", path),
                "Must be at least 1.0",
            ));
        }

        if !(0.0..=1.0).contains(&policy.jitter_factor) {
            return Err(FieldError::out_of_range(
                format!("{}.jitter_factor", path),
                "Must be between 0.0 and 1.0",
            ));
        }

        Ok(())
    }
}
