//! `${VAR}` interpolation for configuration files

use super::error::ConfigError;
use regex::{Captures, Regex};
use std::env;

const ENV_VAR_PATTERN: &str = r"\$\{([A-Z_][A-Z0-9_]*)\}";

pub(crate) fn env_var_pattern() -> Result<Regex, ConfigError> {
    Ok(Regex::new(ENV_VAR_PATTERN)?)
}

/// Replace every `${VAR}` with its value; the first unset variable is an error
pub fn interpolate_env_vars(content: &str) -> Result<String, ConfigError> {
    interpolate_with(content, |name| env::var(name).ok())
}

/// Interpolate using an arbitrary lookup
pub(crate) fn interpolate_with<F>(content: &str, lookup: F) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let pattern = env_var_pattern()?;
    let mut missing: Option<String> = None;

    let result = pattern.replace_all(content, |cap: &Captures<'_>| match lookup(&cap[1]) {
        Some(value) => value,
        None => {
            missing.get_or_insert_with(|| cap[1].to_string());
            String::new()
        }
    });

    match missing {
        Some(name) => Err(ConfigError::MissingEnvVar { name }),
        None => Ok(result.into_owned()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(name: &str) -> Option<String> {
        match name {
            "VAR1" => Some("value1".into()),
            "VAR2" => Some("value2".into()),
            _ => None,
        }
    }

    #[test]
    fn test_multiple_env_vars() {
        let result = interpolate_with("key1: ${VAR1}, key2: ${VAR2}", lookup).unwrap();
        assert_eq!(result, "key1: value1, key2: value2");
    }

    #[test]
    fn test_missing_env_var() {
        match interpolate_with("api_key: ${MISSING_VAR} ${VAR1}", lookup) {
            Err(ConfigError::MissingEnvVar { name }) => assert_eq!(name, "MISSING_VAR"),
            other => panic!("expected MissingEnvVar, got {other:?}"),
        }
    }

    #[test]
    fn test_lowercase_placeholders_are_left_alone() {
        assert_eq!(interpolate_with("${lower}", lookup).unwrap(), "${lower}");
    }

    #[test]
    fn test_process_environment() {
        env::set_var("COERCE_TEST_ENV_VAR", "from-env");
        assert_eq!(
            interpolate_env_vars("x: ${COERCE_TEST_ENV_VAR}").unwrap(),
            "x: from-env"
        );
        env::remove_var("COERCE_TEST_ENV_VAR");
    }
}
