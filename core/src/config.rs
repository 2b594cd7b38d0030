//! Transport configuration.

use serde::Deserialize;

use crate::error::ConfigError;

const EXPOSE_HOST_ERRORS_VAR: &str = "FETCH_EXPOSE_HOST_ERRORS";

/// Tunables for [`crate::FetchTransport`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Attach the host's rejection message to `TransportError::Fetch`.
    /// When off, callers only see the generic failure.
    pub expose_host_errors: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            expose_host_errors: true,
        }
    }
}

impl TransportConfig {
    /// Defaults overridden by `FETCH_EXPOSE_HOST_ERRORS` when it is set.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(value) = lookup(EXPOSE_HOST_ERRORS_VAR) {
            config.expose_host_errors = parse_flag(&value).ok_or(ConfigError::InvalidEnv {
                var: EXPOSE_HOST_ERRORS_VAR,
                value,
            })?;
        }
        Ok(config)
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" => Some(true),
        "0" | "false" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_expose_host_errors() {
        let config = TransportConfig::from_lookup(|_| None).unwrap();
        assert!(config.expose_host_errors);
    }

    #[test]
    fn env_flag_overrides_default() {
        let config =
            TransportConfig::from_lookup(|_| Some("FALSE".to_string())).unwrap();
        assert!(!config.expose_host_errors);

        let config = TransportConfig::from_lookup(|_| Some("1".to_string())).unwrap();
        assert!(config.expose_host_errors);
    }

    #[test]
    fn deserializes_with_missing_fields_defaulted() {
        let config: TransportConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, TransportConfig::default());

        let config: TransportConfig =
            serde_json::from_str(r#"{"expose_host_errors":false}"#).unwrap();
        assert!(!config.expose_host_errors);
    }

    #[test]
    fn invalid_flag_is_rejected() {
        let err = TransportConfig::from_lookup(|_| Some("maybe".to_string())).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { value, .. } if value == "maybe"));
    }
}
