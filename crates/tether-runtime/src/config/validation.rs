//! Configuration validation utilities.

use super::error::{ConfigError, ConfigResult};
use super::schema::{LogOutput, LoggingConfig, TetherConfig, TransportConfig};

/// Validates the entire configuration.
pub fn validate_config(config: &TetherConfig) -> ConfigResult<()> {
    validate_logging_config(&config.logging)?;
    validate_transport_config(&config.transport)?;
    Ok(())
}

/// Validates logging configuration.
fn validate_logging_config(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File {
        match &logging.file_path {
            None => return Err(ConfigError::missing_field("logging.file_path")),
            Some(path) if path.file_name().is_none() => {
                return Err(ConfigError::validation(format!(
                    "Log file path has no file name: {}",
                    path.display()
                )));
            }
            Some(_) => {}
        }
    }

    for module in logging.filters.keys() {
        if module.is_empty() || module.contains(char::is_whitespace) {
            return Err(ConfigError::validation(format!(
                "Invalid log filter target: {module:?}"
            )));
        }
    }

    Ok(())
}

/// Validates transport configuration.
fn validate_transport_config(transport: &TransportConfig) -> ConfigResult<()> {
    if transport.request_timeout_ms == 0 {
        return Err(ConfigError::validation(
            "Request timeout must be greater than 0",
        ));
    }

    if transport.channel_capacity == 0 {
        return Err(ConfigError::validation(
            "Channel capacity must be greater than 0",
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogLevel;

    #[test]
    fn test_validate_default_config() {
        assert!(validate_config(&TetherConfig::default()).is_ok());
    }

    #[test]
    fn test_validate_file_output_needs_path() {
        let mut config = TetherConfig::default();
        config.logging.output = LogOutput::File;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::MissingField { .. })
        ));

        config.logging.file_path = Some("logs/tether.log".into());
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_filter_targets() {
        let mut config = TetherConfig::default();
        config
            .logging
            .filters
            .insert("tether core".to_string(), LogLevel::Debug);
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::ValidationError { .. })
        ));
    }

    #[test]
    fn test_validate_transport_limits() {
        let mut config = TetherConfig::default();
        config.transport.request_timeout_ms = 0;
        assert!(validate_config(&config).is_err());

        let mut config = TetherConfig::default();
        config.transport.channel_capacity = 0;
        assert!(validate_config(&config).is_err());
    }
}
