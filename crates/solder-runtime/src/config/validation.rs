//! Configuration validation utilities.

use http::HeaderValue;

use super::error::{ConfigError, ConfigResult};
use super::schema::{LogOutput, LoggingConfig, ServerConfig, SolderConfig};

/// Validates the entire configuration.
pub fn validate_config(config: &SolderConfig) -> ConfigResult<()> {
    validate_server_config(&config.server)?;
    validate_logging_config(&config.logging)?;
    Ok(())
}

/// Validates server settings.
fn validate_server_config(server: &ServerConfig) -> ConfigResult<()> {
    validate_address(&server.address)?;

    if server.max_body_bytes == 0 {
        return Err(ConfigError::validation(
            "Maximum body size must be greater than 0",
        ));
    }

    validate_content_type(&server.default_content_type)?;

    Ok(())
}

/// Validates a `host:port` listen address.
fn validate_address(address: &str) -> ConfigResult<()> {
    if address.is_empty() {
        return Err(ConfigError::missing_field("server.address"));
    }

    let Some((host, port)) = address.rsplit_once(':') else {
        return Err(ConfigError::invalid_address(
            address,
            "expected host:port",
        ));
    };

    if host.is_empty() {
        return Err(ConfigError::invalid_address(address, "missing host"));
    }

    match port.parse::<u16>() {
        Ok(0) => Err(ConfigError::invalid_address(
            address,
            "port must be greater than 0",
        )),
        Ok(_) => Ok(()),
        Err(e) => Err(ConfigError::invalid_address(address, e.to_string())),
    }
}

/// Validates a media type such as `application/json`.
fn validate_content_type(content_type: &str) -> ConfigResult<()> {
    let essence = content_type.split(';').next().unwrap_or_default().trim();
    let valid = essence
        .split_once('/')
        .is_some_and(|(main, sub)| !main.is_empty() && !sub.is_empty());

    if !valid || HeaderValue::from_str(content_type).is_err() {
        return Err(ConfigError::validation(format!(
            "Invalid default content type: {content_type}"
        )));
    }
    Ok(())
}

/// Validates logging settings.
fn validate_logging_config(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::missing_field("logging.file_path"));
    }

    if let Some(target) = logging.filters.keys().find(|target| target.trim().is_empty()) {
        return Err(ConfigError::validation(format!(
            "Invalid log filter target: {target:?}"
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_default_config() {
        let config = SolderConfig::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_address() {
        assert!(validate_address("localhost:3000").is_ok());
        assert!(validate_address("[::1]:3000").is_ok());
        assert!(matches!(
            validate_address("localhost"),
            Err(ConfigError::InvalidAddress { .. })
        ));
        assert!(matches!(
            validate_address("0.0.0.0:0"),
            Err(ConfigError::InvalidAddress { .. })
        ));
        assert!(matches!(
            validate_address(""),
            Err(ConfigError::MissingField { .. })
        ));
    }

    #[test]
    fn test_validate_content_type() {
        assert!(validate_content_type("application/json; charset=utf-8").is_ok());
        assert!(validate_content_type("json").is_err());
    }

    #[test]
    fn test_file_output_needs_path() {
        let mut config = SolderConfig::default();
        config.logging.output = LogOutput::File;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::MissingField { field }) if field == "logging.file_path"
        ));

        config.logging.file_path = Some("solder.log".into());
        assert!(validate_config(&config).is_ok());
    }
}
