//! Error types for settings loading and validation.

/// Errors that can occur when loading or validating cache settings.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An I/O error occurred while reading the settings file or resolving a path.
    #[error("failed to read settings: {0}")]
    IoError(#[from] std::io::Error),

    /// The TOML content could not be parsed.
    #[error("failed to parse settings: {0}")]
    ParseError(String),

    /// A duration string could not be parsed.
    #[error("invalid duration '{0}'")]
    InvalidDuration(String),

    /// A settings value failed validation.
    #[error("validation error: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_parse_error() {
        let err = ConfigError::ParseError("expected '=' at line 2".to_string());
        assert_eq!(
            format!("{err}"),
            "failed to parse settings: expected '=' at line 2"
        );
    }

    #[test]
    fn display_invalid_duration() {
        let err = ConfigError::InvalidDuration("7x".to_string());
        assert_eq!(format!("{err}"), "invalid duration '7x'");
    }

    #[test]
    fn display_validation_error() {
        let err = ConfigError::ValidationError("cache root is empty".to_string());
        assert_eq!(format!("{err}"), "validation error: cache root is empty");
    }

    #[test]
    fn display_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = ConfigError::IoError(io_err);
        assert!(format!("{err}").starts_with("failed to read settings:"));
    }
}
