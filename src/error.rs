//! Error types for rune-compose

use thiserror::Error;

/// Prefix carried by every [`ComposeError::Format`] message.
///
/// Codec failures raised inside serde travel as the deserializer's own error
/// type; a message that starts with the prefix is lifted back into `Format`.
pub(crate) const FORMAT_ERROR_PREFIX: &str = "Format error: ";

/// Result type for compose operations
pub type Result<T> = std::result::Result<T, ComposeError>;

/// Compose error types
#[derive(Error, Debug)]
pub enum ComposeError {
    /// A field's input node matches none of its accepted shapes
    #[error("Format error: {0}")]
    Format(String),

    /// The declared document format is neither YAML nor JSON
    #[error("Unsupported compose file format: {0}")]
    UnsupportedFormat(String),

    /// The document parsed but does not fit the model (missing or mistyped field)
    #[error("Invalid compose document: {0}")]
    Decode(String),

    #[error("Compose error: {0}")]
    Compose(String),

    #[error("Service not found: {0}")]
    ServiceNotFound(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

impl ComposeError {
    /// Shorthand for a [`ComposeError::Format`] error.
    pub fn format(message: impl Into<String>) -> Self {
        Self::Format(message.into())
    }

    /// Whether this error is a [`ComposeError::Format`] error
    pub fn is_format(&self) -> bool {
        matches!(self, Self::Format(_))
    }

    /// Whether this error is a [`ComposeError::UnsupportedFormat`] error
    pub fn is_unsupported_format(&self) -> bool {
        matches!(self, Self::UnsupportedFormat(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = ComposeError::UnsupportedFormat(".toml".to_string());
        assert_eq!(err.to_string(), "Unsupported compose file format: .toml");
        assert!(err.is_unsupported_format());

        let err = ComposeError::format("invalid depends_on format");
        assert!(err.is_format());
        assert!(err.to_string().starts_with(FORMAT_ERROR_PREFIX));
    }

    #[test]
    fn test_decode_is_not_format() {
        let err = ComposeError::Decode("missing field `version`".to_string());
        assert!(!err.is_format());
        assert_eq!(err.to_string(), "Invalid compose document: missing field `version`");
    }
}
