use std::fmt;

use thiserror::Error;

/// Validation failure categories for proxy server configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigErrorKind {
    /// A required string is missing or empty
    NotEmpty,
    /// A required value is missing
    NotNull,
    /// Neither `forHosts` nor `notForHosts` is set
    NoMatcher,
    /// Both `forHosts` and `notForHosts` are set
    TooManyMatchers,
    /// A host matcher can't be compiled
    InvalidPattern,
}

impl ConfigErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigErrorKind::NotEmpty => "not_empty",
            ConfigErrorKind::NotNull => "not_null",
            ConfigErrorKind::NoMatcher => "no_matcher",
            ConfigErrorKind::TooManyMatchers => "too_many_matchers",
            ConfigErrorKind::InvalidPattern => "invalid_pattern",
        }
    }
}

impl fmt::Display for ConfigErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Unified error type for netproxy
#[derive(Error, Debug)]
pub enum NetProxyError {
    // Configuration errors
    #[error("Invalid configuration at {field} ({kind}): {message}")]
    InvalidConfig {
        field: String,
        kind: ConfigErrorKind,
        message: String,
    },

    #[error("Invalid host pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    // Request errors
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    // Settings loading
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Settings parse error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for netproxy operations
pub type Result<T> = std::result::Result<T, NetProxyError>;

impl NetProxyError {
    pub(crate) fn config(
        field: impl Into<String>,
        kind: ConfigErrorKind,
        message: impl Into<String>,
    ) -> Self {
        NetProxyError::InvalidConfig {
            field: field.into(),
            kind,
            message: message.into(),
        }
    }

    /// Check if this error was raised while building the engine
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            NetProxyError::InvalidConfig { .. }
                | NetProxyError::InvalidPattern { .. }
                | NetProxyError::Io(_)
                | NetProxyError::Json(_)
        )
    }

    /// Validation category, for configuration errors
    pub fn config_kind(&self) -> Option<ConfigErrorKind> {
        match self {
            NetProxyError::InvalidConfig { kind, .. } => Some(*kind),
            NetProxyError::InvalidPattern { .. } => Some(ConfigErrorKind::InvalidPattern),
            _ => None,
        }
    }
}
