//! Error handling for the Pi Sentry appliance crate.

/// A specialized `Result` type for Pi Sentry operations.
pub type Result<T> = std::result::Result<T, SentryError>;

/// The main error type for Pi Sentry operations.
#[derive(Debug, thiserror::Error)]
pub enum SentryError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Local storage operation failed
    #[error("Storage error: {0}")]
    Store(#[from] rusqlite::Error),

    /// Value parsing failed
    #[error("Failed to parse: {0}")]
    Parse(String),

    /// Sensor or actuator access failed
    #[error("Hardware error: {0}")]
    Hardware(String),

    /// Network operation failed
    #[error("Network error: {0}")]
    Network(String),

    /// Web server error
    #[error("Web server error: {0}")]
    WebServer(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl SentryError {
    /// Create a new parse error
    pub fn parse_error(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    /// Create a new hardware error
    pub fn hardware_error(msg: impl Into<String>) -> Self {
        Self::Hardware(msg.into())
    }

    /// Create a new network error
    pub fn network_error(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    /// Create a new web server error
    pub fn web_server_error(msg: impl Into<String>) -> Self {
        Self::WebServer(msg.into())
    }

    /// Create a new configuration error
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
