//! Error handling for the chat relay

use std::fmt;

/// Result type alias for relay operations
pub type Result<T> = std::result::Result<T, RelayError>;

/// Relay error types
#[derive(Debug, Clone)]
pub enum RelayError {
    /// Backing store errors (connectivity, timeout, command failure)
    Store(String),
    /// Malformed inbound client payload
    Decode(String),
    /// A single local connection's delivery failed
    Delivery(String),
    /// Network-related errors
    Network(String),
    /// Configuration error
    Config(String),
    /// Server internal error
    Internal(String),
}

impl RelayError {
    /// Create a store error
    pub fn store<T: Into<String>>(msg: T) -> Self {
        RelayError::Store(msg.into())
    }

    /// Create a decode error
    pub fn decode<T: Into<String>>(msg: T) -> Self {
        RelayError::Decode(msg.into())
    }

    /// Create a delivery error
    pub fn delivery<T: Into<String>>(msg: T) -> Self {
        RelayError::Delivery(msg.into())
    }

    /// Create a network error
    pub fn network<T: Into<String>>(msg: T) -> Self {
        RelayError::Network(msg.into())
    }

    /// Create a configuration error
    pub fn config<T: Into<String>>(msg: T) -> Self {
        RelayError::Config(msg.into())
    }

    /// Create an internal error
    pub fn internal<T: Into<String>>(msg: T) -> Self {
        RelayError::Internal(msg.into())
    }

    /// Whether this error came from the backing store
    pub fn is_store(&self) -> bool {
        matches!(self, RelayError::Store(_))
    }
}

impl fmt::Display for RelayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelayError::Store(msg) => write!(f, "Store error: {}", msg),
            RelayError::Decode(msg) => write!(f, "Decode error: {}", msg),
            RelayError::Delivery(msg) => write!(f, "Delivery error: {}", msg),
            RelayError::Network(msg) => write!(f, "Network error: {}", msg),
            RelayError::Config(msg) => write!(f, "Configuration error: {}", msg),
            RelayError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for RelayError {}

impl From<std::io::Error> for RelayError {
    fn from(err: std::io::Error) -> Self {
        RelayError::Network(format!("IO error: {}", err))
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(err: serde_json::Error) -> Self {
        RelayError::Decode(format!("JSON error: {}", err))
    }
}

impl From<redis::RedisError> for RelayError {
    fn from(err: redis::RedisError) -> Self {
        RelayError::Store(format!("Redis error: {}", err))
    }
}

impl From<axum::Error> for RelayError {
    fn from(err: axum::Error) -> Self {
        RelayError::Delivery(format!("WebSocket error: {}", err))
    }
}
