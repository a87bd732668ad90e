//! Error types for the relay pipeline.
//!
//! Terminal turn failures (`Auth`, `ConnectFailed`, `SendFailed`) end a turn
//! and are rendered to the user by the caller. Everything else that can go
//! wrong mid-stream (a malformed event, a failed edit) is logged where it
//! happens and never reaches the caller.

use thiserror::Error;

/// Result type alias for relay operations.
pub type Result<T> = std::result::Result<T, RelayError>;

/// Main error type for the relay pipeline.
#[derive(Debug, Error)]
pub enum RelayError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration: {field} - {message}")]
    InvalidConfig { field: String, message: String },

    // Credential errors
    #[error("Authentication failed: {0}")]
    Auth(String),

    // Stream errors
    #[error("Connection failed to {endpoint}: {message}")]
    ConnectFailed { endpoint: String, message: String },

    #[error("Malformed stream event: {0}")]
    Decode(String),

    // Chat transport errors
    #[error("Failed to send message: {0}")]
    SendFailed(String),
}

impl RelayError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create an authentication error.
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth(message.into())
    }

    /// Create a connect error for the given endpoint.
    pub fn connect_failed(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConnectFailed {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    /// Whether this error ends the turn it occurred in.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Decode(_))
    }

    /// Readable message for the chat user.
    pub fn user_message(&self) -> String {
        match self {
            Self::Auth(message) => format!("Couldn't authenticate with the backend: {message}"),
            Self::ConnectFailed { message, .. } => {
                format!("Couldn't reach the backend: {message}")
            }
            Self::SendFailed(message) => format!("Couldn't send the answer: {message}"),
            other => other.to_string(),
        }
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(err: serde_json::Error) -> Self {
        RelayError::Decode(err.to_string())
    }
}

/// Errors reported by a chat transport.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The edit carried exactly the text the message already shows.
    #[error("Message content unchanged")]
    Unchanged,

    /// The transport rejected the call or could not be reached.
    #[error("{0}")]
    Failed(String),
}

impl TransportError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}
