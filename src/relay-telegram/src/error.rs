//! Error types for the Telegram transport.

use relay_core::TransportError;
use thiserror::Error;

/// Errors that can occur talking to the Bot API.
#[derive(Error, Debug)]
pub enum TelegramError {
    /// Configuration error (missing or invalid config).
    #[error("Configuration error: {0}")]
    Config(String),

    /// The bot token was rejected.
    #[error("Authentication error: {0}")]
    Auth(String),

    /// API request failed.
    #[error("Telegram API error: {0}")]
    Api(String),

    /// API rate limited.
    #[error("Rate limited: retry after {retry_after_secs} seconds")]
    RateLimited {
        /// Seconds to wait before retrying.
        retry_after_secs: u64,
    },

    /// An edit carried exactly the text the message already shows.
    #[error("Message is not modified")]
    NotModified,

    /// Network/HTTP error.
    #[error("Network error: {0}")]
    Network(String),

    /// Operation timed out.
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(String),
}

impl From<reqwest::Error> for TelegramError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TelegramError::Timeout(err.to_string())
        } else if err.is_connect() {
            TelegramError::Network(format!("Connection failed: {err}"))
        } else if err.is_decode() {
            TelegramError::Json(err.to_string())
        } else {
            TelegramError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for TelegramError {
    fn from(err: serde_json::Error) -> Self {
        TelegramError::Json(err.to_string())
    }
}

impl From<TelegramError> for TransportError {
    fn from(err: TelegramError) -> Self {
        match err {
            TelegramError::NotModified => TransportError::Unchanged,
            other => TransportError::failed(other.to_string()),
        }
    }
}

/// Result type for Telegram operations.
pub type TelegramResult<T> = std::result::Result<T, TelegramError>;

/// Error payload of a failed Bot API call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelegramApiError {
    /// HTTP-like error code (400, 401, 429...).
    pub error_code: i64,
    /// Human-readable description.
    pub description: String,
    /// Seconds to wait, present on flood control errors.
    pub retry_after: Option<u64>,
}

impl TelegramApiError {
    pub fn new(error_code: i64, description: impl Into<String>) -> Self {
        Self {
            error_code,
            description: description.into(),
            retry_after: None,
        }
    }

    pub fn with_retry_after(mut self, retry_after: Option<u64>) -> Self {
        self.retry_after = retry_after;
        self
    }

    /// The API reports unchanged edits only through the description.
    pub fn is_not_modified(&self) -> bool {
        self.description.contains("message is not modified")
    }
}

impl From<TelegramApiError> for TelegramError {
    fn from(err: TelegramApiError) -> Self {
        if err.error_code == 429 {
            TelegramError::RateLimited {
                retry_after_secs: err.retry_after.unwrap_or(30),
            }
        } else if err.is_not_modified() {
            TelegramError::NotModified
        } else if err.error_code == 401 || err.error_code == 404 {
            // Unknown tokens come back as 404 Not Found.
            TelegramError::Auth(err.description)
        } else {
            TelegramError::Api(format!("{}: {}", err.error_code, err.description))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TelegramError::Config("missing token".to_string());
        assert_eq!(err.to_string(), "Configuration error: missing token");

        let err = TelegramError::RateLimited {
            retry_after_secs: 7,
        };
        assert_eq!(err.to_string(), "Rate limited: retry after 7 seconds");
    }

    #[test]
    fn test_api_error_conversion() {
        let err: TelegramError = TelegramApiError::new(
            400,
            "Bad Request: message is not modified: specified new message content and reply markup are exactly the same as a current content and reply markup of the message",
        )
        .into();
        assert!(matches!(err, TelegramError::NotModified));

        let err: TelegramError = TelegramApiError::new(429, "Too Many Requests: retry after 5")
            .with_retry_after(Some(5))
            .into();
        assert!(matches!(
            err,
            TelegramError::RateLimited {
                retry_after_secs: 5
            }
        ));

        let err: TelegramError = TelegramApiError::new(401, "Unauthorized").into();
        assert!(matches!(err, TelegramError::Auth(_)));

        let err: TelegramError = TelegramApiError::new(400, "Bad Request: chat not found").into();
        assert_eq!(
            err.to_string(),
            "Telegram API error: 400: Bad Request: chat not found"
        );
    }

    #[test]
    fn test_transport_error_conversion() {
        assert_eq!(
            TransportError::from(TelegramError::NotModified),
            TransportError::Unchanged
        );
        assert_eq!(
            TransportError::from(TelegramError::Api("400: nope".into())),
            TransportError::failed("Telegram API error: 400: nope")
        );
    }
}
