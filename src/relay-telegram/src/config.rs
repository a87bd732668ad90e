//! Configuration for the Telegram transport.
//!
//! Read from the environment:
//! - `TELEGRAM_TOKEN` (required) bot token from BotFather
//! - `TELEGRAM_ID` (optional) comma-separated chat ids allowed to use the bot
//! - `TELEGRAM_API_ENDPOINT` (optional) alternative Bot API server

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use tracing::warn;

use crate::error::{TelegramError, TelegramResult};

/// Public Bot API server.
pub const DEFAULT_API_ENDPOINT: &str = "https://api.telegram.org";

const DEFAULT_POLL_TIMEOUT_SECS: u64 = 30;

/// Configuration for the Telegram transport.
#[derive(Clone)]
pub struct TelegramConfig {
    /// Bot token (`123456:ABC...`).
    token: SecretString,
    /// Chats allowed to talk to the bot. Empty allows everyone.
    allowed_chats: Vec<i64>,
    /// Bot API server, either a base URL or a `.../bot%s/%s` template.
    api_endpoint: String,
    /// Long-polling timeout for `getUpdates`.
    poll_timeout_secs: u64,
}

impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("token", &"[REDACTED]")
            .field("allowed_chats", &self.allowed_chats)
            .field("api_endpoint", &self.api_endpoint)
            .field("poll_timeout_secs", &self.poll_timeout_secs)
            .finish()
    }
}

impl TelegramConfig {
    /// Create a configuration for `token` with defaults elsewhere.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: SecretString::new(token.into().into()),
            allowed_chats: Vec::new(),
            api_endpoint: DEFAULT_API_ENDPOINT.to_string(),
            poll_timeout_secs: DEFAULT_POLL_TIMEOUT_SECS,
        }
    }

    pub fn with_allowed_chats(mut self, chats: Vec<i64>) -> Self {
        self.allowed_chats = chats;
        self
    }

    pub fn with_api_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.api_endpoint = endpoint.into();
        self
    }

    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout_secs = timeout.as_secs();
        self
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> TelegramResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> TelegramResult<Self> {
        let token = lookup("TELEGRAM_TOKEN")
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| TelegramError::Config("TELEGRAM_TOKEN not set".to_string()))?;

        let mut config = Self::new(token.trim());

        if let Some(ids) = lookup("TELEGRAM_ID") {
            config.allowed_chats = parse_chat_ids(&ids)?;
        }
        if let Some(endpoint) = lookup("TELEGRAM_API_ENDPOINT")
            && !endpoint.trim().is_empty()
        {
            config.api_endpoint = endpoint.trim().to_string();
        }

        Ok(config)
    }

    pub fn token(&self) -> &str {
        self.token.expose_secret()
    }

    pub fn allowed_chats(&self) -> &[i64] {
        &self.allowed_chats
    }

    /// Whether `chat_id` may use the bot.
    pub fn is_allowed(&self, chat_id: i64) -> bool {
        self.allowed_chats.is_empty() || self.allowed_chats.contains(&chat_id)
    }

    pub fn api_endpoint(&self) -> &str {
        &self.api_endpoint
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.poll_timeout_secs)
    }

    /// Full URL of a Bot API method.
    pub fn method_url(&self, method: &str) -> String {
        if self.api_endpoint.contains("%s") {
            self.api_endpoint
                .replacen("%s", self.token(), 1)
                .replacen("%s", method, 1)
        } else {
            format!(
                "{}/bot{}/{}",
                self.api_endpoint.trim_end_matches('/'),
                self.token(),
                method
            )
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> TelegramResult<()> {
        let token = self.token();
        if token.is_empty() {
            return Err(TelegramError::Config("Bot token is empty".to_string()));
        }
        if !token.contains(':') {
            return Err(TelegramError::Config(
                "Bot token must look like '<bot id>:<secret>'".to_string(),
            ));
        }
        if !self.api_endpoint.starts_with("http://") && !self.api_endpoint.starts_with("https://")
        {
            return Err(TelegramError::Config(format!(
                "API endpoint must be an http(s) URL, got {}",
                self.api_endpoint
            )));
        }
        if self.allowed_chats.is_empty() {
            warn!("TELEGRAM_ID is empty, the bot will answer everyone");
        }
        Ok(())
    }
}

fn parse_chat_ids(raw: &str) -> TelegramResult<Vec<i64>> {
    raw.split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(|id| {
            id.parse::<i64>()
                .map_err(|_| TelegramError::Config(format!("Invalid chat id in TELEGRAM_ID: {id}")))
        })
        .collect()
}
