//! Bot API client and long-polling loop.
//!
//! # Example
//!
//! ```rust,ignore
//! use relay_telegram::{TelegramBot, TelegramConfig};
//!
//! let bot = Arc::new(TelegramBot::new(TelegramConfig::from_env()?)?);
//! let me = bot.get_me().await?;
//! bot.run(handler).await?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::TelegramConfig;
use crate::error::{TelegramApiError, TelegramError, TelegramResult};
use crate::markdown::ensure_formatting;
use crate::updates::{Message, Update, User};

/// Receives updates from [`TelegramBot::run`].
#[async_trait::async_trait]
pub trait UpdateHandler: Send + Sync {
    /// Called once per update, in order. Should return quickly.
    async fn handle_update(&self, update: Update);
}

/// Configuration for bot behavior.
#[derive(Debug, Clone)]
pub struct BotOptions {
    /// Timeout for regular API requests.
    pub api_timeout: Duration,
    /// Timeout for establishing connections.
    pub connect_timeout: Duration,
    /// Delay before polling again after an error.
    pub retry_delay: Duration,
}

impl Default for BotOptions {
    fn default() -> Self {
        Self {
            api_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            retry_delay: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    error_code: Option<i64>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    parameters: Option<ResponseParameters>,
}

#[derive(Debug, Deserialize)]
struct ResponseParameters {
    #[serde(default)]
    retry_after: Option<u64>,
}

/// Telegram Bot API client.
pub struct TelegramBot {
    config: TelegramConfig,
    client: Client,
    options: BotOptions,
    shutdown_tx: watch::Sender<bool>,
}

impl std::fmt::Debug for TelegramBot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramBot")
            .field("config", &self.config)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl TelegramBot {
    /// Create a new bot with the given configuration.
    pub fn new(config: TelegramConfig) -> TelegramResult<Self> {
        Self::with_options(config, BotOptions::default())
    }

    /// Create a new bot with custom options.
    pub fn with_options(config: TelegramConfig, options: BotOptions) -> TelegramResult<Self> {
        config.validate()?;

        // Per-request timeouts: long polls outlive regular calls.
        let client = relay_core::http::create_streaming_client(options.connect_timeout)
            .map_err(|e| TelegramError::Config(e.to_string()))?;
        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            config,
            client,
            options,
            shutdown_tx,
        })
    }

    pub fn config(&self) -> &TelegramConfig {
        &self.config
    }

    /// Identity of the bot. Fails with [`TelegramError::Auth`] on a bad token.
    pub async fn get_me(&self) -> TelegramResult<User> {
        self.api_call("getMe", &json!({}), self.options.api_timeout)
            .await
    }

    /// Long-poll for updates starting at `offset`.
    pub async fn get_updates(&self, offset: i64) -> TelegramResult<Vec<Update>> {
        let poll_timeout = self.config.poll_timeout();
        let payload = json!({
            "offset": offset,
            "timeout": poll_timeout.as_secs(),
            "allowed_updates": ["message"],
        });
        self.api_call("getUpdates", &payload, poll_timeout + self.options.api_timeout)
            .await
    }

    /// Send `text` as Markdown, optionally as a reply.
    pub async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        reply_to: Option<i64>,
    ) -> TelegramResult<Message> {
        let mut payload = json!({
            "chat_id": chat_id,
            "text": ensure_formatting(text),
            "parse_mode": "Markdown",
        });
        if let Some(reply_to) = reply_to {
            payload["reply_to_message_id"] = json!(reply_to);
        }
        self.api_call("sendMessage", &payload, self.options.api_timeout)
            .await
    }

    /// Send `text` without any parse mode.
    pub async fn send_plain(
        &self,
        chat_id: i64,
        text: &str,
        reply_to: Option<i64>,
    ) -> TelegramResult<Message> {
        let mut payload = json!({
            "chat_id": chat_id,
            "text": text,
        });
        if let Some(reply_to) = reply_to {
            payload["reply_to_message_id"] = json!(reply_to);
        }
        self.api_call("sendMessage", &payload, self.options.api_timeout)
            .await
    }

    /// Replace the text of a sent message, as Markdown.
    ///
    /// Unchanged text fails with [`TelegramError::NotModified`].
    pub async fn edit_message_text(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
    ) -> TelegramResult<()> {
        let payload = json!({
            "chat_id": chat_id,
            "message_id": message_id,
            "text": ensure_formatting(text),
            "parse_mode": "Markdown",
        });
        // The result is the edited message, or `true` for inline messages.
        let _: serde_json::Value = self
            .api_call("editMessageText", &payload, self.options.api_timeout)
            .await?;
        Ok(())
    }

    /// Show the typing indicator in `chat_id`.
    pub async fn send_chat_action(&self, chat_id: i64, action: &str) -> TelegramResult<()> {
        let payload = json!({"chat_id": chat_id, "action": action});
        let _: bool = self
            .api_call("sendChatAction", &payload, self.options.api_timeout)
            .await?;
        Ok(())
    }

    /// Poll updates and hand them to `handler` until [`TelegramBot::shutdown`].
    ///
    /// Transient errors are logged and polling resumes after a delay. A
    /// rejected token ends the loop with [`TelegramError::Auth`].
    pub async fn run(&self, handler: Arc<dyn UpdateHandler>) -> TelegramResult<()> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let mut offset = 0i64;
        info!("Polling Telegram updates");

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            let polled = tokio::select! {
                _ = shutdown_rx.changed() => break,
                polled = self.get_updates(offset) => polled,
            };

            let delay = match polled {
                Ok(updates) => {
                    if !updates.is_empty() {
                        debug!(count = updates.len(), offset, "Received updates");
                    }
                    for update in updates {
                        offset = offset.max(update.update_id + 1);
                        handler.handle_update(update).await;
                    }
                    continue;
                }
                Err(TelegramError::Auth(message)) => {
                    error!(error = %message, "Telegram rejected the bot token");
                    return Err(TelegramError::Auth(message));
                }
                Err(TelegramError::RateLimited { retry_after_secs }) => {
                    warn!(retry_after_secs, "Polling rate limited");
                    Duration::from_secs(retry_after_secs)
                }
                Err(e) => {
                    warn!(error = %e, delay_ms = self.options.retry_delay.as_millis() as u64, "Polling failed");
                    self.options.retry_delay
                }
            };

            tokio::select! {
                _ = shutdown_rx.changed() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        info!("Stopped polling Telegram updates");
        Ok(())
    }

    /// Stop a running [`TelegramBot::run`] loop.
    pub fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
    }

    /// Make an API call. Transport errors never carry the URL, which holds
    /// the bot token.
    async fn api_call<T: DeserializeOwned>(
        &self,
        method: &str,
        payload: &serde_json::Value,
        timeout: Duration,
    ) -> TelegramResult<T> {
        let response = self
            .client
            .post(self.config.method_url(method))
            .json(payload)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| TelegramError::from(e.without_url()))?;

        let status = response.status();
        let body: ApiResponse<T> = match response.json().await {
            Ok(body) => body,
            Err(_) if !status.is_success() => {
                return Err(TelegramApiError::new(
                    i64::from(status.as_u16()),
                    status.canonical_reason().unwrap_or("Unknown error"),
                )
                .into());
            }
            Err(e) => return Err(TelegramError::from(e.without_url())),
        };

        if body.ok {
            return body
                .result
                .ok_or_else(|| TelegramError::Json(format!("{method}: response has no result")));
        }

        let api_error = TelegramApiError::new(
            body.error_code.unwrap_or_else(|| i64::from(status.as_u16())),
            body.description.unwrap_or_default(),
        )
        .with_retry_after(body.parameters.and_then(|p| p.retry_after));
        debug!(method, code = api_error.error_code, description = %api_error.description, "Bot API call failed");
        Err(api_error.into())
    }
}
