//! Telegram chat transport for chat-relay.
//!
//! This crate provides:
//! - A Bot API client with long polling (`TelegramBot`)
//! - Update types and bot command parsing
//! - Markdown fix-ups for partially streamed answers
//! - `TelegramReplyTransport`, the `relay_core::ChatTransport` for live replies
//!
//! # Configuration
//!
//! Required environment variables:
//! - `TELEGRAM_TOKEN` - Bot token from BotFather
//!
//! Optional:
//! - `TELEGRAM_ID` - Comma-separated chat ids allowed to use the bot
//! - `TELEGRAM_API_ENDPOINT` - Alternative Bot API server

pub mod bot;
pub mod commands;
pub mod config;
pub mod error;
pub mod markdown;
pub mod transport;
pub mod updates;

// Re-export main types
pub use bot::{BotOptions, TelegramBot, UpdateHandler};
pub use commands::{ParsedCommand, parse_command};
pub use config::TelegramConfig;
pub use error::{TelegramApiError, TelegramError, TelegramResult};
pub use markdown::ensure_formatting;
pub use transport::TelegramReplyTransport;
pub use updates::{Chat, Message, MessageEntity, Update, User};
