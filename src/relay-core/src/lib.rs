//! Streaming relay pipeline for chat-relay.
//!
//! This crate carries a user's turn to a conversational backend and the
//! streamed answer back to a chat:
//! - `ExpiringCredentialCache` keeps the backend access token between turns
//! - `EventStreamDecoder` frames a streaming HTTP response into event payloads
//! - `TurnDispatcher` runs one turn per conversation key and emits deltas
//! - `LiveOutputPresenter` turns deltas into debounced sends and edits
//! - `retry` wraps the whole chain against transient failures
//!
//! # Example
//!
//! ```rust,ignore
//! use relay_core::{LiveOutputPresenter, RelayConfig, TurnDispatcher};
//!
//! let config = RelayConfig::from_env()?;
//! let dispatcher = TurnDispatcher::from_config(&config)?;
//! let deltas = dispatcher.dispatch_turn("chat-42", "hello").await?;
//! LiveOutputPresenter::from_config(&config)
//!     .present(&transport, "chat-42", deltas)
//!     .await?;
//! ```

pub mod auth;
pub mod backend;
pub mod config;
pub mod conversation;
pub mod credentials;
pub mod dispatcher;
pub mod error;
pub mod http;
pub mod presenter;
pub mod retry;
pub mod sse;
pub mod transport;

// Re-export main types
pub use auth::{Credential, CredentialProvider, SessionTokenProvider};
pub use backend::StreamDelta;
pub use config::RelayConfig;
pub use conversation::ConversationRef;
pub use credentials::ExpiringCredentialCache;
pub use dispatcher::{DeltaChannel, TurnDispatcher};
pub use error::{RelayError, Result, TransportError};
pub use presenter::{Debouncer, LiveOutputPresenter};
pub use retry::{RetryPolicy, retry};
pub use sse::{EventChannel, EventStreamDecoder};
pub use transport::{ChatTransport, OutboundMessageHandle, TransportResult};
