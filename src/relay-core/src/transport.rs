//! Outbound chat transport seam.

use async_trait::async_trait;

use crate::error::TransportError;

/// Result type for transport calls.
pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Something that can show a live answer to a chat user.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Identifies a sent message for later edits.
    type Handle: Clone + Send + Sync;

    /// Sends a new message to the conversation at `key`.
    async fn send(&self, key: &str, text: &str) -> TransportResult<Self::Handle>;

    /// Replaces the text of a previously sent message.
    ///
    /// Reports [`TransportError::Unchanged`] when `text` equals what the
    /// message already shows.
    async fn edit(&self, key: &str, handle: &Self::Handle, text: &str) -> TransportResult<()>;

    /// Signals that an answer is being produced.
    async fn send_typing(&self, key: &str) -> TransportResult<()>;
}

/// A message sent during the current turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessageHandle<H> {
    pub id: H,
    pub last_sent_text: String,
}
