//! Wire shapes of the conversational backend.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::conversation::ConversationRef;
use crate::error::Result;

/// Body of a turn-initiation request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversationRequest {
    pub action: String,
    pub messages: Vec<OutgoingMessage>,
    pub model: String,
    pub parent_message_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutgoingMessage {
    pub id: String,
    pub role: String,
    pub content: OutgoingContent,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutgoingContent {
    pub content_type: String,
    pub parts: Vec<String>,
}

impl ConversationRequest {
    /// Builds the request for `text`, continuing `conversation` when it
    /// carries identifiers.
    ///
    /// A fresh conversation gets a random parent id and no thread id.
    pub fn new(text: &str, model: &str, conversation: &ConversationRef) -> Self {
        let parent_message_id = if conversation.last_turn_id.is_empty() {
            Uuid::new_v4().to_string()
        } else {
            conversation.last_turn_id.clone()
        };
        let conversation_id =
            (!conversation.thread_id.is_empty()).then(|| conversation.thread_id.clone());

        Self {
            action: "next".to_string(),
            messages: vec![OutgoingMessage {
                id: Uuid::new_v4().to_string(),
                role: "user".to_string(),
                content: OutgoingContent {
                    content_type: "text".to_string(),
                    parts: vec![text.to_string()],
                },
            }],
            model: model.to_string(),
            parent_message_id,
            conversation_id,
        }
    }
}

/// One streamed event payload.
///
/// Every field may be missing or `null`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessageEvent {
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub error: Option<serde_json::Value>,
    #[serde(default)]
    pub message: Option<EventMessage>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventMessage {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub content: Option<EventContent>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventContent {
    #[serde(default)]
    pub parts: Option<Vec<String>>,
}

/// A partial answer. `text` is the cumulative answer so far.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamDelta {
    pub text: String,
    pub thread_id: String,
    pub turn_id: String,
}

impl StreamDelta {
    /// The continuation ref this delta implies.
    pub fn conversation_ref(&self) -> ConversationRef {
        ConversationRef::new(self.thread_id.clone(), self.turn_id.clone())
    }
}

/// Parses one raw payload.
///
/// Returns `Ok(None)` for well-formed events that carry no text, and a
/// [`crate::RelayError::Decode`] for malformed JSON.
pub fn parse_delta(payload: &str) -> Result<Option<StreamDelta>> {
    let event: MessageEvent = serde_json::from_str(payload)?;
    let Some(message) = event.message else {
        return Ok(None);
    };
    let Some(text) = message
        .content
        .and_then(|content| content.parts)
        .and_then(|parts| parts.into_iter().next())
    else {
        return Ok(None);
    };
    if text.is_empty() {
        return Ok(None);
    }

    Ok(Some(StreamDelta {
        text,
        thread_id: event.conversation_id.unwrap_or_default(),
        turn_id: message.id.unwrap_or_default(),
    }))
}
