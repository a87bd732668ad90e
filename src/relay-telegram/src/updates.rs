//! Bot API update types.
//!
//! Only the fields the relay reads are modelled; unknown fields are ignored.

use serde::{Deserialize, Serialize};

/// One entry from `getUpdates`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Update {
    pub update_id: i64,
    /// New message. Absent for edits and other update kinds, which the
    /// relay skips.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub message_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<User>,
    pub chat: Chat,
    #[serde(default)]
    pub date: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entities: Vec<MessageEntity>,
}

impl Message {
    pub fn text(&self) -> &str {
        self.text.as_deref().unwrap_or_default()
    }

    /// Whether the message starts with a bot command.
    pub fn is_command(&self) -> bool {
        self.entities
            .first()
            .is_some_and(|entity| entity.kind == "bot_command" && entity.offset == 0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chat {
    pub id: i64,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    #[serde(default)]
    pub first_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

/// Special span inside a message text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageEntity {
    #[serde(rename = "type")]
    pub kind: String,
    /// Offset in UTF-16 code units.
    pub offset: usize,
    /// Length in UTF-16 code units.
    pub length: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_command_update() {
        let update: Update = serde_json::from_value(serde_json::json!({
            "update_id": 10,
            "message": {
                "message_id": 5,
                "from": {"id": 42, "is_bot": false, "first_name": "Ada", "language_code": "en"},
                "chat": {"id": 42, "type": "private", "first_name": "Ada"},
                "date": 1700000000,
                "text": "/start",
                "entities": [{"type": "bot_command", "offset": 0, "length": 6}]
            }
        }))
        .unwrap();

        let message = update.message.unwrap();
        assert_eq!(message.chat.id, 42);
        assert_eq!(message.chat.kind, "private");
        assert_eq!(message.text(), "/start");
        assert!(message.is_command());
    }

    #[test]
    fn test_plain_and_empty_messages() {
        let update: Update = serde_json::from_value(serde_json::json!({
            "update_id": 11,
            "message": {"message_id": 6, "chat": {"id": 1, "type": "group"}, "text": "hi /start"}
        }))
        .unwrap();
        let message = update.message.unwrap();
        assert!(!message.is_command());
        assert_eq!(message.text(), "hi /start");

        let update: Update = serde_json::from_value(serde_json::json!({
            "update_id": 12,
            "message": {"message_id": 7, "chat": {"id": 1}}
        }))
        .unwrap();
        assert_eq!(update.message.unwrap().text(), "");
    }

    #[test]
    fn test_update_without_message() {
        let update: Update = serde_json::from_value(serde_json::json!({
            "update_id": 13,
            "callback_query": {"id": "x"}
        }))
        .unwrap();
        assert!(update.message.is_none());
    }

    #[test]
    fn test_edited_message_is_not_a_message() {
        let update: Update = serde_json::from_value(serde_json::json!({
            "update_id": 14,
            "edited_message": {"message_id": 6, "chat": {"id": 1, "type": "private"}, "text": "fixed"}
        }))
        .unwrap();
        assert!(update.message.is_none());
    }
}
