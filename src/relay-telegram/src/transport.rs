//! [`ChatTransport`] over the Bot API.

use std::sync::Arc;

use async_trait::async_trait;
use relay_core::{ChatTransport, TransportResult};

use crate::bot::TelegramBot;

/// Live replies to one user message.
///
/// Built per turn: the answer is sent as a reply to `reply_to` in `chat_id`.
/// The first message goes out as plain text so a partial answer with
/// unbalanced Markdown can't be rejected; edits use Markdown.
#[derive(Debug, Clone)]
pub struct TelegramReplyTransport {
    bot: Arc<TelegramBot>,
    chat_id: i64,
    reply_to: Option<i64>,
}

impl TelegramReplyTransport {
    pub fn new(bot: Arc<TelegramBot>, chat_id: i64, reply_to: Option<i64>) -> Self {
        Self {
            bot,
            chat_id,
            reply_to,
        }
    }
}

#[async_trait]
impl ChatTransport for TelegramReplyTransport {
    /// Message id of the sent answer.
    type Handle = i64;

    async fn send(&self, _key: &str, text: &str) -> TransportResult<i64> {
        let message = self
            .bot
            .send_plain(self.chat_id, text, self.reply_to)
            .await?;
        Ok(message.message_id)
    }

    async fn edit(&self, _key: &str, handle: &i64, text: &str) -> TransportResult<()> {
        self.bot
            .edit_message_text(self.chat_id, *handle, text)
            .await?;
        Ok(())
    }

    async fn send_typing(&self, _key: &str) -> TransportResult<()> {
        self.bot.send_chat_action(self.chat_id, "typing").await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use relay_core::{LiveOutputPresenter, StreamDelta, TransportError};
    use serde_json::{Value, json};
    use tokio::sync::mpsc;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::config::TelegramConfig;

    const TOKEN: &str = "1:t";

    async fn server() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("/bot{TOKEN}/sendMessage")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "result": {"message_id": 77, "chat": {"id": 5, "type": "private"}, "date": 0}
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(format!("/bot{TOKEN}/sendChatAction")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true, "result": true})))
            .mount(&server)
            .await;
        server
    }

    fn transport(server: &MockServer) -> TelegramReplyTransport {
        let config = TelegramConfig::new(TOKEN).with_api_endpoint(server.uri());
        let bot = Arc::new(TelegramBot::new(config).unwrap());
        TelegramReplyTransport::new(bot, 5, Some(3))
    }

    #[tokio::test]
    async fn test_unchanged_edit_maps_to_transport_unchanged() {
        let server = server().await;
        Mock::given(method("POST"))
            .and(path(format!("/bot{TOKEN}/editMessageText")))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "ok": false,
                "error_code": 400,
                "description": "Bad Request: message is not modified: specified new message content and reply markup are exactly the same as a current content and reply markup of the message"
            })))
            .mount(&server)
            .await;

        let transport = transport(&server);
        let handle = transport.send("5", "hi").await.unwrap();
        assert_eq!(handle, 77);

        let err = transport.edit("5", &handle, "hi").await.unwrap_err();
        assert_eq!(err, TransportError::Unchanged);
    }

    #[tokio::test]
    async fn test_presenter_over_telegram() {
        let server = server().await;
        Mock::given(method("POST"))
            .and(path(format!("/bot{TOKEN}/editMessageText")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true, "result": true})))
            .mount(&server)
            .await;

        let (tx, rx) = mpsc::unbounded_channel();
        for text in ["Par", "Partial", "Partial answer"] {
            tx.send(StreamDelta {
                text: text.to_string(),
                thread_id: "t".to_string(),
                turn_id: "m".to_string(),
            })
            .unwrap();
        }
        drop(tx);

        LiveOutputPresenter::new(Duration::from_secs(1), Duration::from_secs(10))
            .present(&transport(&server), "5", rx)
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        let calls: Vec<(String, Value)> = requests
            .iter()
            .map(|r| {
                let method = r.url.path().rsplit('/').next().unwrap_or_default().to_string();
                (method, serde_json::from_slice(&r.body).unwrap())
            })
            .collect();

        assert_eq!(calls[0].0, "sendChatAction");
        assert_eq!(calls[1].0, "sendMessage");
        assert_eq!(calls[1].1["reply_to_message_id"], 3);
        assert_eq!(calls[1].1["text"], "Par");
        assert!(calls[1].1.get("parse_mode").is_none());
        let last = calls.last().unwrap();
        assert_eq!(last.0, "editMessageText");
        assert_eq!(last.1["text"], "Partial answer");
        assert_eq!(last.1["message_id"], 77);
    }

    #[tokio::test]
    async fn test_first_send_survives_unbalanced_markdown() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("/bot{TOKEN}/sendMessage")))
            .and(body_partial_json(json!({"parse_mode": "Markdown"})))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "ok": false,
                "error_code": 400,
                "description": "Bad Request: can't parse entities: Can't find end of the entity starting at byte offset 2"
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(format!("/bot{TOKEN}/sendMessage")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "result": {"message_id": 78, "chat": {"id": 5, "type": "private"}, "date": 0}
            })))
            .mount(&server)
            .await;

        let handle = transport(&server).send("5", "my_var").await.unwrap();
        assert_eq!(handle, 78);

        let requests = server.received_requests().await.unwrap();
        let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body["text"], "my_var");
        assert_eq!(body["reply_to_message_id"], 3);
    }
}
