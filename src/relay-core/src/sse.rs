//! Server-sent event decoding.
//!
//! [`EventStreamDecoder::open`] issues one streaming POST and hands back a
//! channel of raw `data:` payloads. A background reader owns the response
//! body and closes the channel when the stream ends, when the terminal
//! token arrives, or on the first I/O or framing error.

use std::collections::HashMap;
use std::time::Duration;

use eventsource_stream::Eventsource;
use futures::{Stream, StreamExt};
use reqwest::Client;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::error::{RelayError, Result};

/// Payload that marks the end of a stream.
pub const DEFAULT_TERMINAL_TOKEN: &str = "[DONE]";

/// Channel of raw event payloads for one stream.
pub type EventChannel = mpsc::UnboundedReceiver<String>;

/// Opens streaming requests and republishes their events on a channel.
#[derive(Debug, Clone)]
pub struct EventStreamDecoder {
    client: Client,
    connect_timeout: Duration,
    terminal_token: String,
}

impl EventStreamDecoder {
    pub fn new(client: Client, connect_timeout: Duration) -> Self {
        Self {
            client,
            connect_timeout,
            terminal_token: DEFAULT_TERMINAL_TOKEN.to_string(),
        }
    }

    /// Overrides the payload treated as end-of-stream.
    pub fn with_terminal_token(mut self, token: impl Into<String>) -> Self {
        self.terminal_token = token.into();
        self
    }

    /// Issues the request and starts the background reader.
    ///
    /// Transport failures, a non-2xx status and exceeding the connect
    /// timeout all fail with [`RelayError::ConnectFailed`] before any
    /// channel is returned.
    pub async fn open<B>(
        &self,
        endpoint: &str,
        headers: &HashMap<String, String>,
        body: &B,
    ) -> Result<EventChannel>
    where
        B: Serialize + ?Sized,
    {
        let mut request = self
            .client
            .post(endpoint)
            .header(ACCEPT, "text/event-stream")
            .header(CONTENT_TYPE, "application/json")
            .json(body);
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = match timeout(self.connect_timeout, request.send()).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(RelayError::connect_failed(endpoint, e.to_string())),
            Err(_) => {
                return Err(RelayError::connect_failed(
                    endpoint,
                    format!(
                        "no response within {}ms",
                        self.connect_timeout.as_millis()
                    ),
                ));
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = timeout(self.connect_timeout, response.text())
                .await
                .ok()
                .and_then(|r| r.ok())
                .unwrap_or_default();
            let preview: String = body.chars().take(200).collect();
            warn!(status = %status, endpoint, "Stream request rejected");
            return Err(RelayError::connect_failed(
                endpoint,
                if preview.is_empty() {
                    format!("HTTP {status}")
                } else {
                    format!("HTTP {status}: {preview}")
                },
            ));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let terminal_token = self.terminal_token.clone();
        tokio::spawn(pump_events(response.bytes_stream(), tx, terminal_token));

        Ok(rx)
    }
}

/// Why a reader stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StopReason {
    Terminal,
    EndOfStream,
    ReadError,
    ConsumerGone,
}

/// Frames `stream` as server-sent events and forwards each payload to `tx`.
pub(crate) async fn pump_events<S, B, E>(
    stream: S,
    tx: mpsc::UnboundedSender<String>,
    terminal_token: String,
) -> StopReason
where
    S: Stream<Item = std::result::Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    let events = stream.eventsource();
    let mut events = std::pin::pin!(events);

    let reason = loop {
        let next = tokio::select! {
            _ = tx.closed() => break StopReason::ConsumerGone,
            next = events.next() => next,
        };

        match next {
            None => break StopReason::EndOfStream,
            Some(Ok(event)) => {
                if event.data.is_empty() || event.data == terminal_token {
                    break StopReason::Terminal;
                }
                if tx.send(event.data).is_err() {
                    break StopReason::ConsumerGone;
                }
            }
            Some(Err(e)) => {
                warn!(error = %e, "Event stream read failed");
                break StopReason::ReadError;
            }
        }
    };

    debug!(reason = ?reason, "Event stream reader stopped");
    reason
}
