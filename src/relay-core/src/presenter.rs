//! Live output: turns a delta channel into a bounded number of sends and
//! edits on a [`ChatTransport`].

use std::time::Duration;

use tokio::time::{Instant, sleep_until};
use tracing::{debug, warn};

use crate::config::RelayConfig;
use crate::dispatcher::DeltaChannel;
use crate::error::{RelayError, Result, TransportError};
use crate::transport::{ChatTransport, OutboundMessageHandle};

const MIN_TYPING_INTERVAL: Duration = Duration::from_secs(1);

/// Leading-edge debounce: the first call fires, later calls within
/// `interval` of the last firing are suppressed.
#[derive(Debug, Clone)]
pub struct Debouncer {
    interval: Duration,
    last: Option<Instant>,
}

impl Debouncer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    /// Returns true and records a firing if the interval has elapsed.
    pub fn ready(&mut self) -> bool {
        let now = Instant::now();
        match self.last {
            Some(last) if now.duration_since(last) < self.interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }

    /// Records a firing that happened outside [`Debouncer::ready`].
    pub fn mark(&mut self) {
        self.last = Some(Instant::now());
    }

    /// Earliest instant at which [`Debouncer::ready`] returns true.
    pub fn next_ready(&self) -> Instant {
        match self.last {
            Some(last) => last + self.interval,
            None => Instant::now(),
        }
    }
}

/// Drives one turn's live output.
#[derive(Debug, Clone)]
pub struct LiveOutputPresenter {
    edit_interval: Duration,
    typing_interval: Duration,
}

impl Default for LiveOutputPresenter {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(10))
    }
}

impl LiveOutputPresenter {
    /// The typing interval is clamped to at least one second.
    pub fn new(edit_interval: Duration, typing_interval: Duration) -> Self {
        Self {
            edit_interval,
            typing_interval: typing_interval.max(MIN_TYPING_INTERVAL),
        }
    }

    pub fn from_config(config: &RelayConfig) -> Self {
        Self::new(config.edit_wait(), config.typing_interval())
    }

    /// Consumes `deltas` until it closes.
    ///
    /// Returns the handle of the message that carries the answer, or `None`
    /// if the turn produced no text. Failing to send the first message ends
    /// the turn with [`RelayError::SendFailed`].
    pub async fn present<T: ChatTransport>(
        &self,
        transport: &T,
        key: &str,
        mut deltas: DeltaChannel,
    ) -> Result<Option<OutboundMessageHandle<T::Handle>>> {
        let mut typing = Debouncer::new(self.typing_interval);
        let mut edits = Debouncer::new(self.edit_interval);
        let mut handle: Option<OutboundMessageHandle<T::Handle>> = None;
        let mut last_text = String::new();

        loop {
            if typing.ready()
                && let Err(e) = transport.send_typing(key).await
            {
                debug!(key = %key, error = %e, "Typing indicator failed");
            }

            let delta = tokio::select! {
                biased;
                delta = deltas.recv() => delta,
                _ = sleep_until(typing.next_ready()) => continue,
            };
            let Some(delta) = delta else { break };
            if delta.text.is_empty() {
                continue;
            }
            last_text = delta.text;

            match handle.as_mut() {
                None => {
                    let id = transport
                        .send(key, &last_text)
                        .await
                        .map_err(|e| RelayError::SendFailed(e.to_string()))?;
                    edits.mark();
                    handle = Some(OutboundMessageHandle {
                        id,
                        last_sent_text: last_text.clone(),
                    });
                }
                Some(message) => {
                    if edits.ready() {
                        edit(transport, key, message, &last_text).await;
                    }
                }
            }
        }

        if let Some(message) = handle.as_mut() {
            edit(transport, key, message, &last_text).await;
        }
        Ok(handle)
    }
}

async fn edit<T: ChatTransport>(
    transport: &T,
    key: &str,
    message: &mut OutboundMessageHandle<T::Handle>,
    text: &str,
) {
    match transport.edit(key, &message.id, text).await {
        Ok(()) => message.last_sent_text = text.to_string(),
        Err(TransportError::Unchanged) => {
            debug!(key = %key, "Edit skipped, content unchanged");
            message.last_sent_text = text.to_string();
        }
        Err(e) => warn!(key = %key, error = %e, "Couldn't edit message"),
    }
}
