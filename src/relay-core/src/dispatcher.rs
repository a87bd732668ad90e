//! Turn orchestration.
//!
//! A turn moves through `Idle -> AwaitingCredential -> StreamOpen ->
//! Draining -> Done`. The per-key conversation guard is taken before the
//! credential lookup and released by the drain task once the stream closes,
//! so a second turn for the same key queues behind the first.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedMutexGuard, mpsc};
use tracing::{debug, info, warn};

use crate::auth::{CredentialProvider, SessionTokenProvider};
use crate::backend::{ConversationRequest, StreamDelta, parse_delta};
use crate::config::RelayConfig;
use crate::conversation::{ConversationRef, ConversationStore};
use crate::credentials::ExpiringCredentialCache;
use crate::error::{RelayError, Result};
use crate::http;
use crate::sse::{EventChannel, EventStreamDecoder};

const ACCESS_TOKEN_KEY: &str = "access_token";

/// Channel of parsed deltas for one turn. Closure means the turn is done.
pub type DeltaChannel = mpsc::UnboundedReceiver<StreamDelta>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TurnState {
    Idle,
    AwaitingCredential,
    StreamOpen,
    Draining,
    Done,
}

/// Runs user turns against the backend.
pub struct TurnDispatcher {
    credentials: ExpiringCredentialCache<&'static str, String>,
    provider: Arc<dyn CredentialProvider>,
    conversations: ConversationStore,
    decoder: EventStreamDecoder,
    backend_url: String,
    model: String,
    user_agent: String,
    refresh_timeout: Duration,
}

impl TurnDispatcher {
    pub fn new(
        config: &RelayConfig,
        provider: Arc<dyn CredentialProvider>,
        decoder: EventStreamDecoder,
    ) -> Self {
        Self {
            credentials: ExpiringCredentialCache::new(),
            provider,
            conversations: ConversationStore::new(),
            decoder,
            backend_url: config.backend_url.clone(),
            model: config.model.clone(),
            user_agent: config.user_agent.clone(),
            refresh_timeout: config.refresh_timeout(),
        }
    }

    /// Builds a dispatcher backed by [`SessionTokenProvider`].
    pub fn from_config(config: &RelayConfig) -> Result<Self> {
        let session_token = config.session_token.clone().ok_or_else(|| {
            RelayError::InvalidConfig {
                field: "session_token".to_string(),
                message: "missing".to_string(),
            }
        })?;

        let refresh_client = http::create_client_with_timeout(config.refresh_timeout())?;
        let provider = SessionTokenProvider::new(
            refresh_client,
            config.session_url.clone(),
            session_token,
            config.user_agent.clone(),
            config.refresh_timeout(),
        );

        let stream_client = http::create_streaming_client(config.connect_timeout())?;
        let decoder = EventStreamDecoder::new(stream_client, config.connect_timeout())
            .with_terminal_token(config.terminal_token.clone());

        Ok(Self::new(config, Arc::new(provider), decoder))
    }

    /// Starts a turn and returns its delta channel.
    ///
    /// Credential and connect failures are returned here and end the turn.
    /// Everything after that surfaces only as deltas on the channel.
    pub async fn dispatch_turn(&self, key: &str, text: &str) -> Result<DeltaChannel> {
        log_state(key, TurnState::Idle);
        let guard = self.conversations.lock(key).await;

        log_state(key, TurnState::AwaitingCredential);
        let access_token = self.access_token().await?;

        log_state(key, TurnState::StreamOpen);
        let request = ConversationRequest::new(text, &self.model, &guard);
        let headers = HashMap::from([
            (
                "Authorization".to_string(),
                format!("Bearer {access_token}"),
            ),
            ("User-Agent".to_string(), self.user_agent.clone()),
        ]);
        let events = self
            .decoder
            .open(&self.backend_url, &headers, &request)
            .await?;

        log_state(key, TurnState::Draining);
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(drain_turn(key.to_string(), events, tx, guard));

        Ok(rx)
    }

    /// Forgets the thread for `key`. The next turn starts fresh.
    pub async fn reset_conversation(&self, key: &str) {
        self.conversations.reset(key).await;
        info!(key = %key, "Conversation reset");
    }

    /// Snapshot of the continuation state for `key`.
    pub async fn conversation(&self, key: &str) -> ConversationRef {
        self.conversations.snapshot(key).await
    }

    /// Resolves a credential now so a bad session surfaces at startup.
    pub async fn ensure_auth(&self) -> Result<()> {
        self.access_token().await.map(|_| ())
    }

    async fn access_token(&self) -> Result<String> {
        if let Some(token) = self.credentials.get(&ACCESS_TOKEN_KEY) {
            return Ok(token);
        }

        debug!("Access token missing or expired, refreshing");
        let credential = tokio::time::timeout(self.refresh_timeout, self.provider.refresh())
            .await
            .map_err(|_| RelayError::auth("credential refresh timed out"))?
            .map_err(|e| match e {
                RelayError::Auth(_) => e,
                other => RelayError::auth(other.to_string()),
            })?;

        self.credentials
            .set(ACCESS_TOKEN_KEY, credential.value.clone(), credential.ttl);
        Ok(credential.value)
    }
}

impl std::fmt::Debug for TurnDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TurnDispatcher")
            .field("backend_url", &self.backend_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

fn log_state(key: &str, state: TurnState) {
    debug!(key = %key, state = ?state, "Turn state");
}

async fn drain_turn(
    key: String,
    mut events: EventChannel,
    tx: mpsc::UnboundedSender<StreamDelta>,
    mut conversation: OwnedMutexGuard<ConversationRef>,
) {
    let mut candidate: Option<ConversationRef> = None;
    let mut forwarded = 0usize;

    while let Some(payload) = events.recv().await {
        let delta = match parse_delta(&payload) {
            Ok(Some(delta)) => delta,
            Ok(None) => continue,
            Err(e) => {
                warn!(key = %key, error = %e, "Dropping malformed event");
                continue;
            }
        };

        let base = candidate.as_ref().unwrap_or(&*conversation);
        candidate = Some(merge_ref(base, &delta));

        if tx.send(delta).is_err() {
            debug!(key = %key, "Delta consumer went away");
            break;
        }
        forwarded += 1;
    }

    if let Some(next) = candidate {
        *conversation = next;
    }
    drop(conversation);
    drop(tx);

    debug!(key = %key, forwarded, state = ?TurnState::Done, "Turn state");
}

/// Identifiers from `delta`, keeping `base` for any the event left empty.
fn merge_ref(base: &ConversationRef, delta: &StreamDelta) -> ConversationRef {
    let pick = |new: &str, old: &str| {
        if new.is_empty() {
            old.to_string()
        } else {
            new.to_string()
        }
    };
    ConversationRef::new(
        pick(&delta.thread_id, &base.thread_id),
        pick(&delta.turn_id, &base.last_turn_id),
    )
}
