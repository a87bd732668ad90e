//! Per-conversation continuation state.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Identifiers the backend needs to continue a thread.
///
/// Empty strings mean there was no prior turn.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationRef {
    pub thread_id: String,
    pub last_turn_id: String,
}

impl ConversationRef {
    pub fn new(thread_id: impl Into<String>, last_turn_id: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            last_turn_id: last_turn_id.into(),
        }
    }

    /// Whether the next turn starts a new thread.
    pub fn is_fresh(&self) -> bool {
        self.thread_id.is_empty() && self.last_turn_id.is_empty()
    }
}

type Slot = Arc<AsyncMutex<ConversationRef>>;

/// Map from conversation key to its [`ConversationRef`].
///
/// Each key owns an async mutex. Holding the guard for a whole turn keeps at
/// most one turn in flight per key.
#[derive(Debug, Default)]
pub struct ConversationStore {
    slots: Mutex<HashMap<String, Slot>>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, key: &str) -> Slot {
        self.slots
            .lock()
            .entry(key.to_string())
            .or_default()
            .clone()
    }

    /// Waits for exclusive access to `key` and returns the owned guard.
    pub async fn lock(&self, key: &str) -> OwnedMutexGuard<ConversationRef> {
        self.slot(key).lock_owned().await
    }

    /// Snapshot of the stored ref. Waits for an in-flight turn to finish.
    pub async fn snapshot(&self, key: &str) -> ConversationRef {
        self.slot(key).lock().await.clone()
    }

    /// Clears the stored ref so the next turn starts fresh.
    pub async fn reset(&self, key: &str) {
        *self.slot(key).lock().await = ConversationRef::default();
    }

    /// Number of keys seen so far.
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.lock().is_empty()
    }
}
