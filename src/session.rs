//! Conversation state tracking
//!
//! Each participant has one persisted session holding the pending intent
//! (how to read their next free-text message) and the novelty throttle
//! timestamp. Sessions are created lazily by the store.

mod state;
pub mod throttle;

pub use state::{ConversationState, PendingIntent};

use crate::db::ParticipantId;
use crate::runtime::{SessionStore, StoreError};
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Tracker over a session store with a fixed throttle cooldown
#[derive(Clone)]
pub struct SessionTracker<S> {
    store: S,
    cooldown: Duration,
}

impl<S: SessionStore> SessionTracker<S> {
    pub fn new(store: S, cooldown: Duration) -> Self {
        Self { store, cooldown }
    }

    pub async fn state(&self, id: ParticipantId) -> Result<ConversationState, StoreError> {
        self.store.load_session(id).await
    }

    /// Overwrite the pending intent. A new command silently preempts an
    /// unanswered one.
    pub async fn set_pending_intent(
        &self,
        id: ParticipantId,
        intent: PendingIntent,
    ) -> Result<(), StoreError> {
        tracing::debug!(participant_id = id, intent = %intent, "Setting pending intent");
        self.store.set_pending_intent(id, intent).await
    }

    /// Return the pending intent and reset it to idle atomically, so each
    /// follow-up is consumed exactly once.
    pub async fn consume_pending_intent(
        &self,
        id: ParticipantId,
    ) -> Result<PendingIntent, StoreError> {
        self.store.take_pending_intent(id).await
    }

    /// Whether the rate-limited action would be blocked at `now`
    pub async fn is_throttled(
        &self,
        id: ParticipantId,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let state = self.store.load_session(id).await?;
        Ok(!throttle::allows(state.last_throttled_at, now, self.cooldown))
    }

    pub async fn record_throttle_event(
        &self,
        id: ParticipantId,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.store.record_throttle(id, now).await
    }

    /// Check-and-record in one store operation. Returns `true` when the
    /// action may go ahead.
    pub async fn try_throttled_action(
        &self,
        id: ParticipantId,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        self.store.try_record_throttle(id, now, self.cooldown).await
    }
}
