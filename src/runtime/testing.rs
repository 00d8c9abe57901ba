//! Mock implementations for testing
//!
//! These mocks enable dispatcher and runtime tests without SQLite or network I/O.

use super::traits::*;
use crate::db::{
    ConversationState, Participant, ParticipantId, ParticipantPatch, ParticipantProfile,
    PendingIntent,
};
use crate::dispatch::{ChatId, ImageSource, MessageId};
use crate::session::throttle;
use crate::telegram::TransportError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ============================================================================
// In-memory storage
// ============================================================================

#[derive(Default)]
struct StorageInner {
    participants: Vec<Participant>,
    sessions: HashMap<ParticipantId, ConversationState>,
    /// Next `claim_santa` matches nothing, as if another requester won
    lose_next_claim: bool,
}

/// Shared in-memory participant and session store. Clones share state.
///
/// Uses the default two-step `commit_assignment`.
#[derive(Clone, Default)]
pub struct InMemoryStorage {
    inner: Arc<Mutex<StorageInner>>,
}

#[allow(dead_code)]
impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a full record, bypassing `create`
    pub fn insert(&self, participant: Participant) {
        self.inner.lock().unwrap().participants.push(participant);
    }

    pub fn participant(&self, id: ParticipantId) -> Option<Participant> {
        self.inner
            .lock()
            .unwrap()
            .participants
            .iter()
            .find(|p| p.id == id)
            .cloned()
    }

    pub fn participants(&self) -> Vec<Participant> {
        self.inner.lock().unwrap().participants.clone()
    }

    /// Make the next santa claim lose to a concurrent assignment
    pub fn lose_next_claim(&self) {
        self.inner.lock().unwrap().lose_next_claim = true;
    }

    pub fn intent(&self, id: ParticipantId) -> PendingIntent {
        self.inner
            .lock()
            .unwrap()
            .sessions
            .get(&id)
            .map(|s| s.pending_intent)
            .unwrap_or_default()
    }
}

#[async_trait]
impl ParticipantStore for InMemoryStorage {
    async fn find_by_id(&self, id: ParticipantId) -> Result<Option<Participant>, StoreError> {
        Ok(self.participant(id))
    }

    async fn find_all(&self) -> Result<Vec<Participant>, StoreError> {
        Ok(self.participants())
    }

    async fn exists_by_id(&self, id: ParticipantId) -> Result<bool, StoreError> {
        Ok(self.participant(id).is_some())
    }

    async fn create(&self, profile: &ParticipantProfile) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.participants.iter().any(|p| p.id == profile.id) {
            return Ok(false);
        }
        inner.participants.push(Participant {
            id: profile.id,
            first_name: profile.first_name.clone(),
            last_name: profile.last_name.clone(),
            username: profile.username.clone(),
            wish_list: None,
            recipient_id: None,
            santa_id: None,
            registered_at: Utc::now(),
        });
        Ok(true)
    }

    async fn update_by_id(
        &self,
        id: ParticipantId,
        patch: &ParticipantPatch,
    ) -> Result<usize, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        match inner.participants.iter_mut().find(|p| p.id == id) {
            Some(p) => {
                patch.apply(p);
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn claim_santa(
        &self,
        candidate_id: ParticipantId,
        santa_id: ParticipantId,
    ) -> Result<usize, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if std::mem::take(&mut inner.lose_next_claim) {
            return Ok(0);
        }
        match inner
            .participants
            .iter_mut()
            .find(|p| p.id == candidate_id && p.santa_id.is_none())
        {
            Some(p) => {
                p.santa_id = Some(santa_id);
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn delete_all(&self) -> Result<usize, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let count = inner.participants.len();
        inner.participants.clear();
        Ok(count)
    }
}

#[async_trait]
impl SessionStore for InMemoryStorage {
    async fn load_session(&self, id: ParticipantId) -> Result<ConversationState, StoreError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .sessions
            .get(&id)
            .cloned()
            .unwrap_or_default())
    }

    async fn set_pending_intent(
        &self,
        id: ParticipantId,
        intent: PendingIntent,
    ) -> Result<(), StoreError> {
        self.inner
            .lock()
            .unwrap()
            .sessions
            .entry(id)
            .or_default()
            .pending_intent = intent;
        Ok(())
    }

    async fn take_pending_intent(&self, id: ParticipantId) -> Result<PendingIntent, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let session = inner.sessions.entry(id).or_default();
        Ok(std::mem::take(&mut session.pending_intent))
    }

    async fn record_throttle(
        &self,
        id: ParticipantId,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.inner
            .lock()
            .unwrap()
            .sessions
            .entry(id)
            .or_default()
            .last_throttled_at = Some(now);
        Ok(())
    }

    async fn try_record_throttle(
        &self,
        id: ParticipantId,
        now: DateTime<Utc>,
        cooldown: Duration,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let session = inner.sessions.entry(id).or_default();
        let allowed = throttle::allows(session.last_throttled_at, now, cooldown);
        if allowed {
            session.last_throttled_at = Some(now);
        }
        Ok(allowed)
    }
}

// ============================================================================
// Recording transport
// ============================================================================

/// A message handed to the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    Text { chat_id: ChatId, text: String },
    Html { chat_id: ChatId, html: String },
    Image { chat_id: ChatId, image: ImageSource },
    Sticker { chat_id: ChatId, sticker: String, reply_to: Option<MessageId> },
}

/// Transport that records every send and can fail for chosen chats
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<Sent>>,
    failing_chats: HashSet<ChatId>,
}

#[allow(dead_code)]
impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every send to `chat_id` fail
    pub fn failing_for(mut self, chat_id: ChatId) -> Self {
        self.failing_chats.insert(chat_id);
        self
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    fn record(&self, chat_id: ChatId, sent: Sent) -> Result<(), TransportError> {
        if self.failing_chats.contains(&chat_id) {
            return Err(TransportError::forbidden(format!("chat {chat_id} blocked the bot")));
        }
        self.sent.lock().unwrap().push(sent);
        Ok(())
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<(), TransportError> {
        self.record(chat_id, Sent::Text { chat_id, text: text.to_string() })
    }

    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<(), TransportError> {
        self.record(chat_id, Sent::Html { chat_id, html: html.to_string() })
    }

    async fn send_image(&self, chat_id: ChatId, image: &ImageSource) -> Result<(), TransportError> {
        self.record(chat_id, Sent::Image { chat_id, image: image.clone() })
    }

    async fn send_sticker(
        &self,
        chat_id: ChatId,
        sticker: &str,
        reply_to: Option<MessageId>,
    ) -> Result<(), TransportError> {
        self.record(
            chat_id,
            Sent::Sticker {
                chat_id,
                sticker: sticker.to_string(),
                reply_to,
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_storage_two_step_commit() {
        let storage = InMemoryStorage::new();
        storage.create(&ParticipantProfile::new(1)).await.unwrap();
        storage.create(&ParticipantProfile::new(2)).await.unwrap();

        assert!(storage.commit_assignment(1, 2).await.unwrap());
        assert!(!storage.commit_assignment(1, 2).await.unwrap());

        assert_eq!(storage.participant(1).unwrap().recipient_id, Some(2));
        assert_eq!(storage.participant(2).unwrap().santa_id, Some(1));
    }

    #[tokio::test]
    async fn test_recording_transport_failure() {
        let transport = RecordingTransport::new().failing_for(5);
        assert!(transport.send_text(5, "hi").await.is_err());
        transport.send_text(6, "hi").await.unwrap();
        assert_eq!(
            transport.sent(),
            vec![Sent::Text { chat_id: 6, text: "hi".to_string() }]
        );
    }
}
