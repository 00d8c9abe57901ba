//! Trait abstractions for runtime I/O
//!
//! These traits enable testing the dispatcher with in-memory implementations.

use crate::db::{
    ConversationState, Participant, ParticipantId, ParticipantPatch, ParticipantProfile,
    PendingIntent,
};
use crate::dispatch::{ChatId, ImageSource, MessageId};
use crate::telegram::TransportError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;

/// Failure surfaced by a store implementation
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store backend error: {0}")]
    Backend(String),
    #[error("Participant not found: {0}")]
    NotFound(ParticipantId),
}

/// Storage for participant records
#[async_trait]
pub trait ParticipantStore: Send + Sync {
    async fn find_by_id(&self, id: ParticipantId) -> Result<Option<Participant>, StoreError>;

    /// All participants in registration order
    async fn find_all(&self) -> Result<Vec<Participant>, StoreError>;

    async fn exists_by_id(&self, id: ParticipantId) -> Result<bool, StoreError>;

    /// Create a participant unless one exists. Returns `true` if created.
    async fn create(&self, profile: &ParticipantProfile) -> Result<bool, StoreError>;

    /// Returns the number of matched records
    async fn update_by_id(
        &self,
        id: ParticipantId,
        patch: &ParticipantPatch,
    ) -> Result<usize, StoreError>;

    /// Conditional update: set `santa_id` on the candidate only while it is
    /// unset. Returns the number of matched records.
    async fn claim_santa(
        &self,
        candidate_id: ParticipantId,
        santa_id: ParticipantId,
    ) -> Result<usize, StoreError>;

    /// Claim the candidate for the requester and link the requester to it.
    /// Returns `false` if the claim matched nothing.
    ///
    /// The default runs the claim and the link as two separate writes; stores
    /// with transactions override it.
    async fn commit_assignment(
        &self,
        requester_id: ParticipantId,
        candidate_id: ParticipantId,
    ) -> Result<bool, StoreError> {
        if self.claim_santa(candidate_id, requester_id).await? == 0 {
            return Ok(false);
        }
        self.update_by_id(requester_id, &ParticipantPatch::recipient(candidate_id))
            .await?;
        Ok(true)
    }

    /// Returns the number of deleted records
    async fn delete_all(&self) -> Result<usize, StoreError>;
}

/// Storage for per-participant session state
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Stored state, or the default state when none exists yet
    async fn load_session(&self, id: ParticipantId) -> Result<ConversationState, StoreError>;

    async fn set_pending_intent(
        &self,
        id: ParticipantId,
        intent: PendingIntent,
    ) -> Result<(), StoreError>;

    /// Return the pending intent and reset it to idle atomically
    async fn take_pending_intent(&self, id: ParticipantId) -> Result<PendingIntent, StoreError>;

    async fn record_throttle(&self, id: ParticipantId, now: DateTime<Utc>)
        -> Result<(), StoreError>;

    /// Check the cooldown and record `now` if allowed, atomically
    async fn try_record_throttle(
        &self,
        id: ParticipantId,
        now: DateTime<Utc>,
        cooldown: Duration,
    ) -> Result<bool, StoreError>;
}

/// Outbound side of the messaging transport
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<(), TransportError>;

    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<(), TransportError>;

    async fn send_image(&self, chat_id: ChatId, image: &ImageSource) -> Result<(), TransportError>;

    async fn send_sticker(
        &self,
        chat_id: ChatId,
        sticker: &str,
        reply_to: Option<MessageId>,
    ) -> Result<(), TransportError>;
}

/// Combined storage trait for convenience
pub trait Storage: ParticipantStore + SessionStore {}
impl<T: ParticipantStore + SessionStore> Storage for T {}

// ============================================================================
// Arc implementations for trait objects
// ============================================================================

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<(), TransportError> {
        (**self).send_text(chat_id, text).await
    }

    async fn send_html(&self, chat_id: ChatId, html: &str) -> Result<(), TransportError> {
        (**self).send_html(chat_id, html).await
    }

    async fn send_image(&self, chat_id: ChatId, image: &ImageSource) -> Result<(), TransportError> {
        (**self).send_image(chat_id, image).await
    }

    async fn send_sticker(
        &self,
        chat_id: ChatId,
        sticker: &str,
        reply_to: Option<MessageId>,
    ) -> Result<(), TransportError> {
        (**self).send_sticker(chat_id, sticker, reply_to).await
    }
}

// ============================================================================
// Production Adapters
// ============================================================================

use crate::db::{Database, DbError};
use std::sync::Arc;

impl From<DbError> for StoreError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::ParticipantNotFound(id) => StoreError::NotFound(id),
            other @ DbError::Sqlite(_) => StoreError::Backend(other.to_string()),
        }
    }
}

/// Adapter to use Database as Storage
#[derive(Clone)]
pub struct DatabaseStorage {
    db: Database,
}

impl DatabaseStorage {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ParticipantStore for DatabaseStorage {
    async fn find_by_id(&self, id: ParticipantId) -> Result<Option<Participant>, StoreError> {
        Ok(self.db.find_participant(id)?)
    }

    async fn find_all(&self) -> Result<Vec<Participant>, StoreError> {
        Ok(self.db.list_participants()?)
    }

    async fn exists_by_id(&self, id: ParticipantId) -> Result<bool, StoreError> {
        Ok(self.db.participant_exists(id)?)
    }

    async fn create(&self, profile: &ParticipantProfile) -> Result<bool, StoreError> {
        Ok(self.db.create_participant(profile)?)
    }

    async fn update_by_id(
        &self,
        id: ParticipantId,
        patch: &ParticipantPatch,
    ) -> Result<usize, StoreError> {
        Ok(self.db.update_participant(id, patch)?)
    }

    async fn claim_santa(
        &self,
        candidate_id: ParticipantId,
        santa_id: ParticipantId,
    ) -> Result<usize, StoreError> {
        Ok(self.db.claim_santa(candidate_id, santa_id)?)
    }

    async fn commit_assignment(
        &self,
        requester_id: ParticipantId,
        candidate_id: ParticipantId,
    ) -> Result<bool, StoreError> {
        Ok(self.db.commit_assignment(requester_id, candidate_id)?)
    }

    async fn delete_all(&self) -> Result<usize, StoreError> {
        Ok(self.db.delete_all_participants()?)
    }
}

#[async_trait]
impl SessionStore for DatabaseStorage {
    async fn load_session(&self, id: ParticipantId) -> Result<ConversationState, StoreError> {
        Ok(self.db.get_session(id)?)
    }

    async fn set_pending_intent(
        &self,
        id: ParticipantId,
        intent: PendingIntent,
    ) -> Result<(), StoreError> {
        Ok(self.db.set_pending_intent(id, intent)?)
    }

    async fn take_pending_intent(&self, id: ParticipantId) -> Result<PendingIntent, StoreError> {
        Ok(self.db.take_pending_intent(id)?)
    }

    async fn record_throttle(
        &self,
        id: ParticipantId,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        Ok(self.db.record_throttle(id, now)?)
    }

    async fn try_record_throttle(
        &self,
        id: ParticipantId,
        now: DateTime<Utc>,
        cooldown: Duration,
    ) -> Result<bool, StoreError> {
        Ok(self.db.try_record_throttle(id, now, cooldown)?)
    }
}
