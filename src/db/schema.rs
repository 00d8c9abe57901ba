//! Database schema and types

pub use crate::session::{ConversationState, PendingIntent};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Telegram user id. Also the id of the private chat with that user.
pub type ParticipantId = i64;

/// SQL schema for initialization
pub const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS participants (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    id INTEGER NOT NULL UNIQUE,
    first_name TEXT,
    last_name TEXT,
    username TEXT,
    wish_list TEXT,
    recipient_id INTEGER,
    santa_id INTEGER,
    registered_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_participants_santa ON participants(santa_id);

CREATE TABLE IF NOT EXISTS sessions (
    participant_id INTEGER PRIMARY KEY,
    pending_intent TEXT NOT NULL DEFAULT 'idle',
    last_throttled_at TEXT,
    updated_at TEXT NOT NULL
);
";

/// Columns selected for every participant read, in `parse_participant_row` order
pub const PARTICIPANT_COLUMNS: &str =
    "id, first_name, last_name, username, wish_list, recipient_id, santa_id, registered_at";

/// Participant record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: ParticipantId,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub username: Option<String>,
    pub wish_list: Option<String>,
    /// Who this participant gives a gift to
    pub recipient_id: Option<ParticipantId>,
    /// Who gives a gift to this participant
    pub santa_id: Option<ParticipantId>,
    pub registered_at: DateTime<Utc>,
}

impl Participant {
    /// Name shown to other participants: the present parts of
    /// first name, last name and `@username`.
    pub fn display_name(&self) -> String {
        format_display_name(
            self.first_name.as_deref(),
            self.last_name.as_deref(),
            self.username.as_deref(),
        )
    }

    pub fn has_wish_list(&self) -> bool {
        self.wish_list.as_deref().is_some_and(|w| !w.trim().is_empty())
    }

    pub fn has_recipient(&self) -> bool {
        self.recipient_id.is_some()
    }
}

/// Identity details known at first contact
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ParticipantProfile {
    pub id: ParticipantId,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub username: Option<String>,
}

impl ParticipantProfile {
    pub fn new(id: ParticipantId) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    pub fn display_name(&self) -> String {
        format_display_name(
            self.first_name.as_deref(),
            self.last_name.as_deref(),
            self.username.as_deref(),
        )
    }

    pub fn with_first_name(mut self, name: impl Into<String>) -> Self {
        self.first_name = Some(name.into());
        self
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }
}

fn format_display_name(first: Option<&str>, last: Option<&str>, username: Option<&str>) -> String {
    let handle = username.filter(|u| !u.is_empty()).map(|u| format!("@{u}"));
    [first, last, handle.as_deref()]
        .into_iter()
        .flatten()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Partial update of a participant. `None` fields are left untouched.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParticipantPatch {
    pub wish_list: Option<String>,
    pub recipient_id: Option<ParticipantId>,
    pub santa_id: Option<ParticipantId>,
}

impl ParticipantPatch {
    pub fn wish_list(text: impl Into<String>) -> Self {
        Self {
            wish_list: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn recipient(id: ParticipantId) -> Self {
        Self {
            recipient_id: Some(id),
            ..Self::default()
        }
    }

    /// Apply the patch to an in-memory record
    pub fn apply(&self, participant: &mut Participant) {
        if let Some(text) = &self.wish_list {
            participant.wish_list = Some(text.clone());
        }
        if let Some(id) = self.recipient_id {
            participant.recipient_id = Some(id);
        }
        if let Some(id) = self.santa_id {
            participant.santa_id = Some(id);
        }
    }
}

/// Outcome of the startup pair reconciliation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReconcileReport {
    /// Half-links completed by setting the giver's `recipient_id`
    pub completed: usize,
    /// Dangling `santa_id` values cleared because the giver could not take the link
    pub cleared: usize,
}
