//! Conversation state types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What the next free-text message from a participant means
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingIntent {
    #[default]
    Idle,
    AwaitingWishList,
    AwaitingMessageToRecipient,
    AwaitingMessageToSanta,
}

impl PendingIntent {
    pub fn as_str(self) -> &'static str {
        match self {
            PendingIntent::Idle => "idle",
            PendingIntent::AwaitingWishList => "awaiting_wish_list",
            PendingIntent::AwaitingMessageToRecipient => "awaiting_message_to_recipient",
            PendingIntent::AwaitingMessageToSanta => "awaiting_message_to_santa",
        }
    }

    /// Parse a stored value. Unknown values read as idle.
    pub fn parse(s: &str) -> Self {
        match s {
            "awaiting_wish_list" => PendingIntent::AwaitingWishList,
            "awaiting_message_to_recipient" => PendingIntent::AwaitingMessageToRecipient,
            "awaiting_message_to_santa" => PendingIntent::AwaitingMessageToSanta,
            _ => PendingIntent::Idle,
        }
    }

    pub fn is_pending(self) -> bool {
        self != PendingIntent::Idle
    }
}

impl std::fmt::Display for PendingIntent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-participant session state
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConversationState {
    pub pending_intent: PendingIntent,
    pub last_throttled_at: Option<DateTime<Utc>>,
}
