//! Bot API wire types
//!
//! Only the fields the bot reads are modelled; everything else is ignored
//! by serde.

use crate::db::ParticipantProfile;
use crate::dispatch::{ChatScope, InboundEvent};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Envelope around every Bot API response
#[derive(Debug, Deserialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    pub description: Option<String>,
    pub error_code: Option<u16>,
    pub parameters: Option<ResponseParameters>,
}

#[derive(Debug, Deserialize)]
pub struct ResponseParameters {
    pub retry_after: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Message {
    pub message_id: i64,
    pub from: Option<User>,
    pub chat: Chat,
    /// Unix time in seconds
    pub date: i64,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    pub first_name: String,
    pub last_name: Option<String>,
    pub username: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Chat {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: String,
}

impl Update {
    /// Text messages from people become events; everything else is dropped
    pub fn into_event(self) -> Option<InboundEvent> {
        let message = self.message?;
        let from = message.from.filter(|user| !user.is_bot)?;
        let text = message.text?;

        let scope = if message.chat.kind == "private" {
            ChatScope::Private
        } else {
            ChatScope::Group
        };
        let received_at = DateTime::<Utc>::from_timestamp(message.date, 0).unwrap_or_else(Utc::now);

        let sender = ParticipantProfile {
            id: from.id,
            first_name: Some(from.first_name),
            last_name: from.last_name,
            username: from.username,
        };

        Some(
            InboundEvent::from_text(sender, message.chat.id, scope, &text)
                .with_message_id(message.message_id)
                .at(received_at),
        )
    }
}
