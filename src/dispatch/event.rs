//! Inbound events delivered by the transport

use crate::db::{ParticipantId, ParticipantProfile};
use chrono::{DateTime, Utc};

pub type ChatId = i64;
pub type MessageId = i64;

/// Where a message was sent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatScope {
    /// One-to-one chat with the bot
    Private,
    /// Group, supergroup or channel
    Group,
}

/// Commands the bot understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Start,
    ListMembers,
    ResetData,
    DumpData,
    SetWishList,
    SendToRecipient,
    SendToSanta,
    TakeRecipient,
}

impl Command {
    /// Parse the leading `/command` token of a message, ignoring any
    /// `@botname` suffix. Unknown commands return `None` and are handled as
    /// plain text.
    pub fn parse(text: &str) -> Option<Self> {
        let token = text.split_whitespace().next()?;
        let name = token.strip_prefix('/')?;
        let name = name.split('@').next().unwrap_or(name);

        let command = match name.to_ascii_lowercase().as_str() {
            "start" => Command::Start,
            "getmembers" => Command::ListMembers,
            "resetdata" => Command::ResetData,
            "getdata" => Command::DumpData,
            "setwishlist" => Command::SetWishList,
            "sendtorecipient" => Command::SendToRecipient,
            "sendtosanta" => Command::SendToSanta,
            "takerecipient" => Command::TakeRecipient,
            _ => return None,
        };
        Some(command)
    }

    /// The `@botname` suffix of a leading `/command` token, if any
    pub fn addressee(text: &str) -> Option<&str> {
        let token = text.split_whitespace().next()?;
        let (_, bot) = token.strip_prefix('/')?.split_once('@')?;
        (!bot.is_empty()).then_some(bot)
    }

    pub fn name(self) -> &'static str {
        match self {
            Command::Start => "start",
            Command::ListMembers => "getmembers",
            Command::ResetData => "resetdata",
            Command::DumpData => "getdata",
            Command::SetWishList => "setwishlist",
            Command::SendToRecipient => "sendtorecipient",
            Command::SendToSanta => "sendtosanta",
            Command::TakeRecipient => "takerecipient",
        }
    }

    /// Commands that only work in a private chat with the bot
    pub fn is_private_only(self) -> bool {
        !matches!(self, Command::Start | Command::ListMembers)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    Command(Command),
    Text(String),
}

/// A message from a participant, already classified
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEvent {
    pub sender: ParticipantProfile,
    pub chat_id: ChatId,
    pub scope: ChatScope,
    pub message_id: Option<MessageId>,
    pub received_at: DateTime<Utc>,
    pub kind: EventKind,
    /// Bot named by a `/command@botname` suffix
    pub addressed_to: Option<String>,
}

impl InboundEvent {
    /// Classify `text` as a command or free text
    pub fn from_text(
        sender: ParticipantProfile,
        chat_id: ChatId,
        scope: ChatScope,
        text: &str,
    ) -> Self {
        let kind = Command::parse(text).map_or_else(|| EventKind::Text(text.to_string()), EventKind::Command);
        Self {
            sender,
            chat_id,
            scope,
            message_id: None,
            received_at: Utc::now(),
            kind,
            addressed_to: Command::addressee(text).map(String::from),
        }
    }

    pub fn with_message_id(mut self, message_id: MessageId) -> Self {
        self.message_id = Some(message_id);
        self
    }

    pub fn at(mut self, received_at: DateTime<Utc>) -> Self {
        self.received_at = received_at;
        self
    }

    pub fn sender_id(&self) -> ParticipantId {
        self.sender.id
    }

    pub fn is_private(&self) -> bool {
        self.scope == ChatScope::Private
    }

    /// False when the message names a different bot. Unknown `own` accepts
    /// every addressee.
    pub fn is_addressed_to(&self, own: Option<&str>) -> bool {
        match (self.addressed_to.as_deref(), own) {
            (Some(target), Some(own)) => target.eq_ignore_ascii_case(own),
            _ => true,
        }
    }
}
