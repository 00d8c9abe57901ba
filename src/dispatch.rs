//! Command dispatcher
//!
//! Maps inbound events onto the participant store, the session tracker and
//! the assignment engine, and returns the replies to deliver. Dispatching
//! never talks to the transport itself.

mod event;
mod outbound;
pub mod replies;
mod routes;

pub use event::{ChatId, ChatScope, Command, EventKind, InboundEvent, MessageId};
pub use outbound::{ImageSource, ImageTrigger, Outbound, OutboundContent};
pub use routes::{TextRoute, TEXT_ROUTES};

use crate::assignment::{AssignmentEngine, AssignmentError};
use crate::db::{Participant, ParticipantId, ParticipantPatch, PendingIntent};
use crate::runtime::{Storage, StoreError};
use crate::session::SessionTracker;
use rand::seq::SliceRandom;
use std::collections::HashSet;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Deployment-specific dispatch behaviour
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    /// May run `/resetdata` and `/getdata`
    pub admins: HashSet<ParticipantId>,
    /// Receive the rate-limited novelty sticker
    pub privileged: HashSet<ParticipantId>,
    /// Sticker file ids. Empty disables the novelty reply.
    pub novelty_stickers: Vec<String>,
    pub novelty_cooldown: Duration,
    pub image_triggers: Vec<ImageTrigger>,
    pub fallback_image: Option<ImageSource>,
    /// This bot's username; `/command@other` messages are ignored once known
    pub bot_username: Option<String>,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            admins: HashSet::new(),
            privileged: HashSet::new(),
            novelty_stickers: Vec::new(),
            novelty_cooldown: Duration::from_secs(600),
            image_triggers: Vec::new(),
            fallback_image: None,
            bot_username: None,
        }
    }
}

pub struct Dispatcher<S> {
    store: S,
    sessions: SessionTracker<S>,
    engine: AssignmentEngine<S>,
    settings: DispatchSettings,
}

impl<S: Storage + Clone> Dispatcher<S> {
    pub fn new(store: S, settings: DispatchSettings) -> Self {
        let engine = AssignmentEngine::new(store.clone());
        Self::with_engine(store, engine, settings)
    }

    pub fn with_engine(store: S, engine: AssignmentEngine<S>, settings: DispatchSettings) -> Self {
        let sessions = SessionTracker::new(store.clone(), settings.novelty_cooldown);
        Self {
            store,
            sessions,
            engine,
            settings,
        }
    }

    /// Handle one event and return the replies it produced
    pub async fn dispatch(&self, event: &InboundEvent) -> Result<Vec<Outbound>, DispatchError> {
        if !event.is_addressed_to(self.settings.bot_username.as_deref()) {
            tracing::debug!(
                participant_id = event.sender_id(),
                addressed_to = event.addressed_to.as_deref(),
                "Ignoring command for another bot"
            );
            return Ok(Vec::new());
        }

        match &event.kind {
            EventKind::Command(command) => self.handle_command(*command, event).await,
            EventKind::Text(text) => self.handle_text(text, event).await,
        }
    }

    // ==================== Commands ====================

    async fn handle_command(
        &self,
        command: Command,
        event: &InboundEvent,
    ) -> Result<Vec<Outbound>, DispatchError> {
        let sender = event.sender_id();

        if command.is_private_only() && !event.is_private() {
            tracing::debug!(
                participant_id = sender,
                command = command.name(),
                "Ignoring private-only command outside a private chat"
            );
            return Ok(Vec::new());
        }

        tracing::info!(participant_id = sender, command = command.name(), "Handling command");

        match command {
            Command::Start => self.start(event).await,
            Command::ListMembers => {
                let participants = self.store.find_all().await?;
                Ok(vec![Outbound::text(
                    event.chat_id,
                    replies::member_list(&participants),
                )])
            }
            Command::ResetData => {
                if !self.is_admin(sender, command) {
                    return Ok(Vec::new());
                }
                let deleted = self.store.delete_all().await?;
                tracing::warn!(participant_id = sender, deleted, "All participants deleted");
                Ok(vec![Outbound::text(event.chat_id, replies::DATA_RESET)])
            }
            Command::DumpData => {
                if !self.is_admin(sender, command) {
                    return Ok(Vec::new());
                }
                let participants = self.store.find_all().await?;
                Ok(vec![Outbound::text(
                    event.chat_id,
                    replies::data_dump(&participants),
                )])
            }
            Command::SetWishList => {
                self.prompt(event, PendingIntent::AwaitingWishList, replies::PROMPT_WISH_LIST)
                    .await
            }
            Command::SendToRecipient => {
                self.prompt(
                    event,
                    PendingIntent::AwaitingMessageToRecipient,
                    replies::PROMPT_TO_RECIPIENT,
                )
                .await
            }
            Command::SendToSanta => {
                self.prompt(
                    event,
                    PendingIntent::AwaitingMessageToSanta,
                    replies::PROMPT_TO_SANTA,
                )
                .await
            }
            Command::TakeRecipient => self.take_recipient(event).await,
        }
    }

    fn is_admin(&self, sender: ParticipantId, command: Command) -> bool {
        let allowed = self.settings.admins.contains(&sender);
        if !allowed {
            tracing::debug!(
                participant_id = sender,
                command = command.name(),
                "Unauthorized admin command ignored"
            );
        }
        allowed
    }

    /// Register on first private contact, reset the intent and greet
    async fn start(&self, event: &InboundEvent) -> Result<Vec<Outbound>, DispatchError> {
        let mut out = Vec::new();

        let registered = event.is_private()
            && !self.store.exists_by_id(event.sender_id()).await?
            && self.store.create(&event.sender).await?;
        if registered {
            let name = event.sender.display_name();
            tracing::info!(participant_id = event.sender_id(), "Participant registered");

            let notice = replies::joined(&name);
            for other in self.store.find_all().await? {
                if other.id != event.sender_id() {
                    out.push(Outbound::text(other.id, notice.clone()));
                }
            }
        }

        self.sessions
            .set_pending_intent(event.sender_id(), PendingIntent::Idle)
            .await?;

        out.push(Outbound::text(event.chat_id, replies::GREETING));
        out.push(Outbound::text(event.chat_id, replies::HINT_MEMBERS));
        if event.is_private() {
            out.push(Outbound::text(event.chat_id, replies::HINT_WISH_LIST));
            out.push(Outbound::text(event.chat_id, replies::HINT_TAKE_RECIPIENT));
        }
        Ok(out)
    }

    async fn prompt(
        &self,
        event: &InboundEvent,
        intent: PendingIntent,
        prompt: &str,
    ) -> Result<Vec<Outbound>, DispatchError> {
        self.sessions
            .set_pending_intent(event.sender_id(), intent)
            .await?;
        Ok(vec![Outbound::text(event.chat_id, prompt)])
    }

    async fn take_recipient(&self, event: &InboundEvent) -> Result<Vec<Outbound>, DispatchError> {
        let chat = event.chat_id;
        match self.engine.assign_recipient(event.sender_id()).await {
            Ok(recipient) => {
                let wishes = replies::wish_list_html(&recipient).map_or_else(
                    || Outbound::text(chat, replies::NO_WISHES),
                    |html| Outbound::html(chat, html),
                );
                Ok(vec![
                    Outbound::text(chat, replies::recipient_found(&recipient.display_name())),
                    wishes,
                ])
            }
            Err(AssignmentError::AlreadyAssigned) => {
                Ok(vec![Outbound::text(chat, replies::ALREADY_PAIRED)])
            }
            Err(AssignmentError::NotFound(id)) => {
                tracing::warn!(participant_id = id, "Unregistered participant asked for a recipient");
                Ok(vec![Outbound::text(chat, replies::SOMETHING_WENT_WRONG)])
            }
            Err(
                e @ (AssignmentError::NoCandidateAvailable
                | AssignmentError::ConcurrentAssignmentConflict),
            ) => {
                tracing::info!(participant_id = event.sender_id(), error = %e, "Assignment failed");
                Ok(vec![Outbound::text(chat, replies::TRY_AGAIN)])
            }
            Err(AssignmentError::Store(e)) => Err(e.into()),
        }
    }

    // ==================== Free text ====================

    async fn handle_text(
        &self,
        text: &str,
        event: &InboundEvent,
    ) -> Result<Vec<Outbound>, DispatchError> {
        for route in TEXT_ROUTES {
            if !route.applies_to(event.scope) {
                continue;
            }
            if let Some(out) = self.try_route(route, text, event).await? {
                tracing::debug!(
                    participant_id = event.sender_id(),
                    route = route.name(),
                    "Text routed"
                );
                return Ok(out);
            }
        }
        Ok(Vec::new())
    }

    /// `None` when the route does not claim the text
    async fn try_route(
        &self,
        route: TextRoute,
        text: &str,
        event: &InboundEvent,
    ) -> Result<Option<Vec<Outbound>>, DispatchError> {
        match route {
            TextRoute::PendingIntent => {
                let intent = self
                    .sessions
                    .consume_pending_intent(event.sender_id())
                    .await?;
                if !intent.is_pending() {
                    return Ok(None);
                }
                self.consume_follow_up(intent, text, event).await.map(Some)
            }
            TextRoute::ImageTrigger => Ok(self
                .settings
                .image_triggers
                .iter()
                .find(|trigger| trigger.matches(text))
                .map(|trigger| {
                    vec![Outbound::image(
                        event.chat_id,
                        trigger.image.resolved_at(event.received_at),
                    )]
                })),
            TextRoute::Novelty => self.novelty(event).await,
            TextRoute::PrivateFallback => Ok(self.settings.fallback_image.as_ref().map(|image| {
                vec![Outbound::image(
                    event.chat_id,
                    image.resolved_at(event.received_at),
                )]
            })),
        }
    }

    async fn novelty(&self, event: &InboundEvent) -> Result<Option<Vec<Outbound>>, DispatchError> {
        let sender = event.sender_id();
        if self.settings.novelty_stickers.is_empty() || !self.settings.privileged.contains(&sender) {
            return Ok(None);
        }
        if !self
            .sessions
            .try_throttled_action(sender, event.received_at)
            .await?
        {
            return Ok(None);
        }

        let sticker = self
            .settings
            .novelty_stickers
            .choose(&mut rand::thread_rng())
            .cloned();
        Ok(sticker.map(|sticker| vec![Outbound::sticker(event.chat_id, sticker, event.message_id)]))
    }

    /// The intent is already cleared; a missing record or empty text gets
    /// the generic error reply.
    async fn consume_follow_up(
        &self,
        intent: PendingIntent,
        text: &str,
        event: &InboundEvent,
    ) -> Result<Vec<Outbound>, DispatchError> {
        let chat = event.chat_id;
        let Some(participant) = self.store.find_by_id(event.sender_id()).await? else {
            tracing::warn!(participant_id = event.sender_id(), intent = %intent, "Follow-up from unregistered participant");
            return Ok(vec![Outbound::text(chat, replies::SOMETHING_WENT_WRONG)]);
        };
        if text.trim().is_empty() {
            return Ok(vec![Outbound::text(chat, replies::SOMETHING_WENT_WRONG)]);
        }

        match intent {
            PendingIntent::AwaitingWishList => self.update_wish_list(&participant, text, chat).await,
            PendingIntent::AwaitingMessageToRecipient => Ok(relay(
                participant.recipient_id,
                replies::FROM_SANTA,
                text,
                chat,
            )),
            PendingIntent::AwaitingMessageToSanta => Ok(relay(
                participant.santa_id,
                replies::FROM_RECIPIENT,
                text,
                chat,
            )),
            PendingIntent::Idle => Ok(Vec::new()),
        }
    }

    async fn update_wish_list(
        &self,
        participant: &Participant,
        text: &str,
        chat: ChatId,
    ) -> Result<Vec<Outbound>, DispatchError> {
        if self
            .store
            .update_by_id(participant.id, &ParticipantPatch::wish_list(text))
            .await?
            == 0
        {
            return Ok(vec![Outbound::text(chat, replies::SOMETHING_WENT_WRONG)]);
        }
        tracing::info!(participant_id = participant.id, "Wish list updated");

        let mut out = vec![Outbound::text(chat, replies::WISH_LIST_SAVED)];
        if let Some(santa) = participant.santa_id {
            out.push(Outbound::text(santa, replies::WISH_LIST_CHANGED));
            out.push(Outbound::text(santa, text));
        }
        Ok(out)
    }
}

/// Forward `text` to the counterpart with a heading, then confirm
fn relay(target: Option<ParticipantId>, heading: &str, text: &str, chat: ChatId) -> Vec<Outbound> {
    match target {
        Some(target) => vec![
            Outbound::text(target, heading),
            Outbound::text(target, text),
            Outbound::text(chat, replies::MESSAGE_RELAYED),
        ],
        None => vec![Outbound::text(chat, replies::NO_PAIRING_YET)],
    }
}
