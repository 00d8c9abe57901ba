//! Free-text routing order

use super::event::ChatScope;

/// Handlers for free text, tried in [`TEXT_ROUTES`] order until one replies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextRoute {
    /// Follow-up to a command that set a pending intent
    PendingIntent,
    /// Image reply for text matching a configured pattern
    ImageTrigger,
    /// Rate-limited sticker reply to privileged participants
    Novelty,
    /// Picture for private text nothing else claimed
    PrivateFallback,
}

pub const TEXT_ROUTES: [TextRoute; 4] = [
    TextRoute::PendingIntent,
    TextRoute::ImageTrigger,
    TextRoute::Novelty,
    TextRoute::PrivateFallback,
];

impl TextRoute {
    /// Intents and the fallback belong to the private conversation only
    pub fn applies_to(self, scope: ChatScope) -> bool {
        match self {
            TextRoute::PendingIntent | TextRoute::PrivateFallback => scope == ChatScope::Private,
            TextRoute::ImageTrigger | TextRoute::Novelty => true,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            TextRoute::PendingIntent => "pending_intent",
            TextRoute::ImageTrigger => "image_trigger",
            TextRoute::Novelty => "novelty",
            TextRoute::PrivateFallback => "private_fallback",
        }
    }
}
