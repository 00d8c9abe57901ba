//! Telegram Bot API transport
//!
//! Outbound sends go through [`TelegramClient`], which implements the
//! runtime's `Transport` trait. Inbound updates arrive either from the
//! [`Poller`] or from the webhook endpoint and are converted into
//! dispatcher events with [`Update::into_event`].

mod client;
mod error;
mod poller;
mod types;

pub use client::TelegramClient;
pub use error::TransportError;
pub use poller::Poller;
pub use types::Update;
