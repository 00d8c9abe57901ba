//! Per-participant event lane

use super::traits::{Storage, Transport};
use crate::db::ParticipantId;
use crate::dispatch::{Dispatcher, InboundEvent, Outbound, OutboundContent};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Worker that handles one participant's events in arrival order
pub struct ParticipantLane<S, T>
where
    S: Storage + Clone + 'static,
    T: Transport + 'static,
{
    participant_id: ParticipantId,
    dispatcher: Arc<Dispatcher<S>>,
    transport: Arc<T>,
    event_rx: mpsc::UnboundedReceiver<InboundEvent>,
    idle_timeout: Duration,
    /// Retired lane for the same participant that must finish first
    predecessor: Option<JoinHandle<()>>,
}

impl<S, T> ParticipantLane<S, T>
where
    S: Storage + Clone + 'static,
    T: Transport + 'static,
{
    pub fn new(
        participant_id: ParticipantId,
        dispatcher: Arc<Dispatcher<S>>,
        transport: Arc<T>,
        event_rx: mpsc::UnboundedReceiver<InboundEvent>,
        idle_timeout: Duration,
    ) -> Self {
        Self {
            participant_id,
            dispatcher,
            transport,
            event_rx,
            idle_timeout,
            predecessor: None,
        }
    }

    pub fn after(mut self, predecessor: JoinHandle<()>) -> Self {
        self.predecessor = Some(predecessor);
        self
    }

    /// Run until every sender is dropped or no event arrives for
    /// `idle_timeout`. An idle lane closes its channel and handles whatever
    /// was already queued before stopping.
    pub async fn run(mut self) {
        if let Some(predecessor) = self.predecessor.take() {
            if let Err(e) = predecessor.await {
                tracing::error!(participant_id = self.participant_id, error = %e, "Previous lane panicked");
            }
        }
        tracing::debug!(participant_id = self.participant_id, "Starting participant lane");

        loop {
            match tokio::time::timeout(self.idle_timeout, self.event_rx.recv()).await {
                Ok(Some(event)) => {
                    process_event(&self.dispatcher, self.transport.as_ref(), &event).await;
                }
                Ok(None) => break,
                Err(_) => {
                    self.event_rx.close();
                    while let Ok(event) = self.event_rx.try_recv() {
                        process_event(&self.dispatcher, self.transport.as_ref(), &event).await;
                    }
                    tracing::debug!(participant_id = self.participant_id, "Participant lane idle");
                    break;
                }
            }
        }

        tracing::debug!(participant_id = self.participant_id, "Participant lane stopped");
    }
}

/// Dispatch one event and deliver its replies. Failures are logged, never
/// retried.
pub async fn process_event<S, T>(dispatcher: &Dispatcher<S>, transport: &T, event: &InboundEvent)
where
    S: Storage + Clone,
    T: Transport + ?Sized,
{
    match dispatcher.dispatch(event).await {
        Ok(outbound) => {
            deliver(transport, &outbound).await;
        }
        Err(e) => {
            tracing::error!(
                participant_id = event.sender_id(),
                chat_id = event.chat_id,
                error = %e,
                "Failed to handle event"
            );
        }
    }
}

/// Send each reply in order. Returns the number of failed sends.
pub async fn deliver<T: Transport + ?Sized>(transport: &T, outbound: &[Outbound]) -> usize {
    let mut failed = 0;
    for message in outbound {
        let result = match &message.content {
            OutboundContent::Text(text) => transport.send_text(message.chat_id, text).await,
            OutboundContent::Html(html) => transport.send_html(message.chat_id, html).await,
            OutboundContent::Image(image) => transport.send_image(message.chat_id, image).await,
            OutboundContent::Sticker { sticker, reply_to } => {
                transport
                    .send_sticker(message.chat_id, sticker, *reply_to)
                    .await
            }
        };
        if let Err(e) = result {
            failed += 1;
            tracing::warn!(
                chat_id = message.chat_id,
                kind = ?e.kind,
                error = %e,
                "Failed to send reply"
            );
        }
    }
    failed
}
