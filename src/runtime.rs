//! Runtime for handling inbound events
//!
//! Every participant gets a lane: an unbounded mpsc channel with one worker
//! task, created on their first event. Events from one participant are
//! handled in arrival order; different participants run concurrently and a
//! slow lane never holds up the shared update loop. A lane with no events for
//! a while stops; the next event starts a fresh one.

mod executor;
pub mod traits;

#[cfg(test)]
pub mod testing;

pub use executor::ParticipantLane;
pub use traits::*;

use crate::db::ParticipantId;
use crate::dispatch::{Dispatcher, InboundEvent};
use crate::telegram::{TelegramClient, Update};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Type alias for production runtime with concrete implementations
pub type ProductionRuntime = BotRuntime<DatabaseStorage, TelegramClient>;

const LANE_IDLE_TIMEOUT: Duration = Duration::from_secs(600);

/// Handle to a running participant lane
struct LaneHandle {
    event_tx: mpsc::UnboundedSender<InboundEvent>,
    task: JoinHandle<()>,
}

/// Manager for all participant lanes
pub struct BotRuntime<S, T>
where
    S: Storage + Clone + 'static,
    T: Transport + 'static,
{
    dispatcher: Arc<Dispatcher<S>>,
    transport: Arc<T>,
    lanes: RwLock<HashMap<ParticipantId, LaneHandle>>,
    lane_idle_timeout: Duration,
}

impl<S, T> BotRuntime<S, T>
where
    S: Storage + Clone + 'static,
    T: Transport + 'static,
{
    pub fn new(dispatcher: Dispatcher<S>, transport: Arc<T>) -> Self {
        Self {
            dispatcher: Arc::new(dispatcher),
            transport,
            lanes: RwLock::new(HashMap::new()),
            lane_idle_timeout: LANE_IDLE_TIMEOUT,
        }
    }

    #[cfg(test)]
    pub fn with_lane_idle_timeout(mut self, timeout: Duration) -> Self {
        self.lane_idle_timeout = timeout;
        self
    }

    /// Queue an event on its sender's lane. Never waits on the lane itself.
    pub async fn submit(&self, event: InboundEvent) {
        let participant_id = event.sender_id();

        if let Err(mpsc::error::SendError(event)) = self.lane(participant_id).await.send(event) {
            // The lane went idle between lookup and send; the next lookup
            // replaces it
            if self.lane(participant_id).await.send(event).is_err() {
                tracing::error!(participant_id, "Dropping event, lane unavailable");
            }
        }
    }

    /// Convert a Bot API update and queue it
    pub async fn submit_update(&self, update: Update) {
        let update_id = update.update_id;
        match update.into_event() {
            Some(event) => self.submit(event).await,
            None => tracing::debug!(update_id, "Ignoring update without a text message"),
        }
    }

    /// Consume updates until the channel closes or `cancel` fires
    pub async fn run(&self, mut updates: mpsc::Receiver<Update>, cancel: CancellationToken) {
        tracing::info!("Bot runtime started");
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                update = updates.recv() => match update {
                    Some(update) => self.submit_update(update).await,
                    None => break,
                },
            }
        }
        tracing::info!("Bot runtime stopped");
    }

    /// Close every lane and wait for queued events to finish
    pub async fn shutdown(&self) {
        let lanes: Vec<_> = self.lanes.write().await.drain().collect();
        tracing::info!(lanes = lanes.len(), "Draining participant lanes");
        for (participant_id, lane) in lanes {
            drop(lane.event_tx);
            if let Err(e) = lane.task.await {
                tracing::error!(participant_id, error = %e, "Participant lane panicked");
            }
        }
    }

    /// Number of lanes still accepting events
    pub async fn lane_count(&self) -> usize {
        self.lanes
            .read()
            .await
            .values()
            .filter(|handle| !handle.event_tx.is_closed())
            .count()
    }

    async fn lane(&self, participant_id: ParticipantId) -> mpsc::UnboundedSender<InboundEvent> {
        // Check if already running
        {
            let lanes = self.lanes.read().await;
            if let Some(handle) = lanes.get(&participant_id) {
                if !handle.event_tx.is_closed() {
                    return handle.event_tx.clone();
                }
            }
        }

        let mut lanes = self.lanes.write().await;
        // Another event may have created it while we waited for the lock
        if let Some(handle) = lanes.get(&participant_id) {
            if !handle.event_tx.is_closed() {
                return handle.event_tx.clone();
            }
        }

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let mut lane = ParticipantLane::new(
            participant_id,
            self.dispatcher.clone(),
            self.transport.clone(),
            event_rx,
            self.lane_idle_timeout,
        );
        // A retired lane may still be draining; keep this participant's order
        if let Some(retired) = lanes.remove(&participant_id) {
            if !retired.task.is_finished() {
                lane = lane.after(retired.task);
            }
        }
        lanes.retain(|_, handle| !handle.task.is_finished());
        let task = tokio::spawn(lane.run());

        lanes.insert(
            participant_id,
            LaneHandle {
                event_tx: event_tx.clone(),
                task,
            },
        );
        event_tx
    }
}
