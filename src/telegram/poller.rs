//! getUpdates long-polling loop

use super::types::Update;
use super::{TelegramClient, TransportError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Feeds updates from `getUpdates` into a channel until cancelled
pub struct Poller {
    client: Arc<TelegramClient>,
    timeout: Duration,
}

impl Poller {
    pub fn new(client: Arc<TelegramClient>, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// Returns when cancelled, when the receiver is gone, or on an error
    /// that retrying cannot fix.
    pub async fn run(
        self,
        updates: mpsc::Sender<Update>,
        cancel: CancellationToken,
    ) -> Result<(), TransportError> {
        if let Err(e) = self.client.delete_webhook().await {
            tracing::warn!(error = %e, "Failed to delete webhook before polling");
        }

        let mut offset = None;
        let mut failures = 0u32;

        loop {
            let batch = tokio::select! {
                () = cancel.cancelled() => {
                    tracing::info!("Polling cancelled");
                    return Ok(());
                }
                result = self.client.get_updates(offset, self.timeout) => result,
            };

            match batch {
                Ok(batch) => {
                    failures = 0;
                    for update in batch {
                        offset = Some(next_offset(offset, update.update_id));
                        if updates.send(update).await.is_err() {
                            tracing::info!("Update receiver closed, stopping poller");
                            return Ok(());
                        }
                    }
                }
                Err(e) if e.is_retryable() => {
                    failures += 1;
                    let delay = retry_delay(failures, &e);
                    tracing::warn!(error = %e, attempt = failures, delay = ?delay, "getUpdates failed, retrying");
                    tokio::select! {
                        () = cancel.cancelled() => return Ok(()),
                        () = tokio::time::sleep(delay) => {}
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "getUpdates failed permanently");
                    return Err(e);
                }
            }
        }
    }
}

fn next_offset(current: Option<i64>, update_id: i64) -> i64 {
    current.map_or(update_id + 1, |offset| offset.max(update_id + 1))
}

/// Server-provided `retry_after` wins; otherwise exponential backoff
/// 1s, 2s, 4s... capped at a minute
fn retry_delay(attempt: u32, error: &TransportError) -> Duration {
    if let Some(retry_after) = error.retry_after {
        return retry_after;
    }
    let exponent = attempt.saturating_sub(1).min(6);
    Duration::from_secs(1 << exponent).min(MAX_BACKOFF)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_delay() {
        let network = TransportError::network("reset");
        assert_eq!(retry_delay(1, &network), Duration::from_secs(1));
        assert_eq!(retry_delay(2, &network), Duration::from_secs(2));
        assert_eq!(retry_delay(3, &network), Duration::from_secs(4));
        assert_eq!(retry_delay(30, &network), MAX_BACKOFF);

        let flood = TransportError::rate_limit("slow down").with_retry_after(Duration::from_secs(9));
        assert_eq!(retry_delay(1, &flood), Duration::from_secs(9));
    }

    #[test]
    fn test_offset_only_moves_forward() {
        assert_eq!(next_offset(None, 10), 11);
        assert_eq!(next_offset(Some(11), 12), 13);
        assert_eq!(next_offset(Some(20), 12), 20);
    }

    #[tokio::test]
    async fn test_cancelled_poller_stops() {
        // Nothing listens on port 9; every request fails fast or is cancelled
        let client = Arc::new(TelegramClient::new("t", "http://127.0.0.1:9").unwrap());
        let (tx, _rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = Poller::new(client, Duration::from_secs(1)).run(tx, cancel).await;
        assert!(result.is_ok());
    }
}
