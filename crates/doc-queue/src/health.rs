use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use doc_embeddings::EmbeddingClient;
use tokio::sync::mpsc;
use tracing::info;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Polls the inference sidecar while the deferred queue is non-empty and
/// signals a drain exactly on the unavailable-to-available transition (§4.4).
pub struct HealthService {
    client: Arc<EmbeddingClient>,
    poll_interval: Duration,
    was_available: AtomicBool,
}

impl HealthService {
    pub fn new(client: Arc<EmbeddingClient>) -> Self {
        Self {
            client,
            poll_interval: DEFAULT_POLL_INTERVAL,
            was_available: AtomicBool::new(true),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Runs until `should_stop` becomes true, emitting a message on
    /// `drain_signal` each time the sidecar recovers.
    pub async fn run(
        self: Arc<Self>,
        drain_signal: mpsc::Sender<()>,
        mut is_queue_empty: impl FnMut() -> bool,
        mut should_stop: impl FnMut() -> bool,
    ) {
        while !should_stop() {
            if is_queue_empty() {
                tokio::time::sleep(self.poll_interval).await;
                continue;
            }

            let available = self.client.health_check().await;
            let previously_available = self.was_available.swap(available, Ordering::SeqCst);

            if available && !previously_available {
                info!("inference sidecar recovered, signaling deferred queue drain");
                let _ = drain_signal.send(()).await;
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_poll_interval_is_ten_seconds() {
        assert_eq!(DEFAULT_POLL_INTERVAL, Duration::from_secs(10));
    }
}
