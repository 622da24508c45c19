use std::future::Future;
use std::time::Duration;

use tracing::{info, warn};

use crate::queue::DeferredQueue;

pub const DEFAULT_BATCH_SIZE: usize = 10;
pub const DEFAULT_INTER_BATCH_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Outcome of attempting to re-process one deferred path.
pub enum DrainOutcome {
    /// Re-indexed successfully.
    Success,
    /// The file no longer exists, or its on-disk hash no longer matches what
    /// was queued; drop silently rather than retry (§4.4 skip logic).
    Skip,
    /// The sidecar (or another transient dependency) failed again; requeue.
    TransientFailure,
}

pub struct Drainer {
    batch_size: usize,
    inter_batch_delay: Duration,
    max_retries: u32,
}

impl Default for Drainer {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            inter_batch_delay: DEFAULT_INTER_BATCH_DELAY,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

impl Drainer {
    pub fn new(batch_size: usize, inter_batch_delay: Duration, max_retries: u32) -> Self {
        Self {
            batch_size: batch_size.max(1),
            inter_batch_delay,
            max_retries,
        }
    }

    /// Drains `queue` to empty, invoking `process` once per entry and
    /// sleeping [`Self::inter_batch_delay`] between batches so a recovering
    /// sidecar isn't immediately hammered (§4.4).
    pub async fn drain_all<F, Fut>(&self, queue: &mut DeferredQueue, mut process: F)
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = DrainOutcome>,
    {
        loop {
            let batch = queue.pop_batch(self.batch_size);
            if batch.is_empty() {
                return;
            }

            for entry in batch {
                match process(entry.relative_path.clone()).await {
                    DrainOutcome::Success => {
                        info!(path = %entry.relative_path, "drained deferred document");
                    }
                    DrainOutcome::Skip => {
                        info!(path = %entry.relative_path, "skipped stale deferred document");
                    }
                    DrainOutcome::TransientFailure => {
                        if !queue.requeue(entry.clone(), self.max_retries) {
                            warn!(
                                path = %entry.relative_path,
                                "dropping deferred document after exceeding max retries"
                            );
                        }
                    }
                }
            }

            if queue.is_empty() {
                return;
            }
            tokio::time::sleep(self.inter_batch_delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::OverflowPolicy;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn drains_every_entry_exactly_once_on_success() {
        let mut queue = DeferredQueue::new(10, OverflowPolicy::DropOldest);
        for i in 0..3 {
            queue.push(format!("{i}.md"));
        }
        let drainer = Drainer::new(2, Duration::from_millis(1), 5);
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();

        drainer
            .drain_all(&mut queue, move |_path| {
                calls_clone.fetch_add(1, Ordering::SeqCst);
                async { DrainOutcome::Success }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn transient_failures_are_requeued_until_max_retries() {
        let mut queue = DeferredQueue::new(10, OverflowPolicy::DropOldest);
        queue.push("a.md".to_string());
        let drainer = Drainer::new(10, Duration::from_millis(1), 1);

        drainer
            .drain_all(&mut queue, |_path| async { DrainOutcome::TransientFailure })
            .await;

        assert!(queue.is_empty());
    }
}
