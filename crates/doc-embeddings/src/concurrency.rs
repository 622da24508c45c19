use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Semaphore, SemaphorePermit};

use crate::error::EmbeddingError;

/// Default permit timeout: requests waiting longer than this for
/// a free slot fail with [`EmbeddingError::PermitTimeout`] rather than
/// queueing indefinitely (§5).
const DEFAULT_PERMIT_TIMEOUT: Duration = Duration::from_secs(60);

/// Bounds how many embedding/generation requests run against the sidecar at
/// once. Configurable 1-4, default 2 (§5 concurrency model).
pub struct ConcurrencyLimiter {
    semaphore: Arc<Semaphore>,
    permit_timeout: Duration,
}

impl ConcurrencyLimiter {
    pub fn new(permits: usize) -> Self {
        let permits = permits.clamp(1, 4);
        Self {
            semaphore: Arc::new(Semaphore::new(permits)),
            permit_timeout: DEFAULT_PERMIT_TIMEOUT,
        }
    }

    pub fn with_permit_timeout(mut self, timeout: Duration) -> Self {
        self.permit_timeout = timeout;
        self
    }

    /// Acquires a permit, releasing it automatically on drop (all exit paths,
    /// including cancellation, release the slot).
    pub async fn acquire(&self) -> Result<SemaphorePermit<'_>, EmbeddingError> {
        tokio::time::timeout(self.permit_timeout, self.semaphore.acquire())
            .await
            .map_err(|_| EmbeddingError::PermitTimeout)?
            .map_err(|_| EmbeddingError::Unavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permits_are_clamped_to_one_through_four() {
        assert_eq!(ConcurrencyLimiter::new(0).semaphore.available_permits(), 1);
        assert_eq!(ConcurrencyLimiter::new(10).semaphore.available_permits(), 4);
        assert_eq!(ConcurrencyLimiter::new(2).semaphore.available_permits(), 2);
    }

    #[tokio::test]
    async fn acquire_times_out_when_all_permits_held() {
        let limiter = ConcurrencyLimiter::new(1).with_permit_timeout(Duration::from_millis(20));
        let _held = limiter.acquire().await.unwrap();
        let result = limiter.acquire().await;
        assert!(matches!(result, Err(EmbeddingError::PermitTimeout)));
    }

    #[tokio::test]
    async fn releasing_a_permit_unblocks_the_next_waiter() {
        let limiter = ConcurrencyLimiter::new(1);
        {
            let _held = limiter.acquire().await.unwrap();
        }
        assert!(limiter.acquire().await.is_ok());
    }
}
