use std::future::Future;
use std::time::Duration;

use rand::Rng;

const MAX_ATTEMPTS: u32 = 3;
const BASE_DELAY: Duration = Duration::from_secs(1);

/// Retries `op` up to [`MAX_ATTEMPTS`] times with exponential backoff and
/// jitter, stopping early on a permanent failure (§5 retry policy).
pub async fn with_backoff<T, E, F, Fut>(mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsTransient,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt >= MAX_ATTEMPTS || !err.is_transient() => return Err(err),
            Err(_) => {
                tokio::time::sleep(backoff_delay(attempt)).await;
            }
        }
    }
}

pub trait IsTransient {
    fn is_transient(&self) -> bool;
}

fn backoff_delay(attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1);
    let base = BASE_DELAY * 2u32.saturating_pow(exponent);
    let jitter_ms = rand::thread_rng().gen_range(0..250);
    base + Duration::from_millis(jitter_ms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Transient;
    impl IsTransient for Transient {
        fn is_transient(&self) -> bool {
            true
        }
    }

    struct Permanent;
    impl IsTransient for Permanent {
        fn is_transient(&self) -> bool {
            false
        }
    }

    #[tokio::test]
    async fn retries_transient_failures_up_to_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<(), Transient> = with_backoff(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Transient) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), MAX_ATTEMPTS);
    }

    #[tokio::test]
    async fn does_not_retry_permanent_failures() {
        let calls = AtomicU32::new(0);
        let result: Result<(), Permanent> = with_backoff(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Permanent) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn succeeds_without_retrying_further_once_op_succeeds() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, Transient> = with_backoff(|| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move { if n < 1 { Err(Transient) } else { Ok(42) } }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
