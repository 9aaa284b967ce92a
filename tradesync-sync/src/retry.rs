//! Timeout + exponential backoff around a single collaborator call.

use std::future::Future;
use std::time::Duration;

use rand::Rng;

use tradesync_core::RetryPolicy;

use crate::error::CollaboratorError;

/// Run `call` until it succeeds, fails permanently, or `policy.max_attempts`
/// attempts have failed transiently.
///
/// Each attempt is bounded by `timeout`; an expired attempt counts as a
/// transient failure. When every attempt fails, the last transient error is
/// returned unchanged.
pub async fn call_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    timeout: Duration,
    what: &str,
    mut call: F,
) -> Result<T, CollaboratorError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CollaboratorError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        let outcome = match tokio::time::timeout(timeout, call()).await {
            Ok(result) => result,
            Err(_) => Err(CollaboratorError::Transient(format!(
                "{what} timed out after {}ms",
                timeout.as_millis()
            ))),
        };

        let err = match outcome {
            Ok(value) => return Ok(value),
            Err(err) if !err.is_transient() => return Err(err),
            Err(err) => err,
        };

        if attempt >= max_attempts {
            tracing::warn!(call = what, attempts = attempt, error = %err, "giving up after retries");
            return Err(err);
        }

        let delay = backoff_delay(policy, attempt);
        tracing::warn!(
            call = what,
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "transient failure, retrying after backoff",
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

/// Jittered delay after failed attempt `attempt`.
pub fn backoff_delay(policy: &RetryPolicy, attempt: u32) -> Duration {
    let unit = if policy.jitter > 0.0 {
        rand::thread_rng().gen_range(-1.0..=1.0)
    } else {
        0.0
    };
    policy.delay_with_jitter(attempt, unit)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};

    use tokio::time::Instant;

    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(30);

    #[tokio::test(start_paused = true)]
    async fn success_on_first_attempt_calls_once() {
        let calls = AtomicU32::new(0);
        let value = call_with_retry(&RetryPolicy::default(), TIMEOUT, "fetch", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, CollaboratorError>(7) }
        })
        .await
        .unwrap();
        assert_eq!(value, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_error_is_never_retried() {
        let calls = AtomicU32::new(0);
        let err = call_with_retry(&RetryPolicy::default(), TIMEOUT, "push", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(CollaboratorError::Permanent("bad sku".into())) }
        })
        .await
        .unwrap_err();
        assert_eq!(err, CollaboratorError::Permanent("bad sku".into()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_error_surfaces_after_three_attempts_with_growing_delays() {
        let starts = Arc::new(Mutex::new(Vec::<Instant>::new()));
        let err = call_with_retry(&RetryPolicy::default(), TIMEOUT, "fetch", || {
            starts.lock().unwrap().push(Instant::now());
            async { Err::<(), _>(CollaboratorError::Transient("503".into())) }
        })
        .await
        .unwrap_err();

        assert_eq!(err, CollaboratorError::Transient("503".into()));
        let starts = starts.lock().unwrap();
        assert_eq!(starts.len(), 3);

        let first_gap = starts[1] - starts[0];
        let second_gap = starts[2] - starts[1];
        assert!(
            first_gap >= Duration::from_millis(400) && first_gap <= Duration::from_millis(600),
            "first delay {first_gap:?} outside 500ms ±20%"
        );
        assert!(
            second_gap >= Duration::from_millis(800) && second_gap <= Duration::from_millis(1200),
            "second delay {second_gap:?} outside 1000ms ±20%"
        );
        assert!(second_gap > first_gap);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_then_success_recovers() {
        let calls = AtomicU32::new(0);
        let value = call_with_retry(&RetryPolicy::default(), TIMEOUT, "fetch", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(CollaboratorError::Transient("reset".into()))
                } else {
                    Ok("listing")
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(value, "listing");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_counts_as_transient() {
        let calls = AtomicU32::new(0);
        let err = call_with_retry(
            &RetryPolicy::default(),
            Duration::from_millis(100),
            "fetch",
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok::<_, CollaboratorError>(())
                }
            },
        )
        .await
        .unwrap_err();
        assert!(err.is_transient());
        assert!(err.to_string().contains("timed out"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn zero_jitter_gives_nominal_delay() {
        let policy = RetryPolicy {
            jitter: 0.0,
            ..RetryPolicy::default()
        };
        assert_eq!(backoff_delay(&policy, 3), Duration::from_millis(2000));
    }
}
