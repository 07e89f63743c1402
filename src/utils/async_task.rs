use std::time::Duration;

use rand::Rng;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio::time::timeout;
use tracing::error;
use tracing::warn;

use crate::BackoffPolicy;
use crate::Error;
use crate::Result;
use crate::SystemError;

/// Run `task` until it succeeds, retrying retryable failures with
/// exponential backoff as described by `policy`.
///
/// Every attempt is bounded by `policy.timeout_ms`. Non-retryable errors are
/// returned at once. `max_retries == 0` retries until success.
pub(crate) async fn task_with_timeout_and_exponential_backoff<F, T, P>(
    task: F,
    policy: BackoffPolicy,
) -> Result<P>
where
    F: Fn() -> T,
    T: std::future::Future<Output = Result<P>>,
{
    let timeout_duration = Duration::from_millis(policy.timeout_ms);
    let mut attempt = 0;

    loop {
        let error = match timeout(timeout_duration, task()).await {
            Ok(Ok(r)) => return Ok(r),
            Ok(Err(e)) if !e.is_retryable() => return Err(e),
            Ok(Err(e)) => {
                warn!(attempt, "Retryable task failure: {:?}", e);
                e
            }
            Err(_) => {
                warn!(attempt, ?timeout_duration, "Task attempt timed out");
                Error::System(SystemError::RetryTimeout(timeout_duration))
            }
        };

        attempt += 1;
        if policy.max_retries != 0 && attempt >= policy.max_retries {
            warn!("Task failed after {} attempts", attempt);
            return Err(error);
        }
        sleep(exponential_delay(&policy, attempt)).await;
    }
}

/// Delay before retry number `attempt` (1-based): `base * 2^(attempt-1)`,
/// capped at `max_delay_ms`
pub(crate) fn exponential_delay(
    policy: &BackoffPolicy,
    attempt: usize,
) -> Duration {
    let shift = attempt.saturating_sub(1).min(16) as u32;
    let delay = policy
        .base_delay_ms
        .saturating_mul(1u64 << shift)
        .min(policy.max_delay_ms);
    Duration::from_millis(delay)
}

/// Exponential delay with jitter in `[base / 2, delay]`, so contending
/// instances do not retry in lockstep
pub(crate) fn jittered_delay(
    policy: &BackoffPolicy,
    attempt: usize,
) -> Duration {
    let upper = exponential_delay(policy, attempt).as_millis() as u64;
    let lower = (policy.base_delay_ms / 2).min(upper);
    Duration::from_millis(rand::thread_rng().gen_range(lower..=upper))
}

/// Spawn a named background task, logging its failure
pub(crate) fn spawn_task<F, Fut>(
    name: &str,
    task_fn: F,
) -> JoinHandle<()>
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: std::future::Future<Output = Result<()>> + Send + 'static,
{
    let name = name.to_string();
    tokio::spawn(async move {
        if let Err(e) = task_fn().await {
            error!("spawned task: {name} stopped or encountered an error: {:?}", e);
        }
    })
}
