use std::time::Duration;

use futures::future::BoxFuture;
use tracing::{error, warn};

use crate::error::HarvestError;

const MAX_ATTEMPTS: u32 = 3;
const RETRY_DELAY: Duration = Duration::from_secs(2);

/// Fixed-count, fixed-delay retry schedule.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            attempts: MAX_ATTEMPTS,
            delay: RETRY_DELAY,
        }
    }
}

/// Run `op` against `state` until it succeeds or `policy.attempts` runs fail,
/// returning the last failure. Fatal (storage) errors are returned at once.
///
/// The operation borrows `state` afresh on every attempt, so a step that needs
/// `&mut` access to a browser session can be retried without cloning it.
pub async fn retry<S, T, F>(
    policy: &RetryPolicy,
    step: &str,
    state: &mut S,
    mut op: F,
) -> Result<T, HarvestError>
where
    S: ?Sized,
    F: for<'a> FnMut(&'a mut S) -> BoxFuture<'a, Result<T, HarvestError>>,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;
    loop {
        match op(&mut *state).await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) if attempt >= attempts => {
                error!(step, attempts, "Step failed after {} attempts: {}", attempts, e);
                return Err(e);
            }
            Err(e) => {
                warn!(
                    step,
                    "Step failed, retrying {}/{} in {:.1}s: {}",
                    attempt,
                    attempts,
                    policy.delay.as_secs_f64(),
                    e
                );
                tokio::time::sleep(policy.delay).await;
                attempt += 1;
            }
        }
    }
}
