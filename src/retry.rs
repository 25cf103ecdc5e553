use crate::client::ConnectError;
use log::{info, warn};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

pub const CONNECT_ATTEMPTS: u32 = 10;
pub const INITIAL_RETRY_DELAY: Duration = Duration::from_millis(250);

/// Exponential backoff for the initial connect: the delay doubles after each
/// not-ready failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub initial_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: CONNECT_ATTEMPTS,
            initial_delay: INITIAL_RETRY_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Delay before attempt `attempt + 1`, counting attempts from zero.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.initial_delay
            .saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// Runs `attempt` until it succeeds, fails with an error outside the
/// not-ready class, or the policy runs out of attempts. The closure gets the
/// zero-based attempt number.
pub async fn connect_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    mut attempt: F,
) -> Result<T, ConnectError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, ConnectError>>,
{
    let attempts = policy.attempts.max(1);
    let mut n = 0;
    loop {
        match attempt(n).await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_not_ready() && n + 1 < attempts => {
                let delay = policy.delay_after(n);
                warn!(target: "Connection", "Connection attempt {} failed: {e}", n + 1);
                info!(target: "Connection", "Waiting {delay:?} and will try connecting again...");
                sleep(delay).await;
                n += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
