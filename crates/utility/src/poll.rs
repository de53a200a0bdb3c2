use std::{future::Future, time::Duration};

use thiserror::Error;
use tracing::debug;

/// Cadence and deadline shared by every bounded wait in the operator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(500),
            timeout: Duration::from_secs(30),
        }
    }
}

impl PollPolicy {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PollError<E> {
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error(transparent)]
    Aborted(E),
}

/// Runs `step` immediately and then once per `interval` until it yields a value,
/// fails, or the policy deadline passes.
///
/// `Ok(None)` from the step means "not yet", anything else ends the loop.
pub async fn poll_until<T, E, F, Fut>(policy: PollPolicy, mut step: F) -> Result<T, PollError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, E>>,
{
    let attempts = async {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match step().await {
                Ok(Some(value)) => return Ok(value),
                Ok(None) => {
                    debug!(attempt, "⏳ Condition not met yet, polling again");
                    tokio::time::sleep(policy.interval).await;
                }
                Err(e) => return Err(PollError::Aborted(e)),
            }
        }
    };

    match tokio::time::timeout(policy.timeout, attempts).await {
        Ok(result) => result,
        Err(_) => Err(PollError::Timeout(policy.timeout)),
    }
}
