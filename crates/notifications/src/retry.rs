//! Bounded retry with exponential backoff.

use std::time::Duration;

use tracing::warn;

use crate::error::{NotificationError, Result};
use crate::message::ConfirmationMessage;
use crate::notifier::Notifier;

/// How often and how patiently a confirmation is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, the first one included. Zero is treated as one.
    pub max_attempts: u32,

    /// Delay before the second attempt.
    pub initial_backoff: Duration,

    /// Factor applied to the delay after each failed retry.
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(200),
            multiplier: 2,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy with the default multiplier.
    pub fn new(max_attempts: u32, initial_backoff: Duration) -> Self {
        Self {
            max_attempts,
            initial_backoff,
            ..Self::default()
        }
    }

    /// A policy that never retries.
    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Delay to wait after the given failed attempt (1-based).
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        let factor = self
            .multiplier
            .saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff.saturating_mul(factor)
    }

    /// Sends `message` through `notifier`, retrying failures per this policy.
    pub async fn deliver<N: Notifier + ?Sized>(
        &self,
        notifier: &N,
        message: &ConfirmationMessage,
    ) -> Result<()> {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match notifier.send_confirmation(message).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt >= max_attempts => {
                    return Err(NotificationError::RetriesExhausted {
                        attempts: attempt,
                        last_error: e.to_string(),
                    });
                }
                Err(e) => {
                    let delay = self.backoff_after(attempt);
                    warn!(
                        reservation_id = %message.reservation_id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Confirmation attempt failed, retrying"
                    );
                    metrics::counter!("notification_retries_total").increment(1);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
