//! Notifier trait and implementations.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tracing::info;

use crate::error::{NotificationError, Result};
use crate::message::ConfirmationMessage;

/// Delivers confirmation messages to exhibitors.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Sends one confirmation. A single attempt; retries are the caller's job.
    async fn send_confirmation(&self, message: &ConfirmationMessage) -> Result<()>;
}

#[async_trait]
impl<T: Notifier + ?Sized> Notifier for Arc<T> {
    async fn send_confirmation(&self, message: &ConfirmationMessage) -> Result<()> {
        (**self).send_confirmation(message).await
    }
}

/// Notifier that writes each confirmation to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_confirmation(&self, message: &ConfirmationMessage) -> Result<()> {
        info!(
            to = %message.recipient_email,
            subject = %message.subject(),
            reservation_id = %message.reservation_id,
            "Confirmation sent"
        );
        Ok(())
    }
}

#[derive(Debug, Default)]
struct RecordingState {
    sent: Vec<ConfirmationMessage>,
    attempts: u32,
    fail_on_send: bool,
    failures_remaining: u32,
}

/// In-memory notifier for testing.
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    state: Arc<RwLock<RecordingState>>,
}

impl RecordingNotifier {
    /// Creates a new recording notifier.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the notifier to fail every send.
    pub fn set_fail_on_send(&self, fail: bool) {
        self.state.write().unwrap().fail_on_send = fail;
    }

    /// Configures the notifier to fail the next `count` sends.
    pub fn fail_next(&self, count: u32) {
        self.state.write().unwrap().failures_remaining = count;
    }

    /// Returns the messages delivered so far.
    pub fn sent(&self) -> Vec<ConfirmationMessage> {
        self.state.read().unwrap().sent.clone()
    }

    /// Returns the number of delivered messages.
    pub fn sent_count(&self) -> usize {
        self.state.read().unwrap().sent.len()
    }

    /// Returns the number of send attempts, failed ones included.
    pub fn attempts(&self) -> u32 {
        self.state.read().unwrap().attempts
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_confirmation(&self, message: &ConfirmationMessage) -> Result<()> {
        let mut state = self.state.write().unwrap();
        state.attempts += 1;

        if state.fail_on_send {
            return Err(NotificationError::Delivery(
                "SMTP server unavailable".to_string(),
            ));
        }
        if state.failures_remaining > 0 {
            state.failures_remaining -= 1;
            return Err(NotificationError::Delivery(
                "Connection reset by peer".to_string(),
            ));
        }

        state.sent.push(message.clone());
        Ok(())
    }
}
