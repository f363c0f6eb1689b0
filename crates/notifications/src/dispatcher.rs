//! Background delivery of reservation confirmations.
//!
//! The engine hands each confirmed reservation to the dispatcher after
//! commit. The dispatcher only enqueues; a worker task resolves the
//! recipient and delivers with retries, so delivery latency and failures
//! never reach the booking path.

use std::sync::Arc;

use domain::{ConfirmationSink, ReservationDetails, UserDirectory};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::error::{NotificationError, Result};
use crate::message::ConfirmationMessage;
use crate::notifier::Notifier;
use crate::retry::RetryPolicy;

/// Default number of confirmations that may wait for the worker.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

struct Delivery {
    directory: Arc<dyn UserDirectory>,
    notifier: Arc<dyn Notifier>,
    policy: RetryPolicy,
}

impl Delivery {
    async fn deliver(&self, details: &ReservationDetails) -> Result<ConfirmationMessage> {
        let user_id = &details.reservation.user_id;
        let recipient = self
            .directory
            .find_user(user_id)
            .await?
            .ok_or_else(|| NotificationError::RecipientUnknown(user_id.clone()))?;

        let message = ConfirmationMessage::new(details, &recipient);
        match self.policy.deliver(self.notifier.as_ref(), &message).await {
            Ok(()) => {
                metrics::counter!("notifications_sent_total").increment(1);
                info!(
                    reservation_id = %message.reservation_id,
                    to = %message.recipient_email,
                    "Confirmation delivered"
                );
                Ok(message)
            }
            Err(e) => {
                metrics::counter!("notifications_failed_total").increment(1);
                Err(e)
            }
        }
    }
}

/// Queues confirmations for a background worker and sends them on demand.
#[derive(Clone)]
pub struct NotificationDispatcher {
    delivery: Arc<Delivery>,
    sender: mpsc::Sender<ReservationDetails>,
}

impl NotificationDispatcher {
    /// Starts the worker and returns the dispatcher feeding it.
    ///
    /// The worker exits once every dispatcher clone has been dropped and the
    /// queue is drained. Must be called from within a tokio runtime.
    pub fn spawn(
        directory: Arc<dyn UserDirectory>,
        notifier: Arc<dyn Notifier>,
        policy: RetryPolicy,
        capacity: usize,
    ) -> (Self, JoinHandle<()>) {
        let delivery = Arc::new(Delivery {
            directory,
            notifier,
            policy,
        });
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let worker = tokio::spawn(run_worker(delivery.clone(), receiver));
        (Self { delivery, sender }, worker)
    }

    /// Returns the retry policy used for every delivery.
    pub fn policy(&self) -> RetryPolicy {
        self.delivery.policy
    }

    /// Queues a confirmation without waiting.
    pub fn enqueue(&self, details: ReservationDetails) -> Result<()> {
        self.sender.try_send(details).map_err(|e| match e {
            TrySendError::Full(_) => NotificationError::QueueFull,
            TrySendError::Closed(_) => NotificationError::WorkerStopped,
        })
    }

    /// Delivers a confirmation now, with retries, and returns what was sent.
    #[tracing::instrument(skip(self, details), fields(reservation_id = %details.reservation.id))]
    pub async fn send_now(&self, details: &ReservationDetails) -> Result<ConfirmationMessage> {
        self.delivery.deliver(details).await
    }
}

impl ConfirmationSink for NotificationDispatcher {
    fn reservation_confirmed(&self, details: &ReservationDetails) {
        if let Err(e) = self.enqueue(details.clone()) {
            metrics::counter!("notifications_dropped_total").increment(1);
            error!(
                reservation_id = %details.reservation.id,
                error = %e,
                "Confirmation dropped"
            );
        }
    }
}

async fn run_worker(delivery: Arc<Delivery>, mut receiver: mpsc::Receiver<ReservationDetails>) {
    debug!("Notification worker started");
    while let Some(details) = receiver.recv().await {
        if let Err(e) = delivery.deliver(&details).await {
            error!(
                reservation_id = %details.reservation.id,
                error = %e,
                "Confirmation could not be delivered"
            );
        }
    }
    debug!("Notification worker stopped");
}
