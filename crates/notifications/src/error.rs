//! Notification error types.

use common::UserId;
use domain::AllocationError;
use thiserror::Error;

/// Errors that can occur while delivering a confirmation.
#[derive(Debug, Error)]
pub enum NotificationError {
    /// The transport rejected or failed to deliver the message.
    #[error("Delivery failed: {0}")]
    Delivery(String),

    /// The user directory has no contact details for the recipient.
    #[error("No contact details for user {0}")]
    RecipientUnknown(UserId),

    /// Every attempt allowed by the retry policy failed.
    #[error("Gave up after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    /// The background queue is full.
    #[error("Notification queue is full")]
    QueueFull,

    /// The background worker has stopped.
    #[error("Notification worker is not running")]
    WorkerStopped,

    /// The user directory failed.
    #[error("Directory error: {0}")]
    Directory(#[from] AllocationError),
}

/// Result type for notification operations.
pub type Result<T> = std::result::Result<T, NotificationError>;
