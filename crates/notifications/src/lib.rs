//! Reservation confirmation delivery.
//!
//! This crate provides:
//! - [`Notifier`]: the delivery transport, with a logging and a recording
//!   implementation
//! - [`RetryPolicy`]: bounded attempts with exponential backoff
//! - [`NotificationDispatcher`]: the engine's confirmation sink, backed by a
//!   bounded queue and a background worker

pub mod dispatcher;
pub mod error;
pub mod message;
pub mod notifier;
pub mod retry;

pub use dispatcher::{DEFAULT_QUEUE_CAPACITY, NotificationDispatcher};
pub use error::{NotificationError, Result};
pub use message::ConfirmationMessage;
pub use notifier::{LogNotifier, Notifier, RecordingNotifier};
pub use retry::RetryPolicy;
