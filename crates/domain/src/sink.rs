//! Post-commit hand-off of confirmed reservations.

use std::sync::Arc;

use crate::engine::ReservationDetails;

/// Receives every reservation the engine confirms.
///
/// Called after the unit of work has committed and every lock is released.
/// Implementations must return promptly: delivery happens elsewhere and its
/// outcome never reaches the caller of `reserve`.
pub trait ConfirmationSink: Send + Sync {
    /// Accepts a confirmed reservation for delivery.
    fn reservation_confirmed(&self, details: &ReservationDetails);
}

/// Sink that discards every confirmation.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl ConfirmationSink for NoopSink {
    fn reservation_confirmed(&self, _details: &ReservationDetails) {}
}

impl<T: ConfirmationSink + ?Sized> ConfirmationSink for Arc<T> {
    fn reservation_confirmed(&self, details: &ReservationDetails) {
        (**self).reservation_confirmed(details)
    }
}
