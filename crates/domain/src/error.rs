//! Domain error types.

use booking_store::{GenreId, ReservationId, StallId, StallStatus, StoreError};
use thiserror::Error;

/// Errors that can occur during allocation and catalog operations.
#[derive(Debug, Error)]
pub enum AllocationError {
    /// The stall does not exist.
    #[error("Stall not found: {0}")]
    StallNotFound(StallId),

    /// The reservation does not exist.
    #[error("Reservation not found: {0}")]
    ReservationNotFound(ReservationId),

    /// The genre does not exist.
    #[error("Genre not found: {0}")]
    GenreNotFound(GenreId),

    /// The stall is reserved or under maintenance.
    #[error("Stall {stall_id} is not available (current status: {status})")]
    StallUnavailable {
        stall_id: StallId,
        status: StallStatus,
    },

    /// Another reservation won the stall between check and commit.
    #[error("Stall {0} was taken by a concurrent reservation")]
    LostRace(StallId),

    /// The caller already holds an active reservation on this stall.
    #[error("You have already booked stall {0}")]
    AlreadyBooked(StallId),

    /// The reservation was cancelled earlier.
    #[error("Reservation {0} is already cancelled")]
    AlreadyCancelled(ReservationId),

    /// The stall has an active reservation that blocks the admin change.
    #[error("Stall {0} has an active reservation")]
    StallInUse(StallId),

    /// Another stall already uses this code.
    #[error("Stall with code '{0}' already exists")]
    DuplicateStallCode(String),

    /// Another genre already uses this name.
    #[error("Genre '{0}' already exists")]
    DuplicateGenreName(String),

    /// The caller holds the maximum number of active reservations.
    #[error("You have reached the maximum limit of {limit} active reservations")]
    QuotaExceeded { limit: usize },

    /// The caller may not perform this operation.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The request is malformed.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A confirmation could not be delivered.
    #[error("Notification failed: {0}")]
    NotificationFailure(String),

    /// An error occurred in the booking store.
    #[error("Store error: {0}")]
    Store(StoreError),
}

/// Stable classification of [`AllocationError`] used at the HTTP boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    QuotaExceeded,
    Forbidden,
    Validation,
    NotificationFailure,
    Internal,
}

impl ErrorKind {
    /// Returns the kind name as rendered in error bodies.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::QuotaExceeded => "quota_exceeded",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::Validation => "validation",
            ErrorKind::NotificationFailure => "notification_failure",
            ErrorKind::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl AllocationError {
    /// Returns the stable kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            AllocationError::StallNotFound(_)
            | AllocationError::ReservationNotFound(_)
            | AllocationError::GenreNotFound(_) => ErrorKind::NotFound,
            AllocationError::StallUnavailable { .. }
            | AllocationError::LostRace(_)
            | AllocationError::AlreadyBooked(_)
            | AllocationError::AlreadyCancelled(_)
            | AllocationError::StallInUse(_)
            | AllocationError::DuplicateStallCode(_)
            | AllocationError::DuplicateGenreName(_) => ErrorKind::Conflict,
            AllocationError::QuotaExceeded { .. } => ErrorKind::QuotaExceeded,
            AllocationError::Forbidden(_) => ErrorKind::Forbidden,
            AllocationError::Validation(_) => ErrorKind::Validation,
            AllocationError::NotificationFailure(_) => ErrorKind::NotificationFailure,
            AllocationError::Store(_) => ErrorKind::Internal,
        }
    }

    /// Returns true if this error is a conflict of any flavour.
    pub fn is_conflict(&self) -> bool {
        self.kind() == ErrorKind::Conflict
    }
}

impl From<StoreError> for AllocationError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::StallNotFound(id) => AllocationError::StallNotFound(id),
            StoreError::ReservationNotFound(id) => AllocationError::ReservationNotFound(id),
            StoreError::DuplicateStallCode(code) => AllocationError::DuplicateStallCode(code),
            StoreError::GenreNotFound(id) => AllocationError::GenreNotFound(id),
            StoreError::DuplicateGenreName(name) => AllocationError::DuplicateGenreName(name),
            StoreError::AlreadyCancelled(id) => AllocationError::AlreadyCancelled(id),
            StoreError::TransitionConflict { stall_id } => AllocationError::LostRace(stall_id),
            other => AllocationError::Store(other),
        }
    }
}

/// Result type for domain operations.
pub type Result<T> = std::result::Result<T, AllocationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_conflicts_map_to_conflict_kind() {
        let stall_id = StallId::new();
        let err: AllocationError = StoreError::TransitionConflict { stall_id }.into();
        assert!(matches!(err, AllocationError::LostRace(id) if id == stall_id));
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let err: AllocationError = StoreError::DuplicateStallCode("A1".into()).into();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[test]
    fn genre_store_errors_keep_their_kind() {
        let err: AllocationError = StoreError::DuplicateGenreName("Fiction".into()).into();
        assert!(matches!(err, AllocationError::DuplicateGenreName(ref name) if name == "Fiction"));
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let err: AllocationError = StoreError::GenreNotFound(GenreId::new()).into();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn store_failures_are_internal() {
        let err: AllocationError = StoreError::InvalidData("bad row".into()).into();
        assert_eq!(err.kind(), ErrorKind::Internal);
    }

    #[test]
    fn quota_message_names_limit() {
        let err = AllocationError::QuotaExceeded { limit: 3 };
        assert_eq!(err.kind(), ErrorKind::QuotaExceeded);
        assert!(err.to_string().contains("3 active reservations"));
    }
}
