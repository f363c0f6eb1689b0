use thiserror::Error;

use common::{GenreId, ReservationId, StallId};

/// Errors that can occur when interacting with the booking store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The stall does not exist.
    #[error("Stall not found: {0}")]
    StallNotFound(StallId),

    /// The reservation does not exist.
    #[error("Reservation not found: {0}")]
    ReservationNotFound(ReservationId),

    /// Another stall already uses this code.
    #[error("Stall with code '{0}' already exists")]
    DuplicateStallCode(String),

    /// The genre does not exist.
    #[error("Genre not found: {0}")]
    GenreNotFound(GenreId),

    /// Another genre already uses this name.
    #[error("Genre '{0}' already exists")]
    DuplicateGenreName(String),

    /// The reservation has already been cancelled.
    #[error("Reservation {0} is already cancelled")]
    AlreadyCancelled(ReservationId),

    /// A conditional status transition was overtaken by a concurrent writer.
    #[error("Concurrent status change on stall {stall_id}")]
    TransitionConflict { stall_id: StallId },

    /// A stored value could not be interpreted.
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Result type for booking store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
