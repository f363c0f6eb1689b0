//! Storage layer for stalls, reservations and genres.
//!
//! Every read-modify-write runs inside a [`UnitOfWork`] handed out by a
//! [`BookingStore`]. Two implementations are provided: an in-memory arena
//! for tests and single-process use, and PostgreSQL.

pub mod error;
pub mod genre;
pub mod memory;
pub mod postgres;
pub mod reservation;
pub mod stall;
pub mod store;

pub use common::{GenreId, Money, ReservationId, StallId, UserId};
pub use error::{Result, StoreError};
pub use genre::{Genre, GenreStore};
pub use memory::{InMemoryBookingStore, InMemoryUnit};
pub use postgres::{PostgresBookingStore, PostgresUnit};
pub use reservation::{
    NewReservation, Reservation, ReservationQuery, ReservationStatistics, ReservationStatus,
    ReservationStatusCounts, ReservationStore,
};
pub use stall::{
    Stall, StallFilter, StallSize, StallSizeCounts, StallStatistics, StallStatus,
    StallStatusCounts, StallStore,
};
pub use store::{BookingStore, BookingStoreExt, UnitOfWork};
