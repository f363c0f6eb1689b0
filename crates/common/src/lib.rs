//! Shared types for the stall reservation service.

pub mod identity;
pub mod types;

pub use identity::{IdentityContext, Role, UnknownRole};
pub use types::{GenreId, Money, ReservationId, StallId, UserId};
