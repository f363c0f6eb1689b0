//! Domain layer for stall reservations.
//!
//! This crate provides:
//! - [`AllocationEngine`]: reserve and cancel with exclusivity and quota
//!   guarantees, plus reservation queries and statistics
//! - [`StallCatalog`]: stall administration and browsing
//! - [`GenreCatalog`]: the genre list exhibitors pick from
//! - Collaborator contracts: [`ConfirmationSink`] for post-commit
//!   notifications and [`UserDirectory`] for contact details

pub mod catalog;
pub mod commands;
pub mod directory;
pub mod engine;
pub mod error;
pub mod genres;
pub mod sink;

pub use catalog::{StallCatalog, StallDetails};
pub use commands::{CreateGenre, CreateStall, UpdateGenre, UpdateStall};
pub use directory::{InMemoryUserDirectory, UserDirectory, UserProfile};
pub use engine::{
    AllocationEngine, AllocationPolicy, DEFAULT_MAX_ACTIVE_RESERVATIONS, MAX_RESERVATION_AMOUNT,
    ReservationDetails,
};
pub use error::{AllocationError, ErrorKind, Result};
pub use genres::{GenreCatalog, GenreList};
pub use sink::{ConfirmationSink, NoopSink};
