use async_trait::async_trait;
use common::{GenreId, ReservationId, StallId, UserId};

use crate::{
    Genre, GenreStore, Reservation, ReservationQuery, ReservationStatistics, ReservationStore, Result, Stall,
    StallFilter, StallStatistics, StallStore,
};

/// An atomic unit of work over stalls and reservations.
///
/// Writes become visible to other units only on `commit`; dropping the unit
/// without committing discards them. Locks taken with `lock_stall` and
/// `lock_user` are held until the unit is committed or dropped.
///
/// Lock order is stall before user. A unit takes at most one stall lock.
#[async_trait]
pub trait UnitOfWork: StallStore + ReservationStore + GenreStore + Send {
    /// Serializes this unit against every other unit that locks the same stall.
    async fn lock_stall(&mut self, id: StallId) -> Result<()>;

    /// Serializes this unit against every other unit that locks the same user.
    async fn lock_user(&mut self, user_id: &UserId) -> Result<()>;

    /// Atomically publishes all writes made through this unit.
    async fn commit(self) -> Result<()>;
}

/// Entry point to a booking store implementation.
///
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait BookingStore: Send + Sync {
    /// The unit of work type handed out by `begin`.
    type Unit: UnitOfWork + 'static;

    /// Starts a new unit of work.
    async fn begin(&self) -> Result<Self::Unit>;
}

/// Extension trait providing read-only convenience methods.
///
/// Each call runs in its own unit of work that is never committed, so it
/// only observes committed state.
#[async_trait]
pub trait BookingStoreExt: BookingStore {
    /// Loads a stall by ID.
    async fn get_stall(&self, id: StallId) -> Result<Option<Stall>> {
        self.begin().await?.get_stall(id).await
    }

    /// Lists stalls matching the filter.
    async fn list_stalls(&self, filter: &StallFilter) -> Result<Vec<Stall>> {
        self.begin().await?.list_stalls(filter).await
    }

    /// Loads a reservation by ID.
    async fn get_reservation(&self, id: ReservationId) -> Result<Option<Reservation>> {
        self.begin().await?.get_reservation(id).await
    }

    /// Lists reservations matching the query.
    async fn list_reservations(&self, query: &ReservationQuery) -> Result<Vec<Reservation>> {
        self.begin().await?.list_reservations(query).await
    }

    /// Lists the active reservations on a stall.
    async fn list_active_for_stall(&self, stall_id: StallId) -> Result<Vec<Reservation>> {
        self.begin().await?.list_active_for_stall(stall_id).await
    }

    /// Aggregates reservation counts and revenue.
    async fn reservation_statistics(&self) -> Result<ReservationStatistics> {
        self.begin().await?.reservation_statistics().await
    }

    /// Aggregates stall counts.
    async fn stall_statistics(&self) -> Result<StallStatistics> {
        self.begin().await?.stall_statistics().await
    }

    /// Loads a genre by ID.
    async fn get_genre(&self, id: GenreId) -> Result<Option<Genre>> {
        self.begin().await?.get_genre(id).await
    }

    /// Lists every genre ordered by name.
    async fn list_genres(&self) -> Result<Vec<Genre>> {
        self.begin().await?.list_genres().await
    }
}

// Blanket implementation for all BookingStore implementations
impl<T: BookingStore + ?Sized> BookingStoreExt for T {}
