//! Reservation allocation engine.
//!
//! Every mutating call runs as one unit of work. `reserve` locks the stall
//! first and then the caller, so two requests for the same stall, or two
//! requests by the same user, never interleave their check-and-commit.

use std::time::Instant;

use booking_store::{
    BookingStore, BookingStoreExt, Money, NewReservation, Reservation, ReservationId,
    ReservationQuery, ReservationStatistics, ReservationStatus, ReservationStore, Stall, StallId,
    StallStatus, StallStore, UnitOfWork,
};
use common::IdentityContext;
use serde::Serialize;
use tracing::{info, warn};

use crate::sink::{ConfirmationSink, NoopSink};
use crate::{AllocationError, Result};

/// Default cap on active reservations per user.
pub const DEFAULT_MAX_ACTIVE_RESERVATIONS: usize = 3;

/// Largest amount accepted for a single reservation (one billion in major units).
pub const MAX_RESERVATION_AMOUNT: Money = Money::from_minor(100_000_000_000);

/// Tunable limits applied by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocationPolicy {
    /// Maximum number of PENDING or CONFIRMED reservations a user may hold.
    pub max_active_per_user: usize,
}

impl Default for AllocationPolicy {
    fn default() -> Self {
        Self {
            max_active_per_user: DEFAULT_MAX_ACTIVE_RESERVATIONS,
        }
    }
}

/// A reservation joined with its stall.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationDetails {
    #[serde(flatten)]
    pub reservation: Reservation,
    pub stall: Stall,
}

/// Allocates stalls to users and releases them again.
pub struct AllocationEngine<S: BookingStore, N: ConfirmationSink = NoopSink> {
    store: S,
    sink: N,
    policy: AllocationPolicy,
}

impl<S: BookingStore> AllocationEngine<S> {
    /// Creates an engine that does not send confirmations.
    pub fn new(store: S) -> Self {
        Self::with_sink(store, NoopSink)
    }
}

impl<S: BookingStore, N: ConfirmationSink> AllocationEngine<S, N> {
    /// Creates an engine that hands confirmed reservations to `sink`.
    pub fn with_sink(store: S, sink: N) -> Self {
        Self {
            store,
            sink,
            policy: AllocationPolicy::default(),
        }
    }

    /// Replaces the allocation policy.
    pub fn with_policy(mut self, policy: AllocationPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Returns the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Returns the active policy.
    pub fn policy(&self) -> AllocationPolicy {
        self.policy
    }

    /// Reserves a stall for the caller at the agreed amount.
    ///
    /// On success the stall is RESERVED and the new reservation CONFIRMED,
    /// both committed together. On failure nothing is written.
    #[tracing::instrument(skip(self, identity), fields(user_id = %identity.user_id))]
    pub async fn reserve(
        &self,
        identity: &IdentityContext,
        stall_id: StallId,
        total_amount: Money,
    ) -> Result<ReservationDetails> {
        let start = Instant::now();

        if total_amount.is_negative() {
            return Err(AllocationError::Validation(
                "total amount must not be negative".to_string(),
            ));
        }
        if total_amount > MAX_RESERVATION_AMOUNT {
            return Err(AllocationError::Validation(format!(
                "total amount must not exceed {MAX_RESERVATION_AMOUNT}"
            )));
        }

        let result = self.allocate(identity, stall_id, total_amount).await;

        metrics::histogram!("reservation_duration_seconds").record(start.elapsed().as_secs_f64());

        match &result {
            Ok(details) => {
                metrics::counter!("reservations_created_total").increment(1);
                info!(
                    reservation_id = %details.reservation.id,
                    stall_code = %details.stall.code,
                    "Reservation confirmed"
                );
                self.sink.reservation_confirmed(details);
            }
            Err(e) if e.is_conflict() => {
                metrics::counter!("reservation_conflicts_total").increment(1);
                warn!(error = %e, "Reservation rejected");
            }
            Err(e) => warn!(error = %e, "Reservation rejected"),
        }

        result
    }

    async fn allocate(
        &self,
        identity: &IdentityContext,
        stall_id: StallId,
        total_amount: Money,
    ) -> Result<ReservationDetails> {
        let user_id = &identity.user_id;
        let mut unit = self.store.begin().await?;

        unit.lock_stall(stall_id).await?;
        let stall = unit
            .get_stall(stall_id)
            .await?
            .ok_or(AllocationError::StallNotFound(stall_id))?;
        if stall.status != StallStatus::Available {
            return Err(AllocationError::StallUnavailable {
                stall_id,
                status: stall.status,
            });
        }

        unit.lock_user(user_id).await?;
        let limit = self.policy.max_active_per_user;
        if unit.count_active(user_id).await? >= limit {
            return Err(AllocationError::QuotaExceeded { limit });
        }
        if unit.has_active(user_id, stall_id).await? {
            return Err(AllocationError::AlreadyBooked(stall_id));
        }

        if !unit
            .try_transition(stall_id, StallStatus::Available, StallStatus::Reserved)
            .await?
        {
            return Err(AllocationError::LostRace(stall_id));
        }
        let reservation = unit
            .insert_active(NewReservation::confirmed(
                user_id.clone(),
                stall_id,
                total_amount,
            ))
            .await?;
        let stall = unit
            .get_stall(stall_id)
            .await?
            .ok_or(AllocationError::StallNotFound(stall_id))?;

        unit.commit().await?;
        Ok(ReservationDetails { reservation, stall })
    }

    /// Cancels a reservation and frees its stall.
    ///
    /// The caller must own the reservation or be an admin. If the stall is
    /// no longer RESERVED the cancellation still commits and the stall is
    /// left as it is.
    #[tracing::instrument(skip(self, identity), fields(user_id = %identity.user_id))]
    pub async fn cancel(
        &self,
        identity: &IdentityContext,
        reservation_id: ReservationId,
    ) -> Result<ReservationDetails> {
        let existing = self
            .store
            .get_reservation(reservation_id)
            .await?
            .ok_or(AllocationError::ReservationNotFound(reservation_id))?;
        authorize_owner(identity, &existing)?;

        let stall_id = existing.stall_id;
        let mut unit = self.store.begin().await?;
        unit.lock_stall(stall_id).await?;

        let current = unit
            .get_reservation(reservation_id)
            .await?
            .ok_or(AllocationError::ReservationNotFound(reservation_id))?;
        if current.status == ReservationStatus::Cancelled {
            return Err(AllocationError::AlreadyCancelled(reservation_id));
        }

        let reservation = unit.cancel_reservation(reservation_id).await?;
        let released = unit
            .try_transition(stall_id, StallStatus::Reserved, StallStatus::Available)
            .await?;
        let stall = unit
            .get_stall(stall_id)
            .await?
            .ok_or(AllocationError::StallNotFound(stall_id))?;

        unit.commit().await?;

        metrics::counter!("reservations_cancelled_total").increment(1);
        if released {
            info!(%reservation_id, stall_code = %stall.code, "Reservation cancelled");
        } else {
            warn!(
                %reservation_id,
                stall_status = %stall.status,
                "Reservation cancelled; stall was not reserved and is left untouched"
            );
        }

        Ok(ReservationDetails { reservation, stall })
    }

    /// Loads one reservation with its stall. Owner or admin only.
    #[tracing::instrument(skip(self, identity), fields(user_id = %identity.user_id))]
    pub async fn get_reservation(
        &self,
        identity: &IdentityContext,
        reservation_id: ReservationId,
    ) -> Result<ReservationDetails> {
        let mut unit = self.store.begin().await?;
        let reservation = unit
            .get_reservation(reservation_id)
            .await?
            .ok_or(AllocationError::ReservationNotFound(reservation_id))?;
        authorize_owner(identity, &reservation)?;
        let stall = unit
            .get_stall(reservation.stall_id)
            .await?
            .ok_or(AllocationError::StallNotFound(reservation.stall_id))?;
        Ok(ReservationDetails { reservation, stall })
    }

    /// Lists the caller's reservations, newest first.
    #[tracing::instrument(skip(self, identity), fields(user_id = %identity.user_id))]
    pub async fn list_my_reservations(
        &self,
        identity: &IdentityContext,
    ) -> Result<Vec<ReservationDetails>> {
        self.list_with_stalls(&ReservationQuery::for_user(identity.user_id.clone()))
            .await
    }

    /// Lists every reservation, newest first. Admin only.
    #[tracing::instrument(skip(self, identity), fields(user_id = %identity.user_id))]
    pub async fn list_all_reservations(
        &self,
        identity: &IdentityContext,
    ) -> Result<Vec<ReservationDetails>> {
        require_admin(identity)?;
        self.list_with_stalls(&ReservationQuery::new()).await
    }

    /// Aggregates committed reservations. Admin only.
    #[tracing::instrument(skip(self, identity), fields(user_id = %identity.user_id))]
    pub async fn statistics(&self, identity: &IdentityContext) -> Result<ReservationStatistics> {
        require_admin(identity)?;
        Ok(self.store.reservation_statistics().await?)
    }

    async fn list_with_stalls(&self, query: &ReservationQuery) -> Result<Vec<ReservationDetails>> {
        let mut unit = self.store.begin().await?;
        let reservations = unit.list_reservations(query).await?;

        let mut details = Vec::with_capacity(reservations.len());
        for reservation in reservations {
            // A stall deleted after the listing took its history with it.
            if let Some(stall) = unit.get_stall(reservation.stall_id).await? {
                details.push(ReservationDetails { reservation, stall });
            }
        }
        Ok(details)
    }
}

pub(crate) fn require_admin(identity: &IdentityContext) -> Result<()> {
    if identity.is_admin() {
        Ok(())
    } else {
        Err(AllocationError::Forbidden(
            "administrator role required".to_string(),
        ))
    }
}

fn authorize_owner(identity: &IdentityContext, reservation: &Reservation) -> Result<()> {
    if identity.can_act_for(&reservation.user_id) {
        Ok(())
    } else {
        Err(AllocationError::Forbidden(
            "you can only access your own reservations".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use booking_store::{InMemoryBookingStore, StallSize};

    use super::*;
    use crate::ErrorKind;

    #[derive(Default)]
    struct CollectingSink {
        seen: Mutex<Vec<ReservationId>>,
    }

    impl ConfirmationSink for CollectingSink {
        fn reservation_confirmed(&self, details: &ReservationDetails) {
            self.seen.lock().unwrap().push(details.reservation.id);
        }
    }

    async fn seed_stall(store: &InMemoryBookingStore, code: &str) -> Stall {
        let stall = Stall::new(
            code,
            StallSize::Medium,
            Money::from_minor(10_000),
            "Hall A",
            "3x3",
        );
        let mut unit = store.begin().await.unwrap();
        unit.insert_stall(stall.clone()).await.unwrap();
        unit.commit().await.unwrap();
        stall
    }

    #[tokio::test]
    async fn reserve_confirms_and_reserves_stall() {
        let store = InMemoryBookingStore::new();
        let stall = seed_stall(&store, "A1").await;
        let engine = AllocationEngine::new(store.clone());

        let details = engine
            .reserve(&IdentityContext::user("alice"), stall.id, Money::from_minor(10_000))
            .await
            .unwrap();

        assert_eq!(details.reservation.status, ReservationStatus::Confirmed);
        assert_eq!(details.stall.status, StallStatus::Reserved);
        let stored = store.get_stall(stall.id).await.unwrap().unwrap();
        assert_eq!(stored.status, StallStatus::Reserved);
    }

    #[tokio::test]
    async fn reserve_unknown_stall_is_not_found() {
        let engine = AllocationEngine::new(InMemoryBookingStore::new());
        let err = engine
            .reserve(&IdentityContext::user("alice"), StallId::new(), Money::zero())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn negative_amount_is_rejected() {
        let store = InMemoryBookingStore::new();
        let stall = seed_stall(&store, "A1").await;
        let engine = AllocationEngine::new(store);
        let err = engine
            .reserve(&IdentityContext::user("alice"), stall.id, Money::from_minor(-5))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn oversized_amount_is_rejected() {
        let store = InMemoryBookingStore::new();
        let stall = seed_stall(&store, "A1").await;
        let engine = AllocationEngine::new(store.clone());

        let err = engine
            .reserve(
                &IdentityContext::user("alice"),
                stall.id,
                Money::from_minor(i64::MAX / 2 + 1),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(store.reservation_count().await, 0);

        engine
            .reserve(&IdentityContext::user("alice"), stall.id, MAX_RESERVATION_AMOUNT)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn sink_sees_only_confirmed_reservations() {
        let store = InMemoryBookingStore::new();
        let stall = seed_stall(&store, "A1").await;
        let sink = std::sync::Arc::new(CollectingSink::default());
        let engine = AllocationEngine::with_sink(store, sink.clone());

        let ok = engine
            .reserve(&IdentityContext::user("alice"), stall.id, Money::zero())
            .await
            .unwrap();
        let _ = engine
            .reserve(&IdentityContext::user("bob"), stall.id, Money::zero())
            .await
            .unwrap_err();

        assert_eq!(*sink.seen.lock().unwrap(), vec![ok.reservation.id]);
    }

    #[tokio::test]
    async fn custom_policy_limits_quota() {
        let store = InMemoryBookingStore::new();
        let a = seed_stall(&store, "A1").await;
        let b = seed_stall(&store, "A2").await;
        let engine = AllocationEngine::new(store).with_policy(AllocationPolicy {
            max_active_per_user: 1,
        });
        let alice = IdentityContext::user("alice");

        engine.reserve(&alice, a.id, Money::zero()).await.unwrap();
        let err = engine.reserve(&alice, b.id, Money::zero()).await.unwrap_err();
        assert!(matches!(err, AllocationError::QuotaExceeded { limit: 1 }));
    }

    #[tokio::test]
    async fn cancel_by_stranger_is_forbidden() {
        let store = InMemoryBookingStore::new();
        let stall = seed_stall(&store, "A1").await;
        let engine = AllocationEngine::new(store);
        let details = engine
            .reserve(&IdentityContext::user("alice"), stall.id, Money::zero())
            .await
            .unwrap();

        let err = engine
            .cancel(&IdentityContext::user("mallory"), details.reservation.id)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);

        let cancelled = engine
            .cancel(&IdentityContext::admin("organizer"), details.reservation.id)
            .await
            .unwrap();
        assert_eq!(cancelled.reservation.status, ReservationStatus::Cancelled);
        assert_eq!(cancelled.stall.status, StallStatus::Available);
    }

    #[tokio::test]
    async fn statistics_require_admin() {
        let engine = AllocationEngine::new(InMemoryBookingStore::new());
        let err = engine
            .statistics(&IdentityContext::user("alice"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
        let stats = engine
            .statistics(&IdentityContext::admin("organizer"))
            .await
            .unwrap();
        assert_eq!(stats.total, 0);
    }

    #[tokio::test]
    async fn details_serialize_flat_with_nested_stall() {
        let store = InMemoryBookingStore::new();
        let stall = seed_stall(&store, "A1").await;
        let engine = AllocationEngine::new(store);
        let details = engine
            .reserve(&IdentityContext::user("alice"), stall.id, Money::from_minor(500))
            .await
            .unwrap();

        let json = serde_json::to_value(&details).unwrap();
        assert_eq!(json["status"], "CONFIRMED");
        assert_eq!(json["totalAmount"], 500);
        assert_eq!(json["stall"]["code"], "A1");
    }
}
