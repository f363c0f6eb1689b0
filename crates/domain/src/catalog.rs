//! Stall catalog: administration and queries over the floor plan.

use booking_store::{
    BookingStore, BookingStoreExt, Reservation, ReservationStore, Stall, StallFilter, StallId,
    StallSize, StallStatistics, StallStatus, StallStore, UnitOfWork,
};
use common::IdentityContext;
use serde::Serialize;
use tracing::info;

use crate::commands::{CreateStall, UpdateStall};
use crate::engine::require_admin;
use crate::{AllocationError, Result};

/// A stall with the reservation currently holding it, if any.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StallDetails {
    #[serde(flatten)]
    pub stall: Stall,
    pub active_reservation: Option<Reservation>,
}

/// Service for managing and browsing stalls.
///
/// Admin operations take the stall lock, so they serialize with `reserve`
/// and `cancel` on the same stall.
pub struct StallCatalog<S: BookingStore> {
    store: S,
}

impl<S: BookingStore> StallCatalog<S> {
    /// Creates a catalog over the given store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Returns the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Adds a stall. Admin only; the code must be unused.
    #[tracing::instrument(skip(self, identity), fields(user_id = %identity.user_id))]
    pub async fn create_stall(&self, identity: &IdentityContext, cmd: CreateStall) -> Result<Stall> {
        require_admin(identity)?;
        cmd.validate()?;

        let stall = cmd.into_stall();
        let mut unit = self.store.begin().await?;
        if unit.find_stall_by_code(&stall.code).await?.is_some() {
            return Err(AllocationError::DuplicateStallCode(stall.code));
        }
        unit.insert_stall(stall.clone()).await?;
        unit.commit().await?;

        info!(stall_id = %stall.id, code = %stall.code, "Stall created");
        Ok(stall)
    }

    /// Edits a stall's fields and/or toggles maintenance. Admin only.
    ///
    /// Entering maintenance is refused while the stall is reserved. Leaving
    /// maintenance on a stall that is not under maintenance changes nothing.
    #[tracing::instrument(skip(self, identity), fields(user_id = %identity.user_id))]
    pub async fn update_stall(
        &self,
        identity: &IdentityContext,
        stall_id: StallId,
        cmd: UpdateStall,
    ) -> Result<Stall> {
        require_admin(identity)?;
        cmd.validate()?;

        let mut unit = self.store.begin().await?;
        unit.lock_stall(stall_id).await?;
        let mut stall = unit
            .get_stall(stall_id)
            .await?
            .ok_or(AllocationError::StallNotFound(stall_id))?;

        if cmd.edits_fields() {
            let edited = cmd.apply(&stall);
            if edited.code != stall.code
                && unit.find_stall_by_code(&edited.code).await?.is_some()
            {
                return Err(AllocationError::DuplicateStallCode(edited.code));
            }
            stall = unit.update_stall(&edited).await?;
        }

        match cmd.maintenance {
            Some(true) if stall.status != StallStatus::Maintenance => {
                ensure_unheld(&mut unit, &stall).await?;
                stall = unit.set_maintenance(stall_id, true).await?;
            }
            Some(false) if stall.status == StallStatus::Maintenance => {
                stall = unit.set_maintenance(stall_id, false).await?;
            }
            _ => {}
        }

        unit.commit().await?;

        info!(%stall_id, status = %stall.status, "Stall updated");
        Ok(stall)
    }

    /// Puts a stall under maintenance or returns it to service. Admin only.
    pub async fn set_maintenance(
        &self,
        identity: &IdentityContext,
        stall_id: StallId,
        on: bool,
    ) -> Result<Stall> {
        self.update_stall(identity, stall_id, UpdateStall::new().maintenance(on))
            .await
    }

    /// Removes a stall and its reservation history. Admin only.
    ///
    /// Refused while an active reservation holds the stall.
    #[tracing::instrument(skip(self, identity), fields(user_id = %identity.user_id))]
    pub async fn delete_stall(&self, identity: &IdentityContext, stall_id: StallId) -> Result<()> {
        require_admin(identity)?;

        let mut unit = self.store.begin().await?;
        unit.lock_stall(stall_id).await?;
        let stall = unit
            .get_stall(stall_id)
            .await?
            .ok_or(AllocationError::StallNotFound(stall_id))?;
        ensure_unheld(&mut unit, &stall).await?;

        if !unit.delete_stall(stall_id).await? {
            return Err(AllocationError::StallNotFound(stall_id));
        }
        unit.commit().await?;

        info!(%stall_id, code = %stall.code, "Stall deleted");
        Ok(())
    }

    /// Loads a stall with its active reservation.
    pub async fn get_stall(&self, stall_id: StallId) -> Result<StallDetails> {
        let mut unit = self.store.begin().await?;
        let stall = unit
            .get_stall(stall_id)
            .await?
            .ok_or(AllocationError::StallNotFound(stall_id))?;
        let active_reservation = unit.list_active_for_stall(stall_id).await?.into_iter().next();
        Ok(StallDetails {
            stall,
            active_reservation,
        })
    }

    /// Lists stalls matching the filter, ordered by code.
    pub async fn list_stalls(&self, filter: &StallFilter) -> Result<Vec<Stall>> {
        Ok(self.store.list_stalls(filter).await?)
    }

    /// Lists stalls that can be booked right now.
    pub async fn list_available(&self) -> Result<Vec<Stall>> {
        self.list_stalls(&StallFilter::available()).await
    }

    /// Lists stalls of one size.
    pub async fn list_by_size(&self, size: StallSize) -> Result<Vec<Stall>> {
        self.list_stalls(&StallFilter::new().size(size)).await
    }

    /// Counts stalls by status and size. Admin only.
    #[tracing::instrument(skip(self, identity), fields(user_id = %identity.user_id))]
    pub async fn statistics(&self, identity: &IdentityContext) -> Result<StallStatistics> {
        require_admin(identity)?;
        Ok(self.store.stall_statistics().await?)
    }
}

async fn ensure_unheld<U: UnitOfWork>(unit: &mut U, stall: &Stall) -> Result<()> {
    if stall.status == StallStatus::Reserved
        || !unit.list_active_for_stall(stall.id).await?.is_empty()
    {
        return Err(AllocationError::StallInUse(stall.id));
    }
    Ok(())
}
