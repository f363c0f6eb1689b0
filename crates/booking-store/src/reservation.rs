//! Reservation records and the reservation store contract.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{Money, ReservationId, StallId, UserId};
use serde::{Deserialize, Serialize};

use crate::{Result, StoreError};

/// Lifecycle status of a reservation.
///
/// ```text
/// (created) ──► Confirmed ──► Cancelled
///     │                          ▲
///     └──────► Pending ──────────┘
/// ```
///
/// `Pending` and `Confirmed` are both active. `Cancelled` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReservationStatus {
    /// Held, awaiting a deferred confirmation (e.g. payment).
    Pending,

    /// Held and confirmed.
    Confirmed,

    /// Released (terminal state).
    Cancelled,
}

impl ReservationStatus {
    /// Returns true if the reservation holds its stall and counts toward quota.
    pub fn is_active(&self) -> bool {
        matches!(self, ReservationStatus::Pending | ReservationStatus::Confirmed)
    }

    /// Returns true if no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ReservationStatus::Cancelled)
    }

    /// Returns the status name as stored and serialized.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Pending => "PENDING",
            ReservationStatus::Confirmed => "CONFIRMED",
            ReservationStatus::Cancelled => "CANCELLED",
        }
    }
}

impl std::fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ReservationStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(ReservationStatus::Pending),
            "CONFIRMED" => Ok(ReservationStatus::Confirmed),
            "CANCELLED" => Ok(ReservationStatus::Cancelled),
            other => Err(StoreError::InvalidData(format!(
                "unknown reservation status '{other}'"
            ))),
        }
    }
}

/// A booking of one stall by one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reservation {
    pub id: ReservationId,
    pub user_id: UserId,
    pub stall_id: StallId,
    /// Amount agreed at booking time. Never recomputed from the stall price.
    pub total_amount: Money,
    pub status: ReservationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Reservation {
    /// Returns true if this reservation holds its stall.
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }
}

/// Data for a reservation about to be inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReservation {
    pub user_id: UserId,
    pub stall_id: StallId,
    pub total_amount: Money,
    pub status: ReservationStatus,
}

impl NewReservation {
    /// A reservation that is confirmed on creation.
    pub fn confirmed(user_id: UserId, stall_id: StallId, total_amount: Money) -> Self {
        Self {
            user_id,
            stall_id,
            total_amount,
            status: ReservationStatus::Confirmed,
        }
    }

    /// A reservation awaiting a later confirmation step.
    pub fn pending(user_id: UserId, stall_id: StallId, total_amount: Money) -> Self {
        Self {
            status: ReservationStatus::Pending,
            ..Self::confirmed(user_id, stall_id, total_amount)
        }
    }

    /// Builds the stored record with a fresh ID and timestamps.
    ///
    /// Only active statuses may be inserted.
    pub fn into_reservation(self) -> Result<Reservation> {
        if !self.status.is_active() {
            return Err(StoreError::InvalidData(format!(
                "cannot insert a reservation in status {}",
                self.status
            )));
        }
        let now = Utc::now();
        Ok(Reservation {
            id: ReservationId::new(),
            user_id: self.user_id,
            stall_id: self.stall_id,
            total_amount: self.total_amount,
            status: self.status,
            created_at: now,
            updated_at: now,
        })
    }
}

/// Builder for reservation listings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReservationQuery {
    /// Filter by owning user.
    pub user_id: Option<UserId>,

    /// Filter by stall.
    pub stall_id: Option<StallId>,

    /// Filter by status.
    pub status: Option<ReservationStatus>,

    /// Maximum number of reservations to return.
    pub limit: Option<usize>,

    /// Number of reservations to skip.
    pub offset: Option<usize>,
}

impl ReservationQuery {
    /// Creates a query matching every reservation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a query for one user's reservations.
    pub fn for_user(user_id: UserId) -> Self {
        Self {
            user_id: Some(user_id),
            ..Default::default()
        }
    }

    /// Filters by stall.
    pub fn stall_id(mut self, stall_id: StallId) -> Self {
        self.stall_id = Some(stall_id);
        self
    }

    /// Filters by status.
    pub fn status(mut self, status: ReservationStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Limits the number of reservations returned.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skips this many reservations before returning results.
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Returns true if the reservation passes the filters of this query.
    pub fn matches(&self, reservation: &Reservation) -> bool {
        self.user_id
            .as_ref()
            .is_none_or(|u| &reservation.user_id == u)
            && self.stall_id.is_none_or(|s| reservation.stall_id == s)
            && self.status.is_none_or(|s| reservation.status == s)
    }
}

/// Reservation counts per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationStatusCounts {
    pub pending: u64,
    pub confirmed: u64,
    pub cancelled: u64,
}

/// Aggregate view over all committed reservations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationStatistics {
    pub total: u64,
    pub by_status: ReservationStatusCounts,
    /// Sum of amounts over confirmed reservations only.
    pub total_revenue: Money,
}

impl ReservationStatistics {
    /// Adds `count` reservations in `status` whose amounts sum to `amount`.
    pub fn record(&mut self, status: ReservationStatus, count: u64, amount: Money) {
        self.total += count;
        match status {
            ReservationStatus::Pending => self.by_status.pending += count,
            ReservationStatus::Confirmed => {
                self.by_status.confirmed += count;
                self.total_revenue += amount;
            }
            ReservationStatus::Cancelled => self.by_status.cancelled += count,
        }
    }

    /// Tallies a set of reservations.
    pub fn from_reservations<'a>(reservations: impl IntoIterator<Item = &'a Reservation>) -> Self {
        let mut stats = Self::default();
        for r in reservations {
            stats.record(r.status, 1, r.total_amount);
        }
        stats
    }
}

/// Operations on reservation records inside a unit of work.
#[async_trait]
pub trait ReservationStore: Send {
    /// Inserts a new active reservation (confirmed unless built as pending).
    async fn insert_active(&mut self, new: NewReservation) -> Result<Reservation>;

    /// Counts the user's active reservations across all stalls.
    async fn count_active(&mut self, user_id: &UserId) -> Result<usize>;

    /// Returns true if the user holds an active reservation on the stall.
    async fn has_active(&mut self, user_id: &UserId, stall_id: StallId) -> Result<bool>;

    /// Loads a reservation by ID.
    async fn get_reservation(&mut self, id: ReservationId) -> Result<Option<Reservation>>;

    /// Marks the reservation cancelled.
    ///
    /// Fails with `AlreadyCancelled` instead of succeeding silently when the
    /// reservation is already cancelled.
    async fn cancel_reservation(&mut self, id: ReservationId) -> Result<Reservation>;

    /// Lists active reservations on a stall. Holds zero or one entry while
    /// exclusivity is intact.
    async fn list_active_for_stall(&mut self, stall_id: StallId) -> Result<Vec<Reservation>>;

    /// Lists reservations matching the query, newest first.
    async fn list_reservations(&mut self, query: &ReservationQuery) -> Result<Vec<Reservation>>;

    /// Counts reservations by status and sums confirmed revenue.
    async fn reservation_statistics(&mut self) -> Result<ReservationStatistics>;
}
