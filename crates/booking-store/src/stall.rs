//! Stall records and the stall store contract.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{Money, StallId};
use serde::{Deserialize, Serialize};

use crate::{Result, StoreError};

/// Size category of a stall.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StallSize {
    Small,
    Medium,
    Large,
}

impl StallSize {
    /// Returns the size name as stored and serialized.
    pub fn as_str(&self) -> &'static str {
        match self {
            StallSize::Small => "SMALL",
            StallSize::Medium => "MEDIUM",
            StallSize::Large => "LARGE",
        }
    }
}

impl std::fmt::Display for StallSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for StallSize {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "SMALL" => Ok(StallSize::Small),
            "MEDIUM" => Ok(StallSize::Medium),
            "LARGE" => Ok(StallSize::Large),
            other => Err(StoreError::InvalidData(format!("unknown stall size '{other}'"))),
        }
    }
}

/// Booking status of a stall.
///
/// State transitions:
/// ```text
///              reserve
/// Available ◄──────────► Reserved
///     ▲        cancel
///     │ admin toggle
///     ▼
/// Maintenance
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StallStatus {
    /// Free to be booked.
    #[default]
    Available,

    /// Held by exactly one active reservation.
    Reserved,

    /// Taken out of the booking flow by an administrator.
    Maintenance,
}

impl StallStatus {
    /// Returns the status name as stored and serialized.
    pub fn as_str(&self) -> &'static str {
        match self {
            StallStatus::Available => "AVAILABLE",
            StallStatus::Reserved => "RESERVED",
            StallStatus::Maintenance => "MAINTENANCE",
        }
    }
}

impl std::fmt::Display for StallStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for StallStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "AVAILABLE" => Ok(StallStatus::Available),
            "RESERVED" => Ok(StallStatus::Reserved),
            "MAINTENANCE" => Ok(StallStatus::Maintenance),
            other => Err(StoreError::InvalidData(format!(
                "unknown stall status '{other}'"
            ))),
        }
    }
}

/// A physical exhibition stall.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stall {
    pub id: StallId,
    /// Human-readable unique code such as "A1".
    pub code: String,
    pub size: StallSize,
    pub price: Money,
    pub location: String,
    pub dimensions: String,
    pub status: StallStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Stall {
    /// Creates a new available stall with a fresh ID.
    pub fn new(
        code: impl Into<String>,
        size: StallSize,
        price: Money,
        location: impl Into<String>,
        dimensions: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: StallId::new(),
            code: code.into(),
            size,
            price,
            location: location.into(),
            dimensions: dimensions.into(),
            status: StallStatus::Available,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns true if the stall can be booked right now.
    pub fn is_available(&self) -> bool {
        self.status == StallStatus::Available
    }
}

/// Filter for listing stalls.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StallFilter {
    /// Only stalls in this status.
    pub status: Option<StallStatus>,

    /// Only stalls of this size.
    pub size: Option<StallSize>,
}

impl StallFilter {
    /// Creates a filter matching every stall.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a filter matching available stalls.
    pub fn available() -> Self {
        Self::new().status(StallStatus::Available)
    }

    /// Filters by status.
    pub fn status(mut self, status: StallStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Filters by size.
    pub fn size(mut self, size: StallSize) -> Self {
        self.size = Some(size);
        self
    }

    /// Returns true if the stall passes this filter.
    pub fn matches(&self, stall: &Stall) -> bool {
        self.status.is_none_or(|s| stall.status == s) && self.size.is_none_or(|s| stall.size == s)
    }
}

/// Stall counts per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StallStatusCounts {
    pub available: u64,
    pub reserved: u64,
    pub maintenance: u64,
}

/// Stall counts per size.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StallSizeCounts {
    pub small: u64,
    pub medium: u64,
    pub large: u64,
}

/// Occupancy overview for the organizer dashboard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StallStatistics {
    pub total: u64,
    pub by_status: StallStatusCounts,
    pub by_size: StallSizeCounts,
}

impl StallStatistics {
    /// Adds `count` stalls of the given status and size to the tally.
    pub fn record(&mut self, status: StallStatus, size: StallSize, count: u64) {
        self.total += count;
        match status {
            StallStatus::Available => self.by_status.available += count,
            StallStatus::Reserved => self.by_status.reserved += count,
            StallStatus::Maintenance => self.by_status.maintenance += count,
        }
        match size {
            StallSize::Small => self.by_size.small += count,
            StallSize::Medium => self.by_size.medium += count,
            StallSize::Large => self.by_size.large += count,
        }
    }

    /// Tallies a set of stalls.
    pub fn from_stalls<'a>(stalls: impl IntoIterator<Item = &'a Stall>) -> Self {
        let mut stats = Self::default();
        for stall in stalls {
            stats.record(stall.status, stall.size, 1);
        }
        stats
    }
}

/// Operations on stall records inside a unit of work.
#[async_trait]
pub trait StallStore: Send {
    /// Loads a stall by ID.
    async fn get_stall(&mut self, id: StallId) -> Result<Option<Stall>>;

    /// Loads a stall by its unique code.
    async fn find_stall_by_code(&mut self, code: &str) -> Result<Option<Stall>>;

    /// Lists stalls matching the filter, ordered by code.
    async fn list_stalls(&mut self, filter: &StallFilter) -> Result<Vec<Stall>>;

    /// Inserts a new stall.
    ///
    /// Fails with `DuplicateStallCode` if the code is taken.
    async fn insert_stall(&mut self, stall: Stall) -> Result<()>;

    /// Replaces a stall's descriptive fields (code, size, price, location,
    /// dimensions). The status is left unchanged.
    async fn update_stall(&mut self, stall: &Stall) -> Result<Stall>;

    /// Moves the stall from `from` to `to` if and only if its current
    /// status is `from`. Returns false without side effects otherwise.
    async fn try_transition(
        &mut self,
        id: StallId,
        from: StallStatus,
        to: StallStatus,
    ) -> Result<bool>;

    /// Unconditionally sets (`on`) or clears (`off`) maintenance.
    async fn set_maintenance(&mut self, id: StallId, on: bool) -> Result<Stall>;

    /// Deletes a stall together with its reservation history.
    ///
    /// Returns false if the stall did not exist.
    async fn delete_stall(&mut self, id: StallId) -> Result<bool>;

    /// Counts stalls by status and size.
    async fn stall_statistics(&mut self) -> Result<StallStatistics>;
}
