use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use common::{GenreId, ReservationId, StallId, UserId};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::{
    Genre, GenreStore, NewReservation, Reservation, ReservationQuery, ReservationStatistics, ReservationStatus,
    ReservationStore, Result, Stall, StallFilter, StallStatistics, StallStatus, StallStore,
    StoreError,
    store::{BookingStore, UnitOfWork},
};

#[derive(Debug, Default)]
struct Arena {
    stalls: HashMap<StallId, Stall>,
    reservations: HashMap<ReservationId, Reservation>,
    genres: HashMap<GenreId, Genre>,
}

#[derive(Debug, Default)]
struct Slot {
    lock: Arc<Mutex<()>>,
    /// Units holding or waiting for `lock`.
    holders: usize,
}

type Slots<K> = Arc<StdMutex<HashMap<K, Slot>>>;

fn lock_slots<K>(slots: &StdMutex<HashMap<K, Slot>>) -> MutexGuard<'_, HashMap<K, Slot>> {
    slots.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Async mutexes keyed by stall or user.
///
/// An entry exists only while some unit holds or awaits it, so arbitrary
/// keys never accumulate.
#[derive(Debug)]
struct KeyedLocks<K> {
    slots: Slots<K>,
}

impl<K> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self {
            slots: Arc::default(),
        }
    }
}

impl<K: Eq + Hash + Clone> KeyedLocks<K> {
    async fn acquire(&self, key: K) -> KeyGuard<K> {
        let lock = {
            let mut slots = lock_slots(&self.slots);
            let slot = slots.entry(key.clone()).or_default();
            slot.holders += 1;
            slot.lock.clone()
        };
        // Registered before waiting so a cancelled wait still releases the slot
        let mut guard = KeyGuard {
            slots: self.slots.clone(),
            key,
            held: None,
        };
        guard.held = Some(lock.lock_owned().await);
        guard
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        lock_slots(&self.slots).len()
    }
}

struct KeyGuard<K: Eq + Hash> {
    slots: Slots<K>,
    key: K,
    held: Option<OwnedMutexGuard<()>>,
}

impl<K: Eq + Hash> Drop for KeyGuard<K> {
    fn drop(&mut self) {
        self.held.take();
        let mut slots = lock_slots(&self.slots);
        if let Some(slot) = slots.get_mut(&self.key) {
            slot.holders -= 1;
            if slot.holders == 0 {
                slots.remove(&self.key);
            }
        }
    }
}

#[derive(Debug, Default)]
struct LockTable {
    stalls: KeyedLocks<StallId>,
    users: KeyedLocks<UserId>,
}

/// In-memory booking store for tests and single-process deployments.
///
/// Committed state lives in one arena behind a read-write lock that is
/// only ever held for the duration of a single read or a commit. Units of
/// work serialize against each other through per-stall and per-user locks,
/// and every conditional transition is re-validated at commit, so a unit
/// that skipped locking still cannot overwrite a concurrent change.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBookingStore {
    arena: Arc<RwLock<Arena>>,
    locks: Arc<LockTable>,
}

impl InMemoryBookingStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of committed stalls.
    pub async fn stall_count(&self) -> usize {
        self.arena.read().await.stalls.len()
    }

    /// Returns the number of committed reservations.
    pub async fn reservation_count(&self) -> usize {
        self.arena.read().await.reservations.len()
    }

    /// Clears all stalls, reservations and genres.
    pub async fn clear(&self) {
        let mut arena = self.arena.write().await;
        arena.stalls.clear();
        arena.reservations.clear();
        arena.genres.clear();
    }
}

#[async_trait]
impl BookingStore for InMemoryBookingStore {
    type Unit = InMemoryUnit;

    async fn begin(&self) -> Result<InMemoryUnit> {
        Ok(InMemoryUnit {
            arena: self.arena.clone(),
            locks: self.locks.clone(),
            stall_guards: Vec::new(),
            user_guards: Vec::new(),
            locked_stalls: HashSet::new(),
            locked_users: HashSet::new(),
            staged: Arena::default(),
            inserted_stalls: HashSet::new(),
            deleted_stalls: HashSet::new(),
            inserted_genres: HashSet::new(),
            deleted_genres: HashSet::new(),
            expected_stalls: HashMap::new(),
            expected_reservations: HashMap::new(),
        })
    }
}

/// Unit of work over an [`InMemoryBookingStore`].
///
/// Writes are staged locally and overlaid on committed state for reads
/// made through this unit.
pub struct InMemoryUnit {
    arena: Arc<RwLock<Arena>>,
    locks: Arc<LockTable>,
    stall_guards: Vec<KeyGuard<StallId>>,
    user_guards: Vec<KeyGuard<UserId>>,
    locked_stalls: HashSet<StallId>,
    locked_users: HashSet<UserId>,
    staged: Arena,
    inserted_stalls: HashSet<StallId>,
    deleted_stalls: HashSet<StallId>,
    inserted_genres: HashSet<GenreId>,
    deleted_genres: HashSet<GenreId>,
    /// Committed status each touched stall must still have at commit.
    expected_stalls: HashMap<StallId, StallStatus>,
    expected_reservations: HashMap<ReservationId, ReservationStatus>,
}

fn overlay<K: Eq + Hash + Clone, V: Clone>(
    committed: &HashMap<K, V>,
    staged: &HashMap<K, V>,
) -> Vec<V> {
    committed
        .iter()
        .filter(|(k, _)| !staged.contains_key(*k))
        .map(|(_, v)| v.clone())
        .chain(staged.values().cloned())
        .collect()
}

impl InMemoryUnit {
    async fn current_stall(&self, id: StallId) -> Option<Stall> {
        if self.deleted_stalls.contains(&id) {
            return None;
        }
        if let Some(stall) = self.staged.stalls.get(&id) {
            return Some(stall.clone());
        }
        self.arena.read().await.stalls.get(&id).cloned()
    }

    async fn all_stalls(&self) -> Vec<Stall> {
        let arena = self.arena.read().await;
        let mut stalls = overlay(&arena.stalls, &self.staged.stalls);
        stalls.retain(|s| !self.deleted_stalls.contains(&s.id));
        stalls
    }

    async fn current_reservation(&self, id: ReservationId) -> Option<Reservation> {
        let reservation = match self.staged.reservations.get(&id) {
            Some(r) => Some(r.clone()),
            None => self.arena.read().await.reservations.get(&id).cloned(),
        };
        reservation.filter(|r| !self.deleted_stalls.contains(&r.stall_id))
    }

    async fn all_reservations(&self) -> Vec<Reservation> {
        let arena = self.arena.read().await;
        let mut reservations = overlay(&arena.reservations, &self.staged.reservations);
        reservations.retain(|r| !self.deleted_stalls.contains(&r.stall_id));
        reservations
    }

    fn expect_stall(&mut self, id: StallId, status: StallStatus) {
        if !self.inserted_stalls.contains(&id) {
            self.expected_stalls.entry(id).or_insert(status);
        }
    }

    async fn current_genre(&self, id: GenreId) -> Option<Genre> {
        if self.deleted_genres.contains(&id) {
            return None;
        }
        if let Some(genre) = self.staged.genres.get(&id) {
            return Some(genre.clone());
        }
        self.arena.read().await.genres.get(&id).cloned()
    }

    async fn all_genres(&self) -> Vec<Genre> {
        let arena = self.arena.read().await;
        let mut genres = overlay(&arena.genres, &self.staged.genres);
        genres.retain(|g| !self.deleted_genres.contains(&g.id));
        genres
    }

    async fn ensure_name_free(&self, name: &str, except: Option<GenreId>) -> Result<()> {
        let taken = self
            .all_genres()
            .await
            .iter()
            .any(|g| g.name == name && Some(g.id) != except);
        if taken {
            return Err(StoreError::DuplicateGenreName(name.to_string()));
        }
        Ok(())
    }

    async fn ensure_code_free(&self, code: &str, except: Option<StallId>) -> Result<()> {
        let taken = self
            .all_stalls()
            .await
            .iter()
            .any(|s| s.code == code && Some(s.id) != except);
        if taken {
            return Err(StoreError::DuplicateStallCode(code.to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl StallStore for InMemoryUnit {
    async fn get_stall(&mut self, id: StallId) -> Result<Option<Stall>> {
        Ok(self.current_stall(id).await)
    }

    async fn find_stall_by_code(&mut self, code: &str) -> Result<Option<Stall>> {
        Ok(self.all_stalls().await.into_iter().find(|s| s.code == code))
    }

    async fn list_stalls(&mut self, filter: &StallFilter) -> Result<Vec<Stall>> {
        let mut stalls: Vec<_> = self
            .all_stalls()
            .await
            .into_iter()
            .filter(|s| filter.matches(s))
            .collect();
        stalls.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(stalls)
    }

    async fn insert_stall(&mut self, stall: Stall) -> Result<()> {
        self.ensure_code_free(&stall.code, None).await?;
        self.inserted_stalls.insert(stall.id);
        self.staged.stalls.insert(stall.id, stall);
        Ok(())
    }

    async fn update_stall(&mut self, stall: &Stall) -> Result<Stall> {
        let mut current = self
            .current_stall(stall.id)
            .await
            .ok_or(StoreError::StallNotFound(stall.id))?;
        if current.code != stall.code {
            self.ensure_code_free(&stall.code, Some(stall.id)).await?;
        }

        self.expect_stall(stall.id, current.status);
        current.code = stall.code.clone();
        current.size = stall.size;
        current.price = stall.price;
        current.location = stall.location.clone();
        current.dimensions = stall.dimensions.clone();
        current.updated_at = Utc::now();

        self.staged.stalls.insert(current.id, current.clone());
        Ok(current)
    }

    async fn try_transition(
        &mut self,
        id: StallId,
        from: StallStatus,
        to: StallStatus,
    ) -> Result<bool> {
        let Some(mut stall) = self.current_stall(id).await else {
            return Ok(false);
        };
        if stall.status != from {
            return Ok(false);
        }

        self.expect_stall(id, from);
        stall.status = to;
        stall.updated_at = Utc::now();
        self.staged.stalls.insert(id, stall);
        Ok(true)
    }

    async fn set_maintenance(&mut self, id: StallId, on: bool) -> Result<Stall> {
        let mut stall = self
            .current_stall(id)
            .await
            .ok_or(StoreError::StallNotFound(id))?;

        self.expect_stall(id, stall.status);
        stall.status = if on {
            StallStatus::Maintenance
        } else {
            StallStatus::Available
        };
        stall.updated_at = Utc::now();
        self.staged.stalls.insert(id, stall.clone());
        Ok(stall)
    }

    async fn delete_stall(&mut self, id: StallId) -> Result<bool> {
        let Some(stall) = self.current_stall(id).await else {
            return Ok(false);
        };

        self.expect_stall(id, stall.status);
        self.staged.stalls.remove(&id);
        self.staged.reservations.retain(|_, r| r.stall_id != id);
        self.deleted_stalls.insert(id);
        Ok(true)
    }

    async fn stall_statistics(&mut self) -> Result<StallStatistics> {
        Ok(StallStatistics::from_stalls(&self.all_stalls().await))
    }
}

#[async_trait]
impl ReservationStore for InMemoryUnit {
    async fn insert_active(&mut self, new: NewReservation) -> Result<Reservation> {
        if self.current_stall(new.stall_id).await.is_none() {
            return Err(StoreError::StallNotFound(new.stall_id));
        }
        let reservation = new.into_reservation()?;
        self.staged
            .reservations
            .insert(reservation.id, reservation.clone());
        Ok(reservation)
    }

    async fn count_active(&mut self, user_id: &UserId) -> Result<usize> {
        Ok(self
            .all_reservations()
            .await
            .iter()
            .filter(|r| &r.user_id == user_id && r.is_active())
            .count())
    }

    async fn has_active(&mut self, user_id: &UserId, stall_id: StallId) -> Result<bool> {
        Ok(self
            .all_reservations()
            .await
            .iter()
            .any(|r| &r.user_id == user_id && r.stall_id == stall_id && r.is_active()))
    }

    async fn get_reservation(&mut self, id: ReservationId) -> Result<Option<Reservation>> {
        Ok(self.current_reservation(id).await)
    }

    async fn cancel_reservation(&mut self, id: ReservationId) -> Result<Reservation> {
        let mut reservation = self
            .current_reservation(id)
            .await
            .ok_or(StoreError::ReservationNotFound(id))?;
        if reservation.status == ReservationStatus::Cancelled {
            return Err(StoreError::AlreadyCancelled(id));
        }

        if !self.staged.reservations.contains_key(&id) {
            self.expected_reservations.insert(id, reservation.status);
        }
        reservation.status = ReservationStatus::Cancelled;
        reservation.updated_at = Utc::now();
        self.staged.reservations.insert(id, reservation.clone());
        Ok(reservation)
    }

    async fn list_active_for_stall(&mut self, stall_id: StallId) -> Result<Vec<Reservation>> {
        Ok(self
            .all_reservations()
            .await
            .into_iter()
            .filter(|r| r.stall_id == stall_id && r.is_active())
            .collect())
    }

    async fn list_reservations(&mut self, query: &ReservationQuery) -> Result<Vec<Reservation>> {
        let mut reservations: Vec<_> = self
            .all_reservations()
            .await
            .into_iter()
            .filter(|r| query.matches(r))
            .collect();

        // Newest first, ID as tie-breaker for a stable order
        reservations.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));

        let offset = query.offset.unwrap_or(0);
        let limit = query.limit.unwrap_or(usize::MAX);
        Ok(reservations.into_iter().skip(offset).take(limit).collect())
    }

    async fn reservation_statistics(&mut self) -> Result<ReservationStatistics> {
        Ok(ReservationStatistics::from_reservations(
            &self.all_reservations().await,
        ))
    }
}

#[async_trait]
impl GenreStore for InMemoryUnit {
    async fn get_genre(&mut self, id: GenreId) -> Result<Option<Genre>> {
        Ok(self.current_genre(id).await)
    }

    async fn find_genre_by_name(&mut self, name: &str) -> Result<Option<Genre>> {
        Ok(self.all_genres().await.into_iter().find(|g| g.name == name))
    }

    async fn list_genres(&mut self) -> Result<Vec<Genre>> {
        let mut genres = self.all_genres().await;
        genres.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(genres)
    }

    async fn insert_genre(&mut self, genre: Genre) -> Result<()> {
        self.ensure_name_free(&genre.name, None).await?;
        self.inserted_genres.insert(genre.id);
        self.staged.genres.insert(genre.id, genre);
        Ok(())
    }

    async fn update_genre(&mut self, genre: &Genre) -> Result<Genre> {
        let mut current = self
            .current_genre(genre.id)
            .await
            .ok_or(StoreError::GenreNotFound(genre.id))?;
        if current.name != genre.name {
            self.ensure_name_free(&genre.name, Some(genre.id)).await?;
        }

        current.name = genre.name.clone();
        current.description = genre.description.clone();
        current.updated_at = Utc::now();
        self.staged.genres.insert(current.id, current.clone());
        Ok(current)
    }

    async fn delete_genre(&mut self, id: GenreId) -> Result<bool> {
        if self.current_genre(id).await.is_none() {
            return Ok(false);
        }
        self.staged.genres.remove(&id);
        self.deleted_genres.insert(id);
        Ok(true)
    }
}

#[async_trait]
impl UnitOfWork for InMemoryUnit {
    async fn lock_stall(&mut self, id: StallId) -> Result<()> {
        if self.locked_stalls.insert(id) {
            let guard = self.locks.stalls.acquire(id).await;
            self.stall_guards.push(guard);
        }
        Ok(())
    }

    async fn lock_user(&mut self, user_id: &UserId) -> Result<()> {
        if self.locked_users.insert(user_id.clone()) {
            let guard = self.locks.users.acquire(user_id.clone()).await;
            self.user_guards.push(guard);
        }
        Ok(())
    }

    async fn commit(self) -> Result<()> {
        let mut arena = self.arena.write().await;

        for (id, expected) in &self.expected_stalls {
            if arena.stalls.get(id).map(|s| s.status) != Some(*expected) {
                metrics::counter!("store_transition_conflicts_total").increment(1);
                return Err(StoreError::TransitionConflict { stall_id: *id });
            }
        }
        for (id, expected) in &self.expected_reservations {
            match arena.reservations.get(id) {
                Some(r) if r.status == *expected => {}
                other => {
                    metrics::counter!("store_transition_conflicts_total").increment(1);
                    let stall_id = other
                        .map(|r| r.stall_id)
                        .or_else(|| self.staged.reservations.get(id).map(|r| r.stall_id))
                        .unwrap_or_default();
                    return Err(StoreError::TransitionConflict { stall_id });
                }
            }
        }

        // Unique code constraint against stalls committed by other units
        for stall in self.staged.stalls.values() {
            let clash = arena.stalls.values().any(|s| {
                s.id != stall.id
                    && s.code == stall.code
                    && !self.deleted_stalls.contains(&s.id)
                    && !self.staged.stalls.contains_key(&s.id)
            });
            if clash {
                return Err(StoreError::DuplicateStallCode(stall.code.clone()));
            }
        }

        for genre in self.staged.genres.values() {
            if !self.inserted_genres.contains(&genre.id) && !arena.genres.contains_key(&genre.id) {
                return Err(StoreError::GenreNotFound(genre.id));
            }
            let clash = arena.genres.values().any(|g| {
                g.id != genre.id
                    && g.name == genre.name
                    && !self.deleted_genres.contains(&g.id)
                    && !self.staged.genres.contains_key(&g.id)
            });
            if clash {
                return Err(StoreError::DuplicateGenreName(genre.name.clone()));
            }
        }

        for id in &self.deleted_stalls {
            arena.stalls.remove(id);
            arena.reservations.retain(|_, r| r.stall_id != *id);
        }
        for id in &self.deleted_genres {
            arena.genres.remove(id);
        }
        arena.stalls.extend(self.staged.stalls);
        arena.reservations.extend(self.staged.reservations);
        arena.genres.extend(self.staged.genres);

        tracing::trace!("in-memory unit committed");
        Ok(())
    }
}
