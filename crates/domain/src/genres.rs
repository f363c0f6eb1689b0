//! Genre catalog: the book genres exhibitors can be listed under.

use booking_store::{BookingStore, BookingStoreExt, Genre, GenreId, GenreStore, UnitOfWork};
use common::IdentityContext;
use serde::Serialize;
use tracing::info;

use crate::commands::{CreateGenre, UpdateGenre};
use crate::engine::require_admin;
use crate::{AllocationError, Result};

/// All genres with their count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenreList {
    pub count: usize,
    pub genres: Vec<Genre>,
}

/// Service for managing genres. Reads are public, writes are admin only.
pub struct GenreCatalog<S: BookingStore> {
    store: S,
}

impl<S: BookingStore> GenreCatalog<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Adds a genre. The name must be unused.
    #[tracing::instrument(skip(self, identity), fields(user_id = %identity.user_id))]
    pub async fn create_genre(&self, identity: &IdentityContext, cmd: CreateGenre) -> Result<Genre> {
        require_admin(identity)?;
        cmd.validate()?;

        let genre = cmd.into_genre();
        let mut unit = self.store.begin().await?;
        if unit.find_genre_by_name(&genre.name).await?.is_some() {
            return Err(AllocationError::DuplicateGenreName(genre.name));
        }
        unit.insert_genre(genre.clone()).await?;
        unit.commit().await?;

        info!(genre_id = %genre.id, name = %genre.name, "Genre created");
        Ok(genre)
    }

    /// Lists every genre ordered by name.
    pub async fn list_genres(&self) -> Result<GenreList> {
        let genres = self.store.list_genres().await?;
        Ok(GenreList {
            count: genres.len(),
            genres,
        })
    }

    pub async fn get_genre(&self, id: GenreId) -> Result<Genre> {
        self.store
            .get_genre(id)
            .await?
            .ok_or(AllocationError::GenreNotFound(id))
    }

    /// Renames a genre or replaces its description.
    #[tracing::instrument(skip(self, identity), fields(user_id = %identity.user_id))]
    pub async fn update_genre(
        &self,
        identity: &IdentityContext,
        id: GenreId,
        cmd: UpdateGenre,
    ) -> Result<Genre> {
        require_admin(identity)?;
        cmd.validate()?;

        let mut unit = self.store.begin().await?;
        let genre = unit
            .get_genre(id)
            .await?
            .ok_or(AllocationError::GenreNotFound(id))?;

        let edited = cmd.apply(&genre);
        if edited.name != genre.name && unit.find_genre_by_name(&edited.name).await?.is_some() {
            return Err(AllocationError::DuplicateGenreName(edited.name));
        }
        let updated = unit.update_genre(&edited).await?;
        unit.commit().await?;

        info!(genre_id = %id, name = %updated.name, "Genre updated");
        Ok(updated)
    }

    #[tracing::instrument(skip(self, identity), fields(user_id = %identity.user_id))]
    pub async fn delete_genre(&self, identity: &IdentityContext, id: GenreId) -> Result<()> {
        require_admin(identity)?;

        let mut unit = self.store.begin().await?;
        if !unit.delete_genre(id).await? {
            return Err(AllocationError::GenreNotFound(id));
        }
        unit.commit().await?;

        info!(genre_id = %id, "Genre deleted");
        Ok(())
    }
}
