//! Book genre records and the genre store contract.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::GenreId;
use serde::{Deserialize, Serialize};

use crate::Result;

/// A book genre exhibitors can be listed under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Genre {
    pub id: GenreId,
    /// Unique display name such as "Fiction".
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Genre {
    /// Creates a genre with a fresh ID.
    pub fn new(name: impl Into<String>, description: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: GenreId::new(),
            name: name.into(),
            description,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Operations on genre records inside a unit of work.
#[async_trait]
pub trait GenreStore: Send {
    /// Loads a genre by ID.
    async fn get_genre(&mut self, id: GenreId) -> Result<Option<Genre>>;

    /// Loads a genre by its unique name.
    async fn find_genre_by_name(&mut self, name: &str) -> Result<Option<Genre>>;

    /// Lists every genre ordered by name.
    async fn list_genres(&mut self) -> Result<Vec<Genre>>;

    /// Inserts a new genre.
    ///
    /// Fails with `DuplicateGenreName` if the name is taken.
    async fn insert_genre(&mut self, genre: Genre) -> Result<()>;

    /// Replaces a genre's name and description.
    async fn update_genre(&mut self, genre: &Genre) -> Result<Genre>;

    /// Deletes a genre. Returns false if it did not exist.
    async fn delete_genre(&mut self, id: GenreId) -> Result<bool>;
}
