//! Exhibitor contact directories for the server.
//!
//! Accounts are owned by the identity provider. This service keeps a read
//! model of contact details, either in PostgreSQL next to the bookings or
//! in memory, seeded from a JSON file of [`UserProfile`] records.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use booking_store::StoreError;
use common::UserId;
use domain::{InMemoryUserDirectory, UserDirectory, UserProfile};
use sqlx::{PgPool, Row};
use thiserror::Error;

use crate::config::Config;

/// Errors raised while preparing the directory at start-up.
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("failed to read user directory {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse user directory {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("failed to seed user directory: {0}")]
    Database(#[from] sqlx::Error),
}

/// Contact read model stored in the `users` table.
#[derive(Clone)]
pub struct PostgresUserDirectory {
    pool: PgPool,
}

impl PostgresUserDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts or refreshes a profile.
    pub async fn upsert(&self, profile: &UserProfile) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO users (id, email, name, business_name)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE
            SET email = EXCLUDED.email, name = EXCLUDED.name, business_name = EXCLUDED.business_name
            "#,
        )
        .bind(profile.id.as_str())
        .bind(&profile.email)
        .bind(&profile.name)
        .bind(profile.business_name.as_deref())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl UserDirectory for PostgresUserDirectory {
    async fn find_user(&self, id: &UserId) -> domain::Result<Option<UserProfile>> {
        let row = sqlx::query("SELECT id, email, name, business_name FROM users WHERE id = $1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::from)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let profile = UserProfile {
            id: UserId::new(row.try_get::<String, _>("id").map_err(StoreError::from)?),
            email: row.try_get("email").map_err(StoreError::from)?,
            name: row.try_get("name").map_err(StoreError::from)?,
            business_name: row.try_get("business_name").map_err(StoreError::from)?,
        };
        Ok(Some(profile))
    }
}

/// Reads a JSON array of profiles.
pub async fn read_profiles(path: &Path) -> Result<Vec<UserProfile>, DirectoryError> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| DirectoryError::Read {
            path: path.to_path_buf(),
            source,
        })?;
    serde_json::from_str(&raw).map_err(|source| DirectoryError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Builds the directory the server resolves recipients against.
///
/// With a pool, profiles come from the `users` table and the optional seed
/// file is upserted into it. Without one, the seed file is loaded into
/// memory.
pub async fn directory_from_config(
    config: &Config,
    pool: Option<PgPool>,
) -> Result<Arc<dyn UserDirectory>, DirectoryError> {
    let seed = match &config.user_directory_path {
        Some(path) => read_profiles(path).await?,
        None => Vec::new(),
    };

    if let Some(pool) = pool {
        let directory = PostgresUserDirectory::new(pool);
        for profile in &seed {
            directory.upsert(profile).await?;
        }
        tracing::info!(seeded = seed.len(), "using PostgreSQL user directory");
        return Ok(Arc::new(directory));
    }

    if seed.is_empty() {
        tracing::warn!("user directory is empty, confirmations cannot be addressed");
    } else {
        tracing::info!(users = seed.len(), "loaded in-memory user directory");
    }
    Ok(Arc::new(seed.into_iter().collect::<InMemoryUserDirectory>()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_file(contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("bookfair-users-{}.json", uuid::Uuid::new_v4()));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[tokio::test]
    async fn seed_file_populates_memory_directory() {
        let path = temp_file(
            r#"[
                {"id": "alice", "email": "alice@example.com", "name": "Alice", "businessName": "Alice Books"},
                {"id": "bob", "email": "bob@example.com", "name": "Bob", "businessName": null}
            ]"#,
        );
        let config = Config {
            user_directory_path: Some(path.clone()),
            ..Config::default()
        };

        let directory = directory_from_config(&config, None).await.unwrap();
        let alice = directory
            .find_user(&UserId::new("alice"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(alice.email, "alice@example.com");
        assert_eq!(alice.business_name.as_deref(), Some("Alice Books"));
        assert!(
            directory
                .find_user(&UserId::new("carol"))
                .await
                .unwrap()
                .is_none()
        );

        std::fs::remove_file(path).unwrap();
    }

    #[tokio::test]
    async fn missing_seed_file_is_an_error() {
        let config = Config {
            user_directory_path: Some(PathBuf::from("/nonexistent/bookfair/users.json")),
            ..Config::default()
        };
        let err = directory_from_config(&config, None).await.err().unwrap();
        assert!(matches!(err, DirectoryError::Read { .. }));
    }

    #[tokio::test]
    async fn malformed_seed_file_is_an_error() {
        let path = temp_file(r#"[{"id": "alice"}]"#);
        let err = read_profiles(&path).await.unwrap_err();
        assert!(matches!(err, DirectoryError::Parse { .. }));
        std::fs::remove_file(path).unwrap();
    }
}
