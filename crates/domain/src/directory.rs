//! User directory collaborator.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::UserId;
use serde::{Deserialize, Serialize};

use crate::Result;

/// Contact details of a registered exhibitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: UserId,
    pub email: String,
    pub name: String,
    pub business_name: Option<String>,
}

impl UserProfile {
    /// Creates a profile without a business name.
    pub fn new(id: impl Into<UserId>, email: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
            name: name.into(),
            business_name: None,
        }
    }

    /// Sets the business name.
    pub fn with_business_name(mut self, business_name: impl Into<String>) -> Self {
        self.business_name = Some(business_name.into());
        self
    }
}

/// Resolves user IDs to contact details.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Looks up a user. Returns `None` for unknown IDs.
    async fn find_user(&self, id: &UserId) -> Result<Option<UserProfile>>;
}

#[async_trait]
impl<T: UserDirectory + ?Sized> UserDirectory for Arc<T> {
    async fn find_user(&self, id: &UserId) -> Result<Option<UserProfile>> {
        (**self).find_user(id).await
    }
}

/// In-memory user directory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryUserDirectory {
    users: Arc<RwLock<HashMap<UserId, UserProfile>>>,
}

impl InMemoryUserDirectory {
    /// Creates an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a profile.
    pub fn insert(&self, profile: UserProfile) {
        self.users
            .write()
            .unwrap()
            .insert(profile.id.clone(), profile);
    }

    /// Returns the number of known users.
    pub fn len(&self) -> usize {
        self.users.read().unwrap().len()
    }

    /// Returns true if the directory is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FromIterator<UserProfile> for InMemoryUserDirectory {
    fn from_iter<I: IntoIterator<Item = UserProfile>>(iter: I) -> Self {
        let directory = Self::new();
        for profile in iter {
            directory.insert(profile);
        }
        directory
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn find_user(&self, id: &UserId) -> Result<Option<UserProfile>> {
        Ok(self.users.read().unwrap().get(id).cloned())
    }
}
