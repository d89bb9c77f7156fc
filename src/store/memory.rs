//! In-process user store for local runs and tests.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::auth::{NewUser, StoreError, UserId, UserRecord, UserStore, UserUpdate};

#[derive(Debug, Default)]
pub struct MemoryUserStore {
    users: RwLock<HashMap<UserId, UserRecord>>,
}

impl MemoryUserStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_identity(&self, identity: &str) -> Result<Option<UserRecord>, StoreError> {
        let users = self.users.read().await;
        Ok(users.values().find(|user| user.email == identity).cloned())
    }

    async fn create(&self, user: &NewUser) -> Result<UserId, StoreError> {
        let mut users = self.users.write().await;
        let taken = users.values().any(|existing| {
            existing.email == user.email
                || (user.username.is_some() && existing.username == user.username)
        });
        if taken {
            return Err(StoreError::Conflict);
        }

        let id = Uuid::new_v4();
        users.insert(id, user.clone().into_record(id));
        Ok(id)
    }

    async fn update(&self, id: UserId, update: &UserUpdate) -> Result<(), StoreError> {
        let mut users = self.users.write().await;
        let Some(user) = users.get_mut(&id) else {
            return Ok(());
        };

        if let Some(first_name) = &update.first_name {
            user.first_name.clone_from(first_name);
        }
        if let Some(last_name) = &update.last_name {
            user.last_name.clone_from(last_name);
        }
        if let Some(hashed_password) = &update.hashed_password {
            user.hashed_password.clone_from(hashed_password);
        }
        if let Some(role) = update.role {
            user.role = role;
        }
        Ok(())
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<UserRecord>, StoreError> {
        Ok(self.users.read().await.get(&id).cloned())
    }
}
