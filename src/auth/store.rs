use async_trait::async_trait;

use super::{
    error::StoreError,
    types::{NewUser, UserId, UserRecord, UserUpdate},
};

/// Persistence of user records, keyed by normalized email.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_identity(&self, identity: &str) -> Result<Option<UserRecord>, StoreError>;

    /// Insert a user. Returns `StoreError::Conflict` if the email or username is taken.
    async fn create(&self, user: &NewUser) -> Result<UserId, StoreError>;

    async fn update(&self, id: UserId, update: &UserUpdate) -> Result<(), StoreError>;

    async fn find_by_id(&self, id: UserId) -> Result<Option<UserRecord>, StoreError>;
}
