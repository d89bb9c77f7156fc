use async_trait::async_trait;
use sqlx::{postgres::PgRow, PgPool, Row};
use tracing::Instrument;
use uuid::Uuid;

use super::map_sqlx_error;
use crate::auth::{NewUser, Role, StoreError, UserId, UserRecord, UserStore, UserUpdate};

const USER_COLUMNS: &str =
    "id, email, username, first_name, last_name, hashed_password, role";

#[derive(Clone, Debug)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn user_from_row(row: &PgRow) -> Result<UserRecord, StoreError> {
    let role: String = row.get("role");
    let role = role
        .parse::<Role>()
        .map_err(|err| StoreError::Unavailable(format!("corrupt user row: {err}")))?;

    Ok(UserRecord {
        id: row.get("id"),
        email: row.get("email"),
        username: row.get("username"),
        first_name: row.get("first_name"),
        last_name: row.get("last_name"),
        hashed_password: row.get("hashed_password"),
        role,
    })
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_identity(&self, identity: &str) -> Result<Option<UserRecord>, StoreError> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query.as_str()
        );
        let row = sqlx::query(&query)
            .bind(identity)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .map_err(map_sqlx_error)?;

        row.as_ref().map(user_from_row).transpose()
    }

    async fn create(&self, user: &NewUser) -> Result<UserId, StoreError> {
        let query = r"
            INSERT INTO users
                (id, email, username, first_name, last_name, hashed_password, role)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let id = Uuid::new_v4();
        sqlx::query(query)
            .bind(id)
            .bind(&user.email)
            .bind(user.username.as_deref())
            .bind(&user.first_name)
            .bind(user.last_name.as_deref())
            .bind(&user.hashed_password)
            .bind(user.role.as_str())
            .execute(&self.pool)
            .instrument(span)
            .await
            .map_err(map_sqlx_error)?;

        Ok(id)
    }

    async fn update(&self, id: UserId, update: &UserUpdate) -> Result<(), StoreError> {
        let query = r"
            UPDATE users SET
                first_name = COALESCE($2, first_name),
                last_name = CASE WHEN $3 THEN $4 ELSE last_name END,
                hashed_password = COALESCE($5, hashed_password),
                role = COALESCE($6, role),
                updated_at = NOW()
            WHERE id = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(id)
            .bind(update.first_name.as_deref())
            .bind(update.last_name.is_some())
            .bind(update.last_name.clone().flatten())
            .bind(update.hashed_password.as_deref())
            .bind(update.role.map(Role::as_str))
            .execute(&self.pool)
            .instrument(span)
            .await
            .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<UserRecord>, StoreError> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query.as_str()
        );
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .map_err(map_sqlx_error)?;

        row.as_ref().map(user_from_row).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_db;
    use anyhow::{Context, Result};

    fn new_user(email: &str) -> NewUser {
        NewUser {
            email: email.to_string(),
            username: None,
            first_name: "Single".to_string(),
            last_name: None,
            hashed_password: "argon2id$00$00".to_string(),
            role: Role::Seller,
        }
    }

    #[tokio::test]
    async fn nullable_last_name_round_trips() -> Result<()> {
        let Some(pool) = test_db::pool().await? else {
            return Ok(());
        };
        let store = PgUserStore::new(pool);
        let email = format!("{}@test.com", Uuid::new_v4().simple());

        let id = store.create(&new_user(&email)).await?;
        let found = store
            .find_by_identity(&email)
            .await?
            .context("user missing")?;
        assert_eq!(found.id, id);
        assert_eq!(found.last_name, None);
        assert_eq!(found.role, Role::Seller);

        let duplicate = store.create(&new_user(&email)).await;
        assert!(matches!(duplicate, Err(StoreError::Conflict)));
        Ok(())
    }

    #[tokio::test]
    async fn update_sets_and_clears_last_name() -> Result<()> {
        let Some(pool) = test_db::pool().await? else {
            return Ok(());
        };
        let store = PgUserStore::new(pool);
        let email = format!("{}@test.com", Uuid::new_v4().simple());
        let id = store.create(&new_user(&email)).await?;

        let set = UserUpdate {
            last_name: Some(Some("Stone".to_string())),
            ..UserUpdate::default()
        };
        store.update(id, &set).await?;
        let found = store.find_by_id(id).await?.context("user missing")?;
        assert_eq!(found.last_name.as_deref(), Some("Stone"));
        assert_eq!(found.first_name, "Single");

        let clear = UserUpdate {
            last_name: Some(None),
            ..UserUpdate::default()
        };
        store.update(id, &clear).await?;
        let found = store.find_by_id(id).await?.context("user missing")?;
        assert_eq!(found.last_name, None);
        Ok(())
    }
}
