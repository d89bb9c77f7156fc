//! Store implementations backing the auth collaborators.
//!
//! Postgres stores share one `PgPool` built at startup; the schema is owned
//! by the versioned migrations in `migrations/`.

pub mod memory;
mod rate_limit;
mod users;

pub use memory::MemoryUserStore;
pub use rate_limit::PgRateLimitStore;
pub use users::PgUserStore;

use anyhow::{Context, Result};
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;
use tracing::info;

use crate::auth::StoreError;

/// Connect to the database and apply pending migrations.
///
/// # Errors
/// Returns an error if the connection or a migration fails.
pub async fn connect(dsn: &str, acquire_timeout: Duration) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .acquire_timeout(acquire_timeout)
        .test_before_acquire(true)
        .connect(dsn)
        .await
        .context("Failed to connect to database")?;

    sqlx::migrate!()
        .run(&pool)
        .await
        .context("Failed to apply database migrations")?;

    info!("Database migrations applied");

    Ok(pool)
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

pub(crate) fn map_sqlx_error(err: sqlx::Error) -> StoreError {
    if is_unique_violation(&err) {
        StoreError::Conflict
    } else {
        StoreError::Unavailable(err.to_string())
    }
}

/// Postgres interval literal for a window, with millisecond precision.
fn interval(window: Duration) -> String {
    format!("{} milliseconds", window.as_millis())
}

#[cfg(test)]
pub(crate) mod test_db {
    use anyhow::{Context, Result};
    use sqlx::PgPool;
    use std::time::Duration;

    pub(crate) const DSN_ENV: &str = "STOREFRONT_TEST_DSN";

    /// Pool for a disposable database named by `STOREFRONT_TEST_DSN`, or `None` to skip.
    pub(crate) async fn pool() -> Result<Option<PgPool>> {
        let Ok(dsn) = std::env::var(DSN_ENV) else {
            eprintln!("Skipping integration test: {DSN_ENV} not set");
            return Ok(None);
        };
        let pool = super::connect(&dsn, Duration::from_secs(10))
            .await
            .context("failed to prepare test database")?;
        Ok(Some(pool))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::error::{DatabaseError, ErrorKind};
    use std::borrow::Cow;
    use std::error::Error as StdError;
    use std::fmt;

    #[derive(Debug)]
    struct TestDbError {
        code: Option<&'static str>,
    }

    impl fmt::Display for TestDbError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "test database error")
        }
    }

    impl StdError for TestDbError {}

    impl DatabaseError for TestDbError {
        fn message(&self) -> &str {
            "test database error"
        }

        fn code(&self) -> Option<Cow<'_, str>> {
            self.code.map(Cow::Borrowed)
        }

        fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn StdError + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn StdError + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> ErrorKind {
            ErrorKind::UniqueViolation
        }
    }

    #[test]
    fn unique_violation_maps_to_conflict() {
        let err = sqlx::Error::Database(Box::new(TestDbError {
            code: Some("23505"),
        }));
        assert!(matches!(map_sqlx_error(err), StoreError::Conflict));
    }

    #[test]
    fn other_errors_map_to_unavailable() {
        let err = sqlx::Error::Database(Box::new(TestDbError {
            code: Some("99999"),
        }));
        assert!(matches!(map_sqlx_error(err), StoreError::Unavailable(_)));
        assert!(matches!(
            map_sqlx_error(sqlx::Error::PoolTimedOut),
            StoreError::Unavailable(_)
        ));
    }

    #[test]
    fn interval_uses_milliseconds() {
        assert_eq!(interval(Duration::from_secs(900)), "900000 milliseconds");
        assert_eq!(interval(Duration::from_millis(250)), "250 milliseconds");
    }
}
