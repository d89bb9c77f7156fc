//! Small helpers for identity normalization and bounded store calls.

use once_cell::sync::Lazy;
use regex::Regex;
use std::{future::Future, time::Duration};
use tokio::time::timeout;
use tracing::error;

use super::error::{AuthError, StoreError};

static EMAIL_RE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").ok());

/// Normalize an email for lookup/uniqueness checks.
pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Basic email format check on already-normalized input.
pub(crate) fn valid_email(email_normalized: &str) -> bool {
    EMAIL_RE
        .as_ref()
        .is_some_and(|regex| regex.is_match(email_normalized))
}

/// Normalize and validate a login identity.
pub(crate) fn normalize_identity(identity: &str) -> Result<String, AuthError> {
    let identity = normalize_email(identity);
    if identity.is_empty() {
        return Err(AuthError::InvalidInput("email is required".to_string()));
    }
    if !valid_email(&identity) {
        return Err(AuthError::InvalidInput("email is not valid".to_string()));
    }
    Ok(identity)
}

/// Run a store call under `limit`, mapping failures and timeouts to `StoreUnavailable`.
pub(crate) async fn bounded<T, F>(
    limit: Duration,
    operation: &'static str,
    call: F,
) -> Result<T, AuthError>
where
    F: Future<Output = Result<T, StoreError>> + Send,
{
    match timeout(limit, call).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => {
            if !matches!(err, StoreError::Conflict) {
                error!(operation, "Store call failed: {err}");
            }
            Err(err.into())
        }
        Err(_) => {
            error!(operation, timeout_ms = limit.as_millis(), "Store call timed out");
            Err(AuthError::StoreUnavailable)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_email_trims_and_lowercases() {
        assert_eq!(normalize_email(" Alice@Example.COM "), "alice@example.com");
    }

    #[test]
    fn valid_email_accepts_basic_format() {
        assert!(valid_email("a@test.com"));
        assert!(valid_email("name.surname@example.co"));
    }

    #[test]
    fn valid_email_rejects_missing_parts() {
        assert!(!valid_email("not-an-email"));
        assert!(!valid_email("missing-at.example.com"));
        assert!(!valid_email("missing-domain@"));
        assert!(!valid_email("with space@test.com"));
    }

    #[test]
    fn normalize_identity_rejects_blank_and_malformed() {
        assert!(matches!(
            normalize_identity("   "),
            Err(AuthError::InvalidInput(_))
        ));
        assert!(matches!(
            normalize_identity("nope"),
            Err(AuthError::InvalidInput(_))
        ));
        assert_eq!(
            normalize_identity(" A@Test.com"),
            Ok("a@test.com".to_string())
        );
    }

    #[tokio::test]
    async fn bounded_times_out_slow_calls() {
        let result: Result<(), AuthError> = bounded(Duration::from_millis(10), "slow", async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert_eq!(result, Err(AuthError::StoreUnavailable));
    }

    #[tokio::test]
    async fn bounded_maps_store_errors() {
        let result: Result<(), AuthError> = bounded(Duration::from_secs(1), "fail", async {
            Err(StoreError::Unavailable("down".to_string()))
        })
        .await;
        assert_eq!(result, Err(AuthError::StoreUnavailable));

        let result: Result<(), AuthError> =
            bounded(Duration::from_secs(1), "conflict", async { Err(StoreError::Conflict) })
                .await;
        assert_eq!(result, Err(AuthError::DuplicateIdentity));
    }
}
