//! Credential verification with per-identity lockout.
//!
//! Flow Overview:
//! 1) Validate input; malformed requests never touch the stores.
//! 2) Count the attempt with one atomic increment. Attempts past the threshold
//!    inside the window are rejected before any credential lookup, so parallel
//!    requests for one identity verify at most `max_failures` passwords.
//! 3) Verify the password (a dummy hash is verified for unknown identities).
//! 4) Failures keep the counted attempt; success clears the entry and issues a token.

use chrono::Utc;
use std::{sync::Arc, time::Duration};
use tracing::{debug, error, info, instrument, warn};

use super::{
    error::AuthError,
    password::{hash_password, needs_rehash, verify_password, DUMMY_HASH},
    rate_limit::{RateLimitPolicy, RateLimitStore},
    store::UserStore,
    token::TokenIssuer,
    types::{LoginSuccess, RateLimitEntry, UserRecord, UserUpdate},
    utils::{bounded, normalize_identity},
};

pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone, Copy, Debug)]
pub struct AuthConfig {
    policy: RateLimitPolicy,
    store_timeout: Duration,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            policy: RateLimitPolicy::default(),
            store_timeout: DEFAULT_STORE_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_rate_limit(mut self, max_failures: u32, window: Duration) -> Self {
        self.policy = RateLimitPolicy::new(max_failures, window);
        self
    }

    #[must_use]
    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    #[must_use]
    pub fn policy(&self) -> RateLimitPolicy {
        self.policy
    }

    #[must_use]
    pub fn store_timeout(&self) -> Duration {
        self.store_timeout
    }
}

pub struct Authenticator {
    users: Arc<dyn UserStore>,
    rate_limits: Arc<dyn RateLimitStore>,
    tokens: Arc<dyn TokenIssuer>,
    config: AuthConfig,
}

impl Authenticator {
    #[must_use]
    pub fn new(
        users: Arc<dyn UserStore>,
        rate_limits: Arc<dyn RateLimitStore>,
        tokens: Arc<dyn TokenIssuer>,
        config: AuthConfig,
    ) -> Self {
        Self {
            users,
            rate_limits,
            tokens,
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn tokens(&self) -> &dyn TokenIssuer {
        self.tokens.as_ref()
    }

    /// Verify credentials and issue a session token.
    ///
    /// # Errors
    /// `InvalidInput`, `RateLimited`, `InvalidCredentials` or `StoreUnavailable`.
    #[instrument(skip(self, password))]
    pub async fn attempt_login(
        &self,
        identity: &str,
        password: &str,
    ) -> Result<LoginSuccess, AuthError> {
        let identity = normalize_identity(identity)?;
        if password.is_empty() {
            return Err(AuthError::InvalidInput("password is required".to_string()));
        }

        let timeout = self.config.store_timeout;
        let policy = self.config.policy;

        let entry = bounded(
            timeout,
            "rate_limits.increment",
            self.rate_limits.increment(&identity),
        )
        .await?;
        if entry.failure_count > policy.max_failures() {
            if let Some(retry_after) = policy.retry_after(&entry, Utc::now()) {
                warn!(
                    attempts = entry.failure_count,
                    retry_after_secs = retry_after.as_secs(),
                    "Login rejected, identity is locked"
                );
                return Err(AuthError::RateLimited { retry_after });
            }
        }

        let user = bounded(
            timeout,
            "users.find_by_identity",
            self.users.find_by_identity(&identity),
        )
        .await?;

        let stored = user
            .as_ref()
            .map_or(DUMMY_HASH, |user| user.hashed_password.as_str());
        let matched = verify_blocking(password, stored).await?;

        match user {
            Some(user) if matched => self.complete_login(&identity, user, password).await,
            _ => Err(self.failure(&entry)),
        }
    }

    /// Clear the failure count for an identity.
    ///
    /// # Errors
    /// `InvalidInput` for malformed identities, `StoreUnavailable` on store failures.
    #[instrument(skip(self))]
    pub async fn reset_rate_limit(&self, identity: &str) -> Result<(), AuthError> {
        let identity = normalize_identity(identity)?;
        bounded(
            self.config.store_timeout,
            "rate_limits.clear",
            self.rate_limits.clear(&identity),
        )
        .await?;
        info!("Rate limit reset");
        Ok(())
    }

    /// Resolve a bearer token into the user it was issued for.
    ///
    /// # Errors
    /// `InvalidToken` if the token is invalid, expired, or its user no longer exists.
    pub async fn current_user(&self, token: &str) -> Result<UserRecord, AuthError> {
        let claims = self.tokens.validate(token)?;
        bounded(
            self.config.store_timeout,
            "users.find_by_id",
            self.users.find_by_id(claims.sub),
        )
        .await?
        .ok_or(AuthError::InvalidToken)
    }

    async fn complete_login(
        &self,
        identity: &str,
        user: UserRecord,
        password: &str,
    ) -> Result<LoginSuccess, AuthError> {
        let timeout = self.config.store_timeout;

        bounded(timeout, "rate_limits.clear", self.rate_limits.clear(identity)).await?;

        if needs_rehash(&user.hashed_password) {
            self.upgrade_hash(&user, password).await;
        }

        let token = match tokio::time::timeout(timeout, self.tokens.issue(&user)).await {
            Ok(result) => result?,
            Err(_) => {
                error!("Token issuance timed out");
                return Err(AuthError::StoreUnavailable);
            }
        };

        info!(user_id = %user.id, role = %user.role, "Login successful");

        Ok(LoginSuccess { token, user })
    }

    /// Error for a failed attempt already counted in `entry`.
    ///
    /// The attempt that reaches the threshold already reports the lockout.
    fn failure(&self, entry: &RateLimitEntry) -> AuthError {
        debug!(failures = entry.failure_count, "Login failed");

        match self.config.policy.retry_after(entry, Utc::now()) {
            Some(retry_after) => {
                warn!(
                    failures = entry.failure_count,
                    retry_after_secs = retry_after.as_secs(),
                    "Identity locked after repeated failures"
                );
                AuthError::RateLimited { retry_after }
            }
            None => AuthError::InvalidCredentials,
        }
    }

    /// Re-hash legacy credentials with the default algorithm. Best effort.
    async fn upgrade_hash(&self, user: &UserRecord, password: &str) {
        let password = password.to_string();
        let hashed = match tokio::task::spawn_blocking(move || hash_password(&password)).await {
            Ok(Ok(hashed)) => hashed,
            Ok(Err(err)) => {
                error!("Failed to re-hash legacy password: {err}");
                return;
            }
            Err(err) => {
                error!("Re-hash task failed: {err}");
                return;
            }
        };

        let update = UserUpdate {
            hashed_password: Some(hashed),
            ..UserUpdate::default()
        };
        match bounded(
            self.config.store_timeout,
            "users.update",
            self.users.update(user.id, &update),
        )
        .await
        {
            Ok(()) => info!(user_id = %user.id, "Upgraded legacy password hash"),
            Err(err) => warn!(user_id = %user.id, "Could not upgrade legacy password hash: {err}"),
        }
    }
}

/// Verify off the async runtime; unusable hashes count as a mismatch.
///
/// Anything that is not an argon2id verification also pays for the dummy
/// hash, so latency does not depend on how the account's hash is stored.
async fn verify_blocking(password: &str, stored: &str) -> Result<bool, AuthError> {
    let password = password.to_string();
    let stored = stored.to_string();
    let result = tokio::task::spawn_blocking(move || {
        let result = verify_password(&password, &stored);
        if result.is_err() || needs_rehash(&stored) {
            let _ = verify_password(&password, DUMMY_HASH);
        }
        result
    })
    .await
    .map_err(|err| {
        error!("Password verification task failed: {err}");
        AuthError::StoreUnavailable
    })?;

    Ok(result.unwrap_or_else(|err| {
        error!("Stored password hash rejected: {err}");
        false
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use std::time::Instant;

    async fn elapsed(stored: &str) -> Result<(bool, Duration)> {
        let started = Instant::now();
        let matched = verify_blocking("Pass123!", stored).await?;
        Ok((matched, started.elapsed()))
    }

    #[tokio::test]
    async fn unusable_hashes_cost_a_full_verification() -> Result<()> {
        let (_, baseline) = elapsed(DUMMY_HASH).await?;

        for stored in [
            "md5$00$00",
            "garbage",
            "sha256$73616c74$0000000000000000000000000000000000000000000000000000000000000000",
        ] {
            let (matched, took) = elapsed(stored).await?;
            assert!(!matched, "{stored}");
            assert!(
                took * 10 >= baseline,
                "{stored} took {took:?}, dummy verification took {baseline:?}"
            );
        }
        Ok(())
    }
}
