//! Bearer tokens for authenticated sessions.
//!
//! Tokens are HS256 JWTs. They are never stored; validation checks the
//! signature and the `exp` claim only.

use async_trait::async_trait;
use chrono::{TimeDelta, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;
use tracing::{debug, error};

use super::{
    error::AuthError,
    types::{Claims, SessionToken, UserRecord},
};

pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(60 * 60);
/// Longest accepted session lifetime.
pub const MAX_TOKEN_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

#[async_trait]
pub trait TokenIssuer: Send + Sync {
    async fn issue(&self, user: &UserRecord) -> Result<SessionToken, AuthError>;

    /// # Errors
    /// Returns `AuthError::InvalidToken` for bad signatures, malformed or expired tokens.
    fn validate(&self, token: &str) -> Result<Claims, AuthError>;

    fn ttl(&self) -> Duration;
}

pub struct JwtIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl: Duration,
}

impl std::fmt::Debug for JwtIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtIssuer")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl JwtIssuer {
    #[must_use]
    pub fn new(secret: &SecretString, ttl: Duration) -> Self {
        let secret = secret.expose_secret().as_bytes();
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            ttl,
        }
    }

    fn validation() -> Validation {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);
        validation
    }
}

#[async_trait]
impl TokenIssuer for JwtIssuer {
    async fn issue(&self, user: &UserRecord) -> Result<SessionToken, AuthError> {
        let issued_at = Utc::now();
        let expires_at = TimeDelta::from_std(self.ttl)
            .ok()
            .and_then(|ttl| issued_at.checked_add_signed(ttl))
            .ok_or_else(|| {
                error!(ttl_secs = self.ttl.as_secs(), "Session token TTL out of range");
                AuthError::StoreUnavailable
            })?;

        let claims = Claims {
            sub: user.id,
            email: user.email.clone(),
            role: user.role,
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|err| {
                error!("Failed to encode session token: {err}");
                AuthError::StoreUnavailable
            })?;

        Ok(SessionToken { token, expires_at })
    }

    fn validate(&self, token: &str) -> Result<Claims, AuthError> {
        decode::<Claims>(token, &self.decoding_key, &Self::validation())
            .map(|data| data.claims)
            .map_err(|err| {
                debug!("Rejected session token: {err}");
                AuthError::InvalidToken
            })
    }

    fn ttl(&self) -> Duration {
        self.ttl
    }
}
