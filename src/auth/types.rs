//! Domain types shared by the authenticator, the stores and the HTTP layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use utoipa::ToSchema;
use uuid::Uuid;

pub type UserId = Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Buyer,
    Seller,
}

impl Role {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Buyer => "buyer",
            Self::Seller => "seller",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "buyer" => Ok(Self::Buyer),
            "seller" => Ok(Self::Seller),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// Stored user: credential record plus the profile fields returned on login.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserRecord {
    pub id: UserId,
    pub email: String,
    pub username: Option<String>,
    pub first_name: String,
    pub last_name: Option<String>,
    pub hashed_password: String,
    pub role: Role,
}

/// Validated registration ready to be persisted. Never carries plaintext.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewUser {
    pub email: String,
    pub username: Option<String>,
    pub first_name: String,
    pub last_name: Option<String>,
    pub hashed_password: String,
    pub role: Role,
}

impl NewUser {
    #[must_use]
    pub fn into_record(self, id: UserId) -> UserRecord {
        UserRecord {
            id,
            email: self.email,
            username: self.username,
            first_name: self.first_name,
            last_name: self.last_name,
            hashed_password: self.hashed_password,
            role: self.role,
        }
    }
}

/// Partial update; `None` leaves a column untouched.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UserUpdate {
    pub first_name: Option<String>,
    /// `Some(None)` clears the last name.
    pub last_name: Option<Option<String>>,
    pub hashed_password: Option<String>,
    pub role: Option<Role>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RateLimitEntry {
    pub identity: String,
    pub failure_count: u32,
    pub window_start: DateTime<Utc>,
}

/// Bearer token handed to the client after a successful login.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Claims carried by a session token.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: UserId,
    pub email: String,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

/// Result of a successful login.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoginSuccess {
    pub token: SessionToken,
    pub user: UserRecord,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_parses_case_insensitively() {
        assert_eq!("Seller".parse::<Role>(), Ok(Role::Seller));
        assert_eq!(" buyer ".parse::<Role>(), Ok(Role::Buyer));
        assert!("admin".parse::<Role>().is_err());
    }

    #[test]
    fn role_serializes_lowercase() -> anyhow::Result<()> {
        assert_eq!(serde_json::to_string(&Role::Seller)?, "\"seller\"");
        Ok(())
    }
}
