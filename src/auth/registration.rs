//! Registration validation and user creation.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};
use tracing::{error, info, instrument};
use utoipa::ToSchema;

use super::{
    error::{AuthError, ValidationError},
    password::hash_password,
    store::UserStore,
    types::{NewUser, Role, UserRecord},
    utils::{bounded, normalize_email, valid_email},
};

pub const MIN_PASSWORD_LEN: usize = 8;
pub const MAX_PASSWORD_LEN: usize = 128;
const MAX_NAME_LEN: usize = 100;

static USERNAME_RE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_.-]{3,50}$").ok());

/// Registration payload as submitted by the client.
#[derive(ToSchema, Serialize, Deserialize, Clone, Default)]
pub struct RegistrationRequest {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

impl std::fmt::Debug for RegistrationRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistrationRequest")
            .field("email", &self.email)
            .field("username", &self.username)
            .field("first_name", &self.first_name)
            .field("last_name", &self.last_name)
            .field("role", &self.role)
            .finish_non_exhaustive()
    }
}

/// Trim and map blank strings to `None`.
fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn password_violation(password: &str) -> Option<String> {
    let length = password.chars().count();
    if length < MIN_PASSWORD_LEN {
        return Some(format!(
            "must be at least {MIN_PASSWORD_LEN} characters long"
        ));
    }
    if length > MAX_PASSWORD_LEN {
        return Some(format!("must be at most {MAX_PASSWORD_LEN} characters long"));
    }
    if !password
        .chars()
        .any(|c| c.is_ascii_digit() || !c.is_alphanumeric())
    {
        return Some("must contain at least one digit or symbol".to_string());
    }
    None
}

/// Validate and normalize a registration, hashing the password.
///
/// # Errors
/// Returns `AuthError::Validation` listing every invalid field, or
/// `AuthError::StoreUnavailable` if the password cannot be hashed.
pub fn validate_registration(request: &RegistrationRequest) -> Result<NewUser, AuthError> {
    let mut errors = ValidationError::default();

    let email = request
        .email
        .as_deref()
        .map(normalize_email)
        .unwrap_or_default();
    if email.is_empty() {
        errors.push("email", "is required");
    } else if !valid_email(&email) {
        errors.push("email", "is not a valid email address");
    }

    let username = non_blank(request.username.as_deref());
    if let Some(username) = &username {
        let valid = USERNAME_RE
            .as_ref()
            .is_some_and(|regex| regex.is_match(username));
        if !valid {
            errors.push(
                "username",
                "must be 3-50 characters of letters, digits, '_', '.' or '-'",
            );
        }
    }

    let first_name = non_blank(request.first_name.as_deref());
    match &first_name {
        None => errors.push("first_name", "is required"),
        Some(name) if name.chars().count() > MAX_NAME_LEN => {
            errors.push("first_name", format!("must be at most {MAX_NAME_LEN} characters"));
        }
        Some(_) => {}
    }

    let last_name = non_blank(request.last_name.as_deref());
    if last_name
        .as_ref()
        .is_some_and(|name| name.chars().count() > MAX_NAME_LEN)
    {
        errors.push("last_name", format!("must be at most {MAX_NAME_LEN} characters"));
    }

    let password = request.password.as_deref().unwrap_or_default();
    if password.is_empty() {
        errors.push("password", "is required");
    } else if let Some(violation) = password_violation(password) {
        errors.push("password", violation);
    }

    let role = match non_blank(request.role.as_deref()) {
        None => Some(Role::Buyer),
        Some(role) => role.parse::<Role>().ok(),
    };
    if role.is_none() {
        errors.push("role", "must be one of: buyer, seller");
    }

    if !errors.is_empty() {
        return Err(AuthError::Validation(errors));
    }

    let (Some(first_name), Some(role)) = (first_name, role) else {
        return Err(AuthError::Validation(errors));
    };

    let hashed_password = hash_password(password).map_err(|err| {
        error!("Failed to hash password: {err}");
        AuthError::StoreUnavailable
    })?;

    Ok(NewUser {
        email,
        username,
        first_name,
        last_name,
        hashed_password,
        role,
    })
}

/// Validates registrations and persists them through the user store.
pub struct Registrar {
    users: Arc<dyn UserStore>,
    store_timeout: Duration,
}

impl Registrar {
    #[must_use]
    pub fn new(users: Arc<dyn UserStore>, store_timeout: Duration) -> Self {
        Self {
            users,
            store_timeout,
        }
    }

    /// Register a new user.
    ///
    /// # Errors
    /// `Validation` for invalid fields, `DuplicateIdentity` if the email or
    /// username is taken, `StoreUnavailable` on store failures.
    #[instrument(skip(self, request), fields(email = request.email.as_deref().unwrap_or_default()))]
    pub async fn register(&self, request: RegistrationRequest) -> Result<UserRecord, AuthError> {
        let new_user = tokio::task::spawn_blocking(move || validate_registration(&request))
            .await
            .map_err(|err| {
                error!("Registration task failed: {err}");
                AuthError::StoreUnavailable
            })??;

        let id = bounded(self.store_timeout, "users.create", self.users.create(&new_user)).await?;

        info!(user_id = %id, role = %new_user.role, "User registered");

        Ok(new_user.into_record(id))
    }
}
