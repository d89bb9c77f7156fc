use std::time::Duration;
use thiserror::Error;

/// Message shared by unknown identities and wrong passwords.
pub const INVALID_CREDENTIALS_MESSAGE: &str = "Incorrect email or password";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Too many failed login attempts, retry in {}s", retry_after.as_secs())]
    RateLimited { retry_after: Duration },
    #[error("Incorrect email or password")]
    InvalidCredentials,
    #[error("A user with this email or username already exists")]
    DuplicateIdentity,
    #[error("Service temporarily unavailable")]
    StoreUnavailable,
    #[error("Invalid or expired token")]
    InvalidToken,
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Failure reported by a store implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("unique constraint violated")]
    Conflict,
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(_) => Self::StoreUnavailable,
            StoreError::Conflict => Self::DuplicateIdentity,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, utoipa::ToSchema)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

/// Every field that failed registration validation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Error)]
#[error("Registration validation failed: {}", summarize(.errors))]
pub struct ValidationError {
    pub errors: Vec<FieldError>,
}

impl ValidationError {
    pub(crate) fn push(&mut self, field: &'static str, message: impl Into<String>) {
        self.errors.push(FieldError {
            field,
            message: message.into(),
        });
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    #[must_use]
    pub fn has_field(&self, field: &str) -> bool {
        self.errors.iter().any(|err| err.field == field)
    }
}

fn summarize(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|err| format!("{}: {}", err.field, err.message))
        .collect::<Vec<_>>()
        .join("; ")
}
