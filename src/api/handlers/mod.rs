//! HTTP handlers for the auth API.
//!
//! Handlers are thin: they parse the request, call into [`crate::auth`] and
//! map [`AuthError`] onto the HTTP contract in one place.

pub mod health;
pub mod login;
pub mod me;
pub mod rate_limit;
pub mod register;
pub mod types;

use axum::{
    http::{
        header::{AUTHORIZATION, RETRY_AFTER, WWW_AUTHENTICATE},
        HeaderMap, HeaderValue, StatusCode,
    },
    response::{IntoResponse, Response},
    Json,
};
use secrecy::{ExposeSecret, SecretString};
use subtle::ConstantTimeEq;
use tracing::error;

use crate::auth::{AuthError, Authenticator, Registrar, INVALID_CREDENTIALS_MESSAGE};
use types::ErrorResponse;

/// Shared handler state, injected as an `Extension<Arc<AuthState>>`.
pub struct AuthState {
    authenticator: Authenticator,
    registrar: Registrar,
    operator_token: Option<SecretString>,
}

impl AuthState {
    #[must_use]
    pub fn new(
        authenticator: Authenticator,
        registrar: Registrar,
        operator_token: Option<SecretString>,
    ) -> Self {
        Self {
            authenticator,
            registrar,
            operator_token,
        }
    }

    #[must_use]
    pub fn authenticator(&self) -> &Authenticator {
        &self.authenticator
    }

    #[must_use]
    pub fn registrar(&self) -> &Registrar {
        &self.registrar
    }

    #[must_use]
    pub fn operator_token(&self) -> Option<&SecretString> {
        self.operator_token.as_ref()
    }
}

/// Extract the token from an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    if scheme.eq_ignore_ascii_case("bearer") && !token.is_empty() {
        Some(token)
    } else {
        None
    }
}

/// Constant-time comparison of a presented secret against the configured one.
pub fn secret_matches(presented: &str, expected: &SecretString) -> bool {
    presented
        .as_bytes()
        .ct_eq(expected.expose_secret().as_bytes())
        .into()
}

fn detail(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            detail: message.into(),
            errors: None,
        }),
    )
        .into_response()
}

pub(crate) fn unauthorized(message: &str) -> Response {
    let mut response = detail(StatusCode::UNAUTHORIZED, message);
    response
        .headers_mut()
        .insert(WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
    response
}

pub(crate) fn missing_payload() -> Response {
    detail(StatusCode::BAD_REQUEST, "Missing payload")
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        match self {
            Self::InvalidInput(message) => detail(StatusCode::BAD_REQUEST, message),
            Self::RateLimited { retry_after } => {
                let seconds = retry_after.as_secs().max(1);
                let mut response = detail(
                    StatusCode::TOO_MANY_REQUESTS,
                    format!("Too many failed login attempts, retry in {seconds}s"),
                );
                response
                    .headers_mut()
                    .insert(RETRY_AFTER, HeaderValue::from(seconds));
                response
            }
            Self::InvalidCredentials => unauthorized(INVALID_CREDENTIALS_MESSAGE),
            Self::InvalidToken => unauthorized("Invalid or expired token"),
            Self::DuplicateIdentity => detail(
                StatusCode::CONFLICT,
                "A user with this email or username already exists",
            ),
            Self::StoreUnavailable => {
                error!("Responding 503, backing store unavailable");
                detail(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Service temporarily unavailable",
                )
            }
            Self::Validation(validation) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(ErrorResponse {
                    detail: "Registration validation failed".to_string(),
                    errors: Some(validation.errors),
                }),
            )
                .into_response(),
        }
    }
}
