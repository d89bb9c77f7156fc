use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;

use super::{
    bearer_token,
    types::{ErrorResponse, UserResponse},
    unauthorized, AuthState,
};

#[utoipa::path(
    get,
    path = "/api/v1/auth/me",
    responses(
        (status = 200, description = "Profile of the token's user", body = UserResponse),
        (status = 401, description = "Missing, invalid or expired bearer token", body = ErrorResponse),
        (status = 503, description = "Backing store unavailable", body = ErrorResponse),
    ),
    security(("bearer_token" = [])),
    tag = "auth"
)]
pub async fn me(headers: HeaderMap, state: Extension<Arc<AuthState>>) -> Response {
    let Some(token) = bearer_token(&headers) else {
        return unauthorized("Missing bearer token");
    };

    match state.authenticator().current_user(token).await {
        Ok(user) => (StatusCode::OK, Json(UserResponse::from(user))).into_response(),
        Err(err) => err.into_response(),
    }
}
