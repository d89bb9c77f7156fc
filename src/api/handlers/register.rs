use axum::{
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use tracing::{debug, instrument};

use super::{
    missing_payload,
    types::{ErrorResponse, UserResponse},
    AuthState,
};
use crate::auth::RegistrationRequest;

#[utoipa::path(
    post,
    path = "/api/v1/auth/register",
    request_body = RegistrationRequest,
    responses(
        (status = 200, description = "User registered", body = UserResponse),
        (status = 400, description = "Missing payload", body = ErrorResponse),
        (status = 409, description = "Email or username already taken", body = ErrorResponse),
        (status = 422, description = "One or more fields failed validation", body = ErrorResponse),
        (status = 503, description = "Backing store unavailable", body = ErrorResponse),
    ),
    tag = "auth"
)]
#[instrument(skip(state, payload))]
pub async fn register(
    state: Extension<Arc<AuthState>>,
    payload: Option<Json<RegistrationRequest>>,
) -> Response {
    let Some(Json(request)) = payload else {
        return missing_payload();
    };

    debug!("request: {:?}", request);

    match state.registrar().register(request).await {
        Ok(user) => (StatusCode::OK, Json(UserResponse::from(user))).into_response(),
        Err(err) => err.into_response(),
    }
}
