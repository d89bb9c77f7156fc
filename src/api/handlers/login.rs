use axum::{
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument};
use utoipa::ToSchema;

use super::{
    missing_payload,
    types::{ErrorResponse, UserResponse},
    AuthState,
};

#[derive(ToSchema, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
    pub user: UserResponse,
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = LoginResponse),
        (status = 400, description = "Missing or malformed email or password", body = ErrorResponse),
        (status = 401, description = "Incorrect email or password", body = ErrorResponse),
        (status = 429, description = "Too many failed attempts, see Retry-After", body = ErrorResponse),
        (status = 503, description = "Backing store unavailable", body = ErrorResponse),
    ),
    tag = "auth"
)]
#[instrument(skip(state, payload))]
pub async fn login(
    state: Extension<Arc<AuthState>>,
    payload: Option<Json<LoginRequest>>,
) -> Response {
    let Some(Json(request)) = payload else {
        return missing_payload();
    };

    match state
        .authenticator()
        .attempt_login(&request.email, &request.password)
        .await
    {
        Ok(success) => {
            debug!(user_id = %success.user.id, "Login succeeded");
            let body = LoginResponse {
                access_token: success.token.token,
                token_type: "bearer".to_string(),
                expires_in: state.authenticator().tokens().ttl().as_secs(),
                user: success.user.into(),
            };
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(err) => err.into_response(),
    }
}
