use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;

use super::{bearer_token, missing_payload, secret_matches, types::ErrorResponse, unauthorized, AuthState};

#[derive(ToSchema, Deserialize, Debug)]
pub struct ResetRateLimitRequest {
    #[serde(default)]
    email: String,
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/reset-rate-limit",
    request_body = ResetRateLimitRequest,
    responses(
        (status = 204, description = "Failed-login counter cleared"),
        (status = 400, description = "Missing or malformed email", body = ErrorResponse),
        (status = 401, description = "Missing or wrong operator token", body = ErrorResponse),
        (status = 404, description = "No operator token configured"),
        (status = 503, description = "Backing store unavailable", body = ErrorResponse),
    ),
    security(("operator_token" = [])),
    tag = "operator"
)]
#[instrument(skip(headers, state, payload))]
pub async fn reset_rate_limit(
    headers: HeaderMap,
    state: Extension<Arc<AuthState>>,
    payload: Option<Json<ResetRateLimitRequest>>,
) -> Response {
    let Some(expected) = state.operator_token() else {
        return StatusCode::NOT_FOUND.into_response();
    };

    if !bearer_token(&headers).is_some_and(|token| secret_matches(token, expected)) {
        warn!("Rejected rate-limit reset, bad operator token");
        return unauthorized("Invalid operator token");
    }

    let Some(Json(request)) = payload else {
        return missing_payload();
    };

    match state.authenticator().reset_rate_limit(&request.email).await {
        Ok(()) => {
            info!("Operator reset login rate limit");
            StatusCode::NO_CONTENT.into_response()
        }
        Err(err) => err.into_response(),
    }
}
