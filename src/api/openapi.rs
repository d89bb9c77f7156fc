use super::handlers::{
    health::{self, Health},
    login::{self, LoginRequest, LoginResponse},
    me,
    rate_limit::{self, ResetRateLimitRequest},
    register,
    types::{ErrorResponse, UserResponse},
};
use crate::auth::{FieldError, RegistrationRequest, Role};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

/// Served at `/api-docs/openapi.json`; title, version and license come from Cargo metadata.
#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        login::login,
        register::register,
        me::me,
        rate_limit::reset_rate_limit,
    ),
    components(schemas(
        ErrorResponse,
        FieldError,
        Health,
        LoginRequest,
        LoginResponse,
        RegistrationRequest,
        ResetRateLimitRequest,
        Role,
        UserResponse,
    )),
    modifiers(&SecuritySchemes),
    tags(
        (name = "auth", description = "Registration, login and session tokens"),
        (name = "operator", description = "Administrative endpoints guarded by the operator token"),
        (name = "health", description = "Database status and build information"),
    )
)]
pub struct ApiDoc;

struct SecuritySchemes;

impl Modify for SecuritySchemes {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_token",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
        components.add_security_scheme(
            "operator_token",
            SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
        );
    }
}

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}
