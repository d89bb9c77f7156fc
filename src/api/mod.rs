use crate::{
    auth::{AuthConfig, Authenticator, MemoryRateLimitStore, RateLimitStore, Registrar, TokenIssuer},
    store::{self, PgRateLimitStore, PgUserStore},
};
use anyhow::{anyhow, Result};
use axum::{
    body::Body,
    extract::MatchedPath,
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderName, HeaderValue, Method, Request,
    },
    routing::{get, post},
    Extension, Router,
};
use secrecy::SecretString;
use sqlx::PgPool;
use std::{str::FromStr, sync::Arc};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{info, info_span, Span};
use ulid::Ulid;
use utoipa_swagger_ui::SwaggerUi;

pub mod handlers;
mod openapi;

pub use handlers::AuthState;
pub use openapi::{openapi, ApiDoc};

/// Where failed-login counters live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RateLimitBackend {
    /// Shared by every instance using the same database.
    #[default]
    Postgres,
    /// Per process; counters are lost on restart.
    Memory,
}

impl FromStr for RateLimitBackend {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "postgres" => Ok(Self::Postgres),
            "memory" => Ok(Self::Memory),
            other => Err(anyhow!("unknown rate limit store: {other}")),
        }
    }
}

/// Build the application router with all routes and middleware.
///
/// `pool` is only used by `/health`; auth routes go through the stores in `state`.
pub fn router(state: Arc<AuthState>, pool: PgPool) -> Router {
    let cors = CorsLayer::new()
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_methods([Method::GET, Method::POST])
        .allow_origin(Any);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", openapi()))
        .route("/health", get(handlers::health::health))
        .route("/api/v1/auth/login", post(handlers::login::login))
        .route("/api/v1/auth/register", post(handlers::register::register))
        .route(
            "/api/v1/auth/reset-rate-limit",
            post(handlers::rate_limit::reset_rate_limit),
        )
        .route("/api/v1/auth/me", get(handlers::me::me))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(cors)
                .layer(Extension(state))
                .layer(Extension(pool)),
        )
}

/// Start the server
/// # Errors
/// Return error if the database is unreachable, migrations fail or the port cannot be bound
pub async fn new(
    port: u16,
    dsn: String,
    auth_config: AuthConfig,
    tokens: Arc<dyn TokenIssuer>,
    operator_token: Option<SecretString>,
    backend: RateLimitBackend,
) -> Result<()> {
    let pool = store::connect(&dsn, auth_config.store_timeout()).await?;

    let users = Arc::new(PgUserStore::new(pool.clone()));
    let window = auth_config.policy().window();
    let rate_limits: Arc<dyn RateLimitStore> = match backend {
        RateLimitBackend::Postgres => Arc::new(PgRateLimitStore::new(pool.clone(), window)),
        RateLimitBackend::Memory => Arc::new(MemoryRateLimitStore::new(window)),
    };
    info!(?backend, "Rate limit store selected");

    if operator_token.is_none() {
        info!("No operator token configured, rate-limit reset endpoint disabled");
    }

    let state = Arc::new(AuthState::new(
        Authenticator::new(users.clone(), rate_limits, tokens, auth_config),
        Registrar::new(users, auth_config.store_timeout()),
        operator_token,
    ));

    let app = router(state, pool.clone());

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    pool.close().await;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for ctrl-c: {}", err);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!("Failed to listen for SIGTERM: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Gracefully shutdown");
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_backend_parses() -> Result<()> {
        assert_eq!("postgres".parse::<RateLimitBackend>()?, RateLimitBackend::Postgres);
        assert_eq!(" Memory ".parse::<RateLimitBackend>()?, RateLimitBackend::Memory);
        assert!("redis".parse::<RateLimitBackend>().is_err());
        assert_eq!(RateLimitBackend::default(), RateLimitBackend::Postgres);
        Ok(())
    }
}
