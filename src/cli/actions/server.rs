use crate::{
    api::{self, RateLimitBackend},
    auth::{AuthConfig, JwtIssuer},
    cli::telemetry,
};
use anyhow::Result;
use secrecy::SecretString;
use std::{sync::Arc, time::Duration};
use tracing::debug;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub jwt_secret: SecretString,
    pub token_ttl_seconds: u64,
    pub operator_token: Option<SecretString>,
    pub login_max_failures: u32,
    pub login_window_seconds: u64,
    pub store_timeout_ms: u64,
    pub rate_limit_store: RateLimitBackend,
}

impl Args {
    fn auth_config(&self) -> AuthConfig {
        AuthConfig::new()
            .with_rate_limit(
                self.login_max_failures,
                Duration::from_secs(self.login_window_seconds),
            )
            .with_store_timeout(Duration::from_millis(self.store_timeout_ms))
    }
}

/// Execute the server action.
/// # Errors
/// Returns an error if the database is unreachable or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let auth_config = args.auth_config();
    debug!("Auth config: {:?}", auth_config);

    let tokens = Arc::new(JwtIssuer::new(
        &args.jwt_secret,
        Duration::from_secs(args.token_ttl_seconds),
    ));

    let result = api::new(
        args.port,
        args.dsn,
        auth_config,
        tokens,
        args.operator_token,
        args.rate_limit_store,
    )
    .await;

    telemetry::shutdown_tracer();

    result
}
