use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;

use crate::api::RateLimitBackend;
use crate::auth::token::MAX_TOKEN_TTL;

pub const ARG_JWT_SECRET: &str = "jwt-secret";
pub const ARG_TOKEN_TTL_SECONDS: &str = "token-ttl-seconds";
pub const ARG_OPERATOR_TOKEN: &str = "operator-token";
pub const ARG_LOGIN_MAX_FAILURES: &str = "login-max-failures";
pub const ARG_LOGIN_WINDOW_SECONDS: &str = "login-window-seconds";
pub const ARG_STORE_TIMEOUT_MS: &str = "store-timeout-ms";
pub const ARG_RATE_LIMIT_STORE: &str = "rate-limit-store";

#[derive(Debug)]
pub struct Options {
    pub jwt_secret: SecretString,
    pub token_ttl_seconds: u64,
    pub operator_token: Option<SecretString>,
    pub login_max_failures: u32,
    pub login_window_seconds: u64,
    pub store_timeout_ms: u64,
    pub rate_limit_store: RateLimitBackend,
}

impl Options {
    /// Parse auth arguments from matches.
    ///
    /// # Errors
    /// Returns an error if required arguments are missing or a value is out of range.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        // Empty env vars reach us as empty strings.
        let get_non_empty = |id: &str| {
            matches
                .get_one::<String>(id)
                .cloned()
                .filter(|v| !v.trim().is_empty())
        };

        let jwt_secret = get_non_empty(ARG_JWT_SECRET)
            .map(SecretString::from)
            .ok_or_else(|| anyhow::anyhow!("missing required argument: --{ARG_JWT_SECRET}"))?;

        let rate_limit_store = matches
            .get_one::<String>(ARG_RATE_LIMIT_STORE)
            .map_or(Ok(RateLimitBackend::default()), |value| value.parse())?;

        let positive = |id: &str| -> anyhow::Result<u64> {
            match matches.get_one::<u64>(id).copied() {
                Some(0) => anyhow::bail!("--{id} must be greater than zero"),
                Some(value) => Ok(value),
                None => anyhow::bail!("missing required argument: --{id}"),
            }
        };

        Ok(Self {
            jwt_secret,
            token_ttl_seconds: positive(ARG_TOKEN_TTL_SECONDS)?,
            operator_token: get_non_empty(ARG_OPERATOR_TOKEN).map(SecretString::from),
            login_max_failures: matches
                .get_one::<u32>(ARG_LOGIN_MAX_FAILURES)
                .copied()
                .unwrap_or(crate::auth::rate_limit::DEFAULT_MAX_FAILURES),
            login_window_seconds: positive(ARG_LOGIN_WINDOW_SECONDS)?,
            store_timeout_ms: positive(ARG_STORE_TIMEOUT_MS)?,
            rate_limit_store,
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    let command = with_token_args(command);
    with_rate_limit_args(command)
}

fn with_token_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_JWT_SECRET)
                .long(ARG_JWT_SECRET)
                .help("Secret used to sign session tokens (HS256)")
                .env("STOREFRONT_JWT_SECRET")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_TOKEN_TTL_SECONDS)
                .long(ARG_TOKEN_TTL_SECONDS)
                .help("Session token TTL in seconds")
                .env("STOREFRONT_TOKEN_TTL_SECONDS")
                .default_value("3600")
                .value_parser(clap::value_parser!(u64).range(1..=MAX_TOKEN_TTL.as_secs())),
        )
        .arg(
            Arg::new(ARG_OPERATOR_TOKEN)
                .long(ARG_OPERATOR_TOKEN)
                .help("Bearer token for operator endpoints; reset-rate-limit is disabled when unset")
                .env("STOREFRONT_OPERATOR_TOKEN")
                .hide_env_values(true),
        )
}

fn with_rate_limit_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_LOGIN_MAX_FAILURES)
                .long(ARG_LOGIN_MAX_FAILURES)
                .help("Failed logins per identity before lockout")
                .env("STOREFRONT_LOGIN_MAX_FAILURES")
                .default_value("5")
                .value_parser(clap::value_parser!(u32).range(1..)),
        )
        .arg(
            Arg::new(ARG_LOGIN_WINDOW_SECONDS)
                .long(ARG_LOGIN_WINDOW_SECONDS)
                .help("Window in seconds during which failed logins accumulate")
                .env("STOREFRONT_LOGIN_WINDOW_SECONDS")
                .default_value("900")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_STORE_TIMEOUT_MS)
                .long(ARG_STORE_TIMEOUT_MS)
                .help("Timeout in milliseconds for each user or rate-limit store call")
                .env("STOREFRONT_STORE_TIMEOUT_MS")
                .default_value("5000")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_RATE_LIMIT_STORE)
                .long(ARG_RATE_LIMIT_STORE)
                .help("Where failed-login counters are kept")
                .env("STOREFRONT_RATE_LIMIT_STORE")
                .default_value("postgres")
                .value_parser(["postgres", "memory"]),
        )
}
