//! # Storefront
//!
//! Backend of a small clothing store: user registration, login and the
//! authentication core behind them, backed by Postgres.
//!
//! ## Layout
//!
//! - [`auth`]: credential verification, login rate limiting, registration
//!   validation and session tokens. Storage is reached only through the
//!   [`auth::UserStore`] and [`auth::RateLimitStore`] traits.
//! - [`store`]: Postgres (`sqlx`) and in-memory implementations of those traits.
//! - [`api`]: the axum router exposing `/api/v1/auth/*` and `/health`.
//! - [`cli`]: argument parsing, telemetry setup and the server action.
//!
//! ## Accounts
//!
//! Users are identified by email, normalized to lowercase. Each account is a
//! `buyer` or a `seller`; the last name is optional.

pub mod api;
pub mod auth;
pub mod cli;
pub mod store;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
