//! Authentication core: credential verification, login rate limiting,
//! registration validation and session tokens.
//!
//! ## Password Hashes
//!
//! Stored hashes are tagged with their algorithm (`argon2id$<salt>$<digest>`).
//! Unknown tags or malformed hashes never verify. Legacy `sha256` hashes are
//! upgraded to `argon2id` on the next successful login.
//!
//! ## Login Rate Limiting
//!
//! Attempts are counted per normalized email inside a rolling window
//! (default: 5 failures per 15 minutes) before the password is checked, and a
//! successful login clears the count. Once the threshold is reached every
//! attempt is rejected with a retry-after hint until the window elapses or an
//! operator resets the entry.
//!
//! Unknown emails and wrong passwords are indistinguishable to callers: both
//! pay for one password verification, both count toward the limit, and both
//! yield the same error.

mod authenticator;
mod error;
pub mod password;
pub mod rate_limit;
mod registration;
mod store;
pub mod token;
mod types;
mod utils;

pub use authenticator::{AuthConfig, Authenticator, DEFAULT_STORE_TIMEOUT};
pub use error::{AuthError, FieldError, StoreError, ValidationError, INVALID_CREDENTIALS_MESSAGE};
pub use rate_limit::{MemoryRateLimitStore, RateLimitPolicy, RateLimitStore};
pub use registration::{validate_registration, RegistrationRequest, Registrar};
pub use store::UserStore;
pub use token::{JwtIssuer, TokenIssuer};
pub use types::{
    Claims, LoginSuccess, NewUser, RateLimitEntry, Role, SessionToken, UserId, UserRecord,
    UserUpdate,
};
