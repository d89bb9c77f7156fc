//! Algorithm-tagged password hashes.
//!
//! Stored format: `<algorithm>$<salt-hex>$<digest-hex>`. The tag selects the
//! verification routine; anything unrecognized fails closed.

use argon2::Argon2;
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use thiserror::Error;

const SALT_LEN: usize = 16;
const DIGEST_LEN: usize = 32;

/// Argon2id hash with a fixed salt, verified when the identity is unknown so
/// both paths pay the same cost.
pub(crate) const DUMMY_HASH: &str = "argon2id$73746f726566726f6e742d64756d6d79$\
     0000000000000000000000000000000000000000000000000000000000000000";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PasswordError {
    #[error("unknown hash algorithm: {0}")]
    UnknownAlgorithm(String),
    #[error("malformed password hash")]
    Malformed,
    #[error("hashing failed: {0}")]
    Hash(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Algorithm {
    Argon2id,
    /// Legacy `sha256(salt || password)`; verified, never produced.
    Sha256,
}

impl Algorithm {
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::Argon2id => "argon2id",
            Self::Sha256 => "sha256",
        }
    }

    #[must_use]
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "argon2id" => Some(Self::Argon2id),
            "sha256" => Some(Self::Sha256),
            _ => None,
        }
    }

    fn digest(self, password: &[u8], salt: &[u8]) -> Result<Vec<u8>, PasswordError> {
        match self {
            Self::Argon2id => {
                let mut out = [0u8; DIGEST_LEN];
                Argon2::default()
                    .hash_password_into(password, salt, &mut out)
                    .map_err(|err| PasswordError::Hash(err.to_string()))?;
                Ok(out.to_vec())
            }
            Self::Sha256 => {
                let mut hasher = Sha256::new();
                hasher.update(salt);
                hasher.update(password);
                Ok(hasher.finalize().to_vec())
            }
        }
    }
}

/// Parsed form of a stored hash string.
struct StoredHash {
    algorithm: Algorithm,
    salt: Vec<u8>,
    digest: Vec<u8>,
}

impl StoredHash {
    fn parse(stored: &str) -> Result<Self, PasswordError> {
        let mut parts = stored.split('$');
        let (Some(tag), Some(salt), Some(digest), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(PasswordError::Malformed);
        };

        let algorithm =
            Algorithm::from_tag(tag).ok_or_else(|| PasswordError::UnknownAlgorithm(tag.into()))?;
        let salt = hex::decode(salt).map_err(|_| PasswordError::Malformed)?;
        let digest = hex::decode(digest).map_err(|_| PasswordError::Malformed)?;

        if salt.is_empty() || digest.is_empty() {
            return Err(PasswordError::Malformed);
        }

        Ok(Self {
            algorithm,
            salt,
            digest,
        })
    }
}

/// Hash a password with a fresh random salt using the default algorithm.
///
/// # Errors
/// Returns an error if the salt cannot be generated or hashing fails.
pub fn hash_password(password: &str) -> Result<String, PasswordError> {
    let mut salt = [0u8; SALT_LEN];
    OsRng
        .try_fill_bytes(&mut salt)
        .map_err(|err| PasswordError::Hash(err.to_string()))?;
    hash_with_salt(Algorithm::Argon2id, password, &salt)
}

pub(crate) fn hash_with_salt(
    algorithm: Algorithm,
    password: &str,
    salt: &[u8],
) -> Result<String, PasswordError> {
    let digest = algorithm.digest(password.as_bytes(), salt)?;
    Ok(format!(
        "{}${}${}",
        algorithm.tag(),
        hex::encode(salt),
        hex::encode(digest)
    ))
}

/// Verify a password against a stored hash in constant time.
///
/// # Errors
/// Returns an error if the stored hash is malformed or uses an unknown algorithm.
pub fn verify_password(password: &str, stored: &str) -> Result<bool, PasswordError> {
    let stored = StoredHash::parse(stored)?;
    let computed = stored.algorithm.digest(password.as_bytes(), &stored.salt)?;
    Ok(computed.ct_eq(&stored.digest).into())
}

/// True when a stored hash was produced by anything but the default algorithm.
#[must_use]
pub fn needs_rehash(stored: &str) -> bool {
    stored.split('$').next().and_then(Algorithm::from_tag) != Some(Algorithm::Argon2id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    #[test]
    fn hash_password_produces_tagged_format() -> Result<()> {
        let hash = hash_password("Pass123!")?;
        let parts: Vec<&str> = hash.split('$').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "argon2id");
        assert_eq!(parts[1].len(), SALT_LEN * 2);
        assert_eq!(parts[2].len(), DIGEST_LEN * 2);
        Ok(())
    }

    #[test]
    fn hash_password_salts_each_hash() -> Result<()> {
        assert_ne!(hash_password("Pass123!")?, hash_password("Pass123!")?);
        Ok(())
    }

    #[test]
    fn verify_password_accepts_match_and_rejects_mismatch() -> Result<()> {
        let hash = hash_password("Pass123!")?;
        assert!(verify_password("Pass123!", &hash)?);
        assert!(!verify_password("pass123!", &hash)?);
        Ok(())
    }

    #[test]
    fn verify_password_is_deterministic() -> Result<()> {
        let hash = hash_password("Stable#1")?;
        for _ in 0..3 {
            assert!(verify_password("Stable#1", &hash)?);
            assert!(!verify_password("Stable#2", &hash)?);
        }
        Ok(())
    }

    #[test]
    fn verify_password_supports_legacy_sha256() -> Result<()> {
        let hash = hash_with_salt(Algorithm::Sha256, "legacy-9", b"saltsalt")?;
        assert!(hash.starts_with("sha256$"));
        assert!(verify_password("legacy-9", &hash)?);
        assert!(!verify_password("legacy-8", &hash)?);
        Ok(())
    }

    #[test]
    fn verify_password_fails_closed_on_unknown_algorithm() {
        let result = verify_password("x", "md5$00$00");
        assert_eq!(
            result,
            Err(PasswordError::UnknownAlgorithm("md5".to_string()))
        );
    }

    #[test]
    fn verify_password_rejects_malformed_hashes() {
        for stored in [
            "",
            "argon2id",
            "argon2id$abcd",
            "argon2id$zz$00",
            "argon2id$00$00$00",
            "argon2id$$00",
        ] {
            assert_eq!(
                verify_password("x", stored),
                Err(PasswordError::Malformed),
                "{stored}"
            );
        }
    }

    #[test]
    fn needs_rehash_flags_legacy_hashes() -> Result<()> {
        assert!(!needs_rehash(&hash_password("Pass123!")?));
        assert!(needs_rehash(&hash_with_salt(
            Algorithm::Sha256,
            "Pass123!",
            b"saltsalt"
        )?));
        assert!(needs_rehash("garbage"));
        Ok(())
    }

    #[test]
    fn dummy_hash_parses_and_never_matches_common_input() -> Result<()> {
        assert!(!verify_password("Pass123!", DUMMY_HASH)?);
        Ok(())
    }
}
