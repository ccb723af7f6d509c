//! # Credentials
//!
//! Password digests and bearer tokens.
//!
//! ## Password Digests
//!
//! Passwords are stored as `sha256$<rounds>$<salt>$<digest>` where salt and
//! digest are unpadded base64url. The digest is SHA-256 over
//! `salt || password`, re-hashed `rounds` times with the password appended.
//! The round count is stored with the digest so it can be raised later
//! without invalidating existing accounts.
//!
//! ## Bearer Tokens
//!
//! Tokens are 32 random bytes, base64url encoded. Only their SHA-256
//! digest is stored; a leaked database does not leak live sessions.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

const SCHEME: &str = "sha256";
const SALT_LEN: usize = 16;

/// Salted, iterated SHA-256 password hashing.
#[derive(Debug, Clone, Copy)]
pub struct PasswordHasher {
    rounds: u32,
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self {
            rounds: Self::DEFAULT_ROUNDS,
        }
    }
}

impl PasswordHasher {
    /// Rounds used for new digests unless configured otherwise.
    pub const DEFAULT_ROUNDS: u32 = 100_000;

    /// Create a hasher using `rounds` iterations (at least 1).
    #[must_use]
    pub fn new(rounds: u32) -> Self {
        Self {
            rounds: rounds.max(1),
        }
    }

    /// Hash `password` with a fresh random salt.
    pub fn hash(&self, password: &str) -> String {
        let salt: [u8; SALT_LEN] = rand::random();
        let digest = stretch(&salt, password.as_bytes(), self.rounds);
        format!(
            "{SCHEME}${}${}${}",
            self.rounds,
            URL_SAFE_NO_PAD.encode(salt),
            URL_SAFE_NO_PAD.encode(digest)
        )
    }

    /// Check `password` against an encoded digest.
    ///
    /// Malformed digests never verify. The comparison is constant-time.
    pub fn verify(password: &str, encoded: &str) -> bool {
        let Some((rounds, salt, expected)) = parse(encoded) else {
            return false;
        };
        let actual = stretch(&salt, password.as_bytes(), rounds);
        expected.len() == actual.len() && bool::from(actual.as_slice().ct_eq(&expected))
    }

    /// Spend the work of one [`verify`](Self::verify) at this hasher's cost
    /// for an account that does not exist. Always `false`.
    pub fn verify_missing(&self, password: &str) -> bool {
        std::hint::black_box(stretch(&[0u8; SALT_LEN], password.as_bytes(), self.rounds));
        false
    }
}

fn stretch(salt: &[u8], password: &[u8], rounds: u32) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(password);
    let mut digest = [0u8; 32];
    digest.copy_from_slice(&hasher.finalize());
    for _ in 1..rounds {
        let mut hasher = Sha256::new();
        hasher.update(digest);
        hasher.update(password);
        digest.copy_from_slice(&hasher.finalize());
    }
    digest
}

fn parse(encoded: &str) -> Option<(u32, Vec<u8>, Vec<u8>)> {
    let mut parts = encoded.split('$');
    if parts.next()? != SCHEME {
        return None;
    }
    let rounds: u32 = parts.next()?.parse().ok().filter(|r| *r >= 1)?;
    let salt = URL_SAFE_NO_PAD.decode(parts.next()?).ok()?;
    let digest = URL_SAFE_NO_PAD.decode(parts.next()?).ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some((rounds, salt, digest))
}

/// Generate a new opaque bearer token.
pub fn generate_token() -> String {
    let bytes: [u8; 32] = rand::random();
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Storage key for a bearer token.
pub fn token_digest(token: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(token.as_bytes()))
}

// =============================================================================
// TESTS
// =============================================================================
