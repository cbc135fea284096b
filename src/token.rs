//! Token generation for memo keys.
//!
//! A token is the opaque reverse-lookup handle paired with a user key. Two
//! generators are available ([`DigestTokens`], [`RollingTokens`]); both are
//! salted with wall-clock time and randomness so two calls for the same key
//! never agree in practice. Each generator emits a fixed shape that
//! [`TokenGenerator::is_token`] recognises, and that shape is reserved: users
//! cannot save keys that look like tokens.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::Deserialize;
use sha2::{Digest, Sha256};

/// Hex characters kept from the digest (128 bits).
const DIGEST_TOKEN_LEN: usize = 32;
/// Width of a zero-padded `u64` rendered in decimal.
const ROLLING_TOKEN_LEN: usize = 20;

pub trait TokenGenerator: Send + Sync {
    /// Produces a fresh token for `key`.
    fn generate(&self, key: &str) -> String;

    /// Whether `candidate` has the shape this generator produces.
    fn is_token(&self, candidate: &str) -> bool;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenScheme {
    #[default]
    Digest,
    Rolling,
}

impl TokenScheme {
    pub fn generator(self) -> Box<dyn TokenGenerator> {
        match self {
            TokenScheme::Digest => Box::new(DigestTokens),
            TokenScheme::Rolling => Box::new(RollingTokens),
        }
    }
}

/// Truncated SHA-256 of the key, the current time and a random salt.
#[derive(Debug, Default)]
pub struct DigestTokens;

impl TokenGenerator for DigestTokens {
    fn generate(&self, key: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        hasher.update(now_nanos().to_le_bytes());
        hasher.update(rand::random::<u64>().to_le_bytes());
        let mut token = hex::encode(hasher.finalize());
        token.truncate(DIGEST_TOKEN_LEN);
        token
    }

    fn is_token(&self, candidate: &str) -> bool {
        candidate.len() == DIGEST_TOKEN_LEN
            && candidate
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
    }
}

/// Rolling polynomial hash seeded per call.
#[derive(Debug, Default)]
pub struct RollingTokens;

impl RollingTokens {
    fn hash(key: &str, seed: u64) -> u64 {
        key.chars().fold(0u64, |res, c| {
            let c = u64::from(c);
            c.wrapping_add(res << 4)
                .wrapping_add(res << 10)
                .wrapping_sub(res)
                .wrapping_add(c ^ res)
                .wrapping_add(seed)
        })
    }
}

impl TokenGenerator for RollingTokens {
    fn generate(&self, key: &str) -> String {
        let seed = now_nanos().wrapping_add(rand::random::<u64>());
        // An empty key would hash to zero regardless of the seed.
        let value = if key.is_empty() { seed } else { Self::hash(key, seed) };
        format!("{value:0width$}", width = ROLLING_TOKEN_LEN)
    }

    fn is_token(&self, candidate: &str) -> bool {
        candidate.len() == ROLLING_TOKEN_LEN && candidate.bytes().all(|b| b.is_ascii_digit())
    }
}

/// Whether `candidate` has the shape of a token from any supported scheme.
/// The shapes stay reserved when the configured scheme changes, since a
/// journal can hold tokens from an earlier one.
pub fn is_reserved(candidate: &str) -> bool {
    DigestTokens.is_token(candidate) || RollingTokens.is_token(candidate)
}

/// Whether `value` can be the token stored against a key: a reserved shape
/// or a bare decimal number as written by older journals.
pub fn is_token_value(value: &str) -> bool {
    is_reserved(value) || (!value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()))
}

fn now_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos() as u64)
        .unwrap_or_default()
}
