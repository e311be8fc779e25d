// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Salted password digests stored alongside user documents.
//!
//! Format is `salt_hex:digest_hex`, where `digest = SHA-256(salt_hex || password)`.
//! These hashes are independent of the identity provider's own credential
//! store and are only consulted by the login fallback path.

use ring::rand::{SecureRandom, SystemRandom};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

const SALT_LEN: usize = 16;
const SEPARATOR: char = ':';

/// Hash a password with a fresh random salt.
pub fn hash(password: &str) -> anyhow::Result<String> {
    let mut salt = [0u8; SALT_LEN];
    SystemRandom::new()
        .fill(&mut salt)
        .map_err(|_| anyhow::anyhow!("System RNG unavailable"))?;

    let salt_hex = hex::encode(salt);
    let digest = digest_hex(&salt_hex, password);

    Ok(format!("{}{}{}", salt_hex, SEPARATOR, digest))
}

/// Check `password` against a stored `salt:digest` value.
///
/// Malformed stored values never verify.
pub fn verify(password: &str, stored: &str) -> bool {
    let Some((salt_hex, expected)) = stored.split_once(SEPARATOR) else {
        return false;
    };

    if salt_hex.len() != SALT_LEN * 2 || hex::decode(salt_hex).is_err() {
        return false;
    }

    let actual = digest_hex(salt_hex, password);
    actual.as_bytes().ct_eq(expected.as_bytes()).into()
}

fn digest_hex(salt_hex: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt_hex.as_bytes());
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}
