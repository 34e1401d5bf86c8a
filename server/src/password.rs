//! Password hashing for stored accounts.
//!
//! Passwords are stored as `pbkdf2-sha256$<rounds>$<salt>$<digest>`, where
//! salt and digest are standard base64 and the digest is PBKDF2-HMAC-SHA256.
//! Verification compares digests in constant time.

use base64::prelude::*;
use pbkdf2::pbkdf2_hmac;
use rand::Rng;
use sha2::Sha256;
use subtle::ConstantTimeEq;

/// Scheme tag at the start of every encoded password.
const SCHEME: &str = "pbkdf2-sha256";

/// Iterations for newly encoded passwords.
const DEFAULT_ROUNDS: u32 = 10_000;

/// Highest iteration count accepted from a stored encoding.
const MAX_ROUNDS: u32 = 1_000_000;

/// Salt size in bytes.
const SALT_BYTES: usize = 16;

/// Derived key size in bytes.
const DIGEST_BYTES: usize = 32;

/// Encodes `raw` with a fresh random salt.
pub fn hash_password(raw: &str) -> String {
    let mut salt = [0u8; SALT_BYTES];
    rand::rng().fill(&mut salt);
    encode(raw, &salt, DEFAULT_ROUNDS)
}

/// Returns `true` if `raw` matches the `encoded` password.
///
/// Malformed encodings, and encodings with a round count outside
/// `1..=MAX_ROUNDS`, never match.
pub fn verify_password(raw: &str, encoded: &str) -> bool {
    let mut parts = encoded.split('$');
    let (Some(SCHEME), Some(rounds), Some(salt), Some(digest), None) = (
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
    ) else {
        return false;
    };

    let Ok(rounds) = rounds.parse::<u32>() else {
        return false;
    };
    if !(1..=MAX_ROUNDS).contains(&rounds) {
        return false;
    }
    let (Ok(salt), Ok(expected)) = (BASE64_STANDARD.decode(salt), BASE64_STANDARD.decode(digest))
    else {
        return false;
    };

    let actual = derive(raw, &salt, rounds);
    actual.as_slice().ct_eq(expected.as_slice()).into()
}

fn encode(raw: &str, salt: &[u8], rounds: u32) -> String {
    let digest = derive(raw, salt, rounds);
    format!(
        "{SCHEME}${rounds}${}${}",
        BASE64_STANDARD.encode(salt),
        BASE64_STANDARD.encode(digest)
    )
}

fn derive(raw: &str, salt: &[u8], rounds: u32) -> [u8; DIGEST_BYTES] {
    let mut digest = [0u8; DIGEST_BYTES];
    pbkdf2_hmac::<Sha256>(raw.as_bytes(), salt, rounds, &mut digest);
    digest
}
