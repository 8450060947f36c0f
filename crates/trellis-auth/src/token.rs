//! Session token generation and hashing.
//!
//! Tokens are 160 bits from the OS random source, hex encoded. Only the
//! BLAKE3 digest of a token is ever stored.

use rand::rngs::OsRng;
use rand::RngCore;

/// Random bytes per token (160 bits).
pub const SESSION_TOKEN_BYTES: usize = 20;

/// Generate a fresh bearer token: 40 lowercase hex characters.
pub fn generate_session_token() -> String {
    let mut bytes = [0u8; SESSION_TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Compute the session id stored for `token`.
///
/// Deterministic and one-way; returns the hex-encoded BLAKE3 digest.
pub fn hash_session_token(token: &str) -> String {
    blake3::hash(token.as_bytes()).to_hex().to_string()
}
