//! Salt and nonce generation from the OS random source.

use rand::rngs::OsRng;
use rand::RngCore;

/// Argon2id salt length in bytes.
pub const SALT_LEN: usize = 16;

/// ChaCha20-Poly1305 nonce length in bytes.
pub const NONCE_LEN: usize = 12;

/// A salt for one record key derivation. Never reused across seals.
pub fn fresh_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    salt
}

/// A nonce for one encryption. Each record key is used once, so a random
/// nonce cannot repeat under the same key.
pub fn fresh_nonce() -> [u8; NONCE_LEN] {
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);
    nonce
}
