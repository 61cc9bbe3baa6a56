//! Per-record authenticated encryption.
//!
//! Each identity is sealed into its own [`Envelope`] under a record key
//! stretched from the master key with a fresh salt. Envelopes are
//! independent: a damaged envelope never affects its neighbours.
//!
//! Envelope format (JSON, all binary fields hex encoded):
//! ```json
//! {
//!     "salt": "<16 bytes>",
//!     "iv": "<12 bytes>",
//!     "encryptedData": "<ciphertext>:<16-byte Poly1305 tag>"
//! }
//! ```

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::crypto::kdf::{derive_record_key, MasterKey};
use crate::crypto::random::{fresh_nonce, fresh_salt, NONCE_LEN, SALT_LEN};
use crate::error::{GitusrError, Result};

/// Separator between the ciphertext and the authentication tag.
pub const ENVELOPE_DELIMITER: char = ':';

/// Poly1305 authentication tag length in bytes.
pub const TAG_LEN: usize = 16;

/// One encrypted identity record as stored on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// Hex-encoded 16-byte Argon2id salt.
    pub salt: String,
    /// Hex-encoded 12-byte ChaCha20-Poly1305 nonce.
    pub iv: String,
    /// `hex(ciphertext) ':' hex(tag)`.
    pub encrypted_data: String,
}

/// Encrypt `plaintext` into a new envelope.
///
/// A fresh salt and nonce are drawn on every call, so sealing the same record
/// twice never produces the same envelope.
pub fn seal(master: &MasterKey, plaintext: &[u8]) -> Result<Envelope> {
    let salt = fresh_salt();
    let nonce_bytes = fresh_nonce();

    let mut key = derive_record_key(master, &salt)?;
    let cipher = ChaCha20Poly1305::new_from_slice(&key)
        .map_err(|e| GitusrError::EncryptionFailed(format!("cipher init: {e}")));
    key.zeroize();

    let mut sealed = cipher?
        .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
        .map_err(|e| GitusrError::EncryptionFailed(format!("encrypt: {e}")))?;

    // The AEAD output is ciphertext || tag; store them as two fields.
    let tag = sealed.split_off(sealed.len() - TAG_LEN);
    let encrypted_data = format!(
        "{}{ENVELOPE_DELIMITER}{}",
        hex::encode(&sealed),
        hex::encode(&tag)
    );

    Ok(Envelope {
        salt: hex::encode(salt),
        iv: hex::encode(nonce_bytes),
        encrypted_data,
    })
}

/// Decrypt an envelope back into the plaintext record.
///
/// # Errors
///
/// Returns [`GitusrError::CorruptedData`] when the envelope is malformed or
/// fails authentication. Wrong plaintext is never returned.
pub fn open(master: &MasterKey, envelope: &Envelope) -> Result<Vec<u8>> {
    let parts: Vec<&str> = envelope.encrypted_data.split(ENVELOPE_DELIMITER).collect();
    let [ciphertext_hex, tag_hex] = parts.as_slice() else {
        return Err(GitusrError::CorruptedData(format!(
            "expected 2 '{ENVELOPE_DELIMITER}'-separated parts, found {}",
            parts.len()
        )));
    };

    let salt: [u8; SALT_LEN] = decode_fixed(&envelope.salt, "salt")?;
    let nonce_bytes: [u8; NONCE_LEN] = decode_fixed(&envelope.iv, "iv")?;
    let tag: [u8; TAG_LEN] = decode_fixed(tag_hex, "tag")?;
    let mut sealed = hex::decode(ciphertext_hex)
        .map_err(|e| GitusrError::CorruptedData(format!("ciphertext is not hex: {e}")))?;
    sealed.extend_from_slice(&tag);

    let mut key = derive_record_key(master, &salt)?;
    let cipher = ChaCha20Poly1305::new_from_slice(&key)
        .map_err(|e| GitusrError::CorruptedData(format!("cipher init: {e}")));
    key.zeroize();

    cipher?
        .decrypt(Nonce::from_slice(&nonce_bytes), sealed.as_slice())
        .map_err(|_| GitusrError::CorruptedData("authentication tag mismatch".to_string()))
}

fn decode_fixed<const N: usize>(value: &str, field: &str) -> Result<[u8; N]> {
    let bytes = hex::decode(value)
        .map_err(|e| GitusrError::CorruptedData(format!("{field} is not hex: {e}")))?;
    let len = bytes.len();
    bytes
        .try_into()
        .map_err(|_| GitusrError::CorruptedData(format!("{field} must be {N} bytes, got {len}")))
}
