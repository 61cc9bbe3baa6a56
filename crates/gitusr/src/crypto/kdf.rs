//! Master key providers and per-record key stretching.
//!
//! The master key is derived from machine and user identifiers, so it is
//! reproducible on the same account without any operator input:
//!
//! ```text
//! master_key = SHA-256("{hostname}-{username}-gitusr-secret")
//! record_key = Argon2id(master_key, salt)      (fresh 16-byte salt per record)
//! ```
//!
//! # Known limitation
//!
//! When neither hostname variable nor username variable is set, fixed
//! fallback strings are used. Every account in that situation derives the
//! same master key. This is accepted: the store only protects against casual
//! disclosure of the file, not against someone who can run code as the user.

use std::sync::OnceLock;

use argon2::{Algorithm, Argon2, Params, Version};
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::random::SALT_LEN;
use crate::error::{GitusrError, Result};

/// Argon2id parameters for record key derivation. Fixed: the store file does
/// not record them, so changing any value makes existing files unreadable.
const KDF_M_COST: u32 = 19456; // 19 MiB
const KDF_T_COST: u32 = 2;
const KDF_P_COST: u32 = 1;

const HOSTNAME_VARS: [&str; 2] = ["HOSTNAME", "COMPUTERNAME"];
const USERNAME_VARS: [&str; 2] = ["USER", "USERNAME"];
const FALLBACK_HOSTNAME: &str = "default-machine";
const FALLBACK_USERNAME: &str = "default-user";
const MASTER_KEY_SUFFIX: &str = "gitusr-secret";

/// 32 bytes of master key material. Zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MasterKey([u8; 32]);

impl MasterKey {
    /// Wrap raw key bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Derive the master key for a hostname/username pair.
    pub fn from_identifiers(hostname: &str, username: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(format!("{hostname}-{username}-{MASTER_KEY_SUFFIX}"));
        Self(hasher.finalize().into())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MasterKey(..)")
    }
}

/// Source of the master key used to seal and open identity envelopes.
pub trait KeyProvider {
    fn master_key(&self) -> MasterKey;
}

/// Derives the master key from the process environment.
///
/// The key is computed on first use and cached for the rest of the process.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvKeyProvider;

static ENV_MASTER_KEY: OnceLock<MasterKey> = OnceLock::new();

impl KeyProvider for EnvKeyProvider {
    fn master_key(&self) -> MasterKey {
        ENV_MASTER_KEY
            .get_or_init(|| {
                let hostname = first_env(&HOSTNAME_VARS).unwrap_or_else(|| {
                    log::debug!("no hostname variable set, using fallback");
                    FALLBACK_HOSTNAME.to_string()
                });
                let username = first_env(&USERNAME_VARS).unwrap_or_else(|| {
                    log::debug!("no username variable set, using fallback");
                    FALLBACK_USERNAME.to_string()
                });
                MasterKey::from_identifiers(&hostname, &username)
            })
            .clone()
    }
}

/// Hands out a caller-supplied master key.
#[derive(Debug, Clone)]
pub struct FixedKeyProvider(MasterKey);

impl FixedKeyProvider {
    pub fn new(key: MasterKey) -> Self {
        Self(key)
    }
}

impl KeyProvider for FixedKeyProvider {
    fn master_key(&self) -> MasterKey {
        self.0.clone()
    }
}

impl<K: KeyProvider + ?Sized> KeyProvider for &K {
    fn master_key(&self) -> MasterKey {
        (**self).master_key()
    }
}

fn first_env(names: &[&str]) -> Option<String> {
    names
        .iter()
        .filter_map(|name| std::env::var(name).ok())
        .find(|value| !value.is_empty())
}

/// Stretch the master key into a 32-byte record key using Argon2id.
///
/// Callers must zeroize the returned key after use.
pub fn derive_record_key(master: &MasterKey, salt: &[u8; SALT_LEN]) -> Result<[u8; 32]> {
    let params = Params::new(KDF_M_COST, KDF_T_COST, KDF_P_COST, Some(32))
        .map_err(|e| GitusrError::DerivationFailed(format!("Argon2 params: {e}")))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut output = [0u8; 32];
    argon2
        .hash_password_into(master.as_bytes(), salt, &mut output)
        .map_err(|e| GitusrError::DerivationFailed(format!("Argon2 hash: {e}")))?;

    Ok(output)
}
