//! Identity records: the credentials one operator switches between.

use std::borrow::Borrow;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::GitusrError;

/// Nickname placeholder used when hashing an identity without a nickname.
const NO_NICKNAME: &str = "no-nickname";

/// Unique identifier for an identity.
///
/// Format: hex of the first 16 bytes of
/// SHA-256(`"{email}-{nickname}-{ssh_key_path}"`), computed once when the
/// identity is created and never recomputed on update.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityId(pub String);

impl IdentityId {
    /// Compute the id for a new identity from its distinguishing triple.
    pub fn derive(email: &str, nickname: Option<&str>, ssh_key_path: &Path) -> Self {
        Self::derive_nth(email, nickname, ssh_key_path, 0)
    }

    /// Variant of [`derive`](Self::derive) used when the plain id is already
    /// taken by an identity whose triple was edited after creation.
    /// `attempt == 0` gives the plain id; later attempts append `-{attempt}`.
    pub fn derive_nth(email: &str, nickname: Option<&str>, ssh_key_path: &Path, attempt: u32) -> Self {
        let mut content = format!(
            "{email}-{}-{}",
            nickname.unwrap_or(NO_NICKNAME),
            ssh_key_path.display()
        );
        if attempt > 0 {
            content.push_str(&format!("-{attempt}"));
        }
        let hash = Sha256::digest(content.as_bytes());
        Self(hex::encode(&hash[..16]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for IdentityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Borrow<str> for IdentityId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for IdentityId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// One managed identity, decrypted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub id: IdentityId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    pub name: String,
    pub email: String,
    /// Normalized absolute path of the private key.
    pub ssh_key_path: PathBuf,
    /// Hex SHA-256 of the key file contents when the path was last set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_key_fingerprint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Identity {
    /// True when this identity has the given `(email, nickname, path)` triple.
    pub fn has_triple(&self, email: &str, nickname: Option<&str>, ssh_key_path: &Path) -> bool {
        self.email == email && self.nickname.as_deref() == nickname && self.ssh_key_path == ssh_key_path
    }

    /// Nickname if set, otherwise the name.
    pub fn label(&self) -> &str {
        self.nickname.as_deref().unwrap_or(&self.name)
    }
}

/// The sensitive fields sealed inside one envelope. The id is the map key
/// in the store file and is not repeated here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct IdentityRecord {
    pub name: String,
    pub email: String,
    pub ssh_key_path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_key_fingerprint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl IdentityRecord {
    pub(crate) fn from_identity(identity: &Identity) -> Self {
        Self {
            name: identity.name.clone(),
            email: identity.email.clone(),
            ssh_key_path: identity.ssh_key_path.clone(),
            ssh_key_fingerprint: identity.ssh_key_fingerprint.clone(),
            nickname: identity.nickname.clone(),
            description: identity.description.clone(),
        }
    }

    pub(crate) fn into_identity(self, id: IdentityId) -> Identity {
        Identity {
            id,
            nickname: self.nickname,
            name: self.name,
            email: self.email,
            ssh_key_path: self.ssh_key_path,
            ssh_key_fingerprint: self.ssh_key_fingerprint,
            description: self.description,
        }
    }
}

/// Public view of an identity returned by listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListedIdentity {
    pub id: IdentityId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    pub name: String,
    pub email: String,
    pub ssh_key_path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub is_active: bool,
}

impl ListedIdentity {
    pub fn new(identity: &Identity, is_active: bool) -> Self {
        Self {
            id: identity.id.clone(),
            nickname: identity.nickname.clone(),
            name: identity.name.clone(),
            email: identity.email.clone(),
            ssh_key_path: identity.ssh_key_path.clone(),
            description: identity.description.clone(),
            is_active,
        }
    }
}

/// Fields editable through `IdentityStore::update_field`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentityField {
    Name,
    Email,
    Nickname,
    Description,
}

impl IdentityField {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Email => "email",
            Self::Nickname => "nickname",
            Self::Description => "description",
        }
    }

    /// Name and email must stay non-empty; the others may be cleared.
    pub fn is_required(&self) -> bool {
        matches!(self, Self::Name | Self::Email)
    }
}

impl std::fmt::Display for IdentityField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IdentityField {
    type Err = GitusrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "name" => Ok(Self::Name),
            "email" => Ok(Self::Email),
            "nickname" => Ok(Self::Nickname),
            "description" => Ok(Self::Description),
            other => Err(GitusrError::Validation(format!(
                "unknown field '{other}' (expected name, email, nickname or description)"
            ))),
        }
    }
}

/// Loose shape check: `local@domain.tld`, no whitespace, exactly one `@`.
pub fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    domain
        .char_indices()
        .any(|(i, c)| c == '.' && i > 0 && i + 1 < domain.len())
}
