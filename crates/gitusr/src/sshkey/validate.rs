//! Key file checks: path normalization, existence, permissions, shape and
//! content fingerprint.

use std::path::{Component, Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::config::home_dir;
use crate::error::{GitusrError, Result};

/// Substring every PEM or OpenSSH private key contains.
pub const PRIVATE_KEY_MARKER: &str = "PRIVATE KEY";

/// Permission bits accepted without a warning.
const SECURE_MODES: [u32; 2] = [0o600, 0o400];

/// Result of a successful [`validate`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyCheck {
    pub path: PathBuf,
    /// Permission bits (`mode & 0o777`), unix only.
    pub mode: Option<u32>,
    /// Set when the permissions are looser than `600`/`400`.
    pub permission_warning: Option<String>,
}

/// Normalize a key path using the process home and working directories.
pub fn normalize(path: impl AsRef<Path>) -> PathBuf {
    let cwd = std::env::current_dir().ok();
    normalize_with(path.as_ref(), home_dir().as_deref(), cwd.as_deref())
}

/// Normalize a key path: expand a leading `~`, anchor relative paths at
/// `cwd`, and fold `.` and `..` components lexically.
pub fn normalize_with(path: &Path, home: Option<&Path>, cwd: Option<&Path>) -> PathBuf {
    let mut components = path.components().peekable();
    let tilde = matches!(components.peek(), Some(Component::Normal(first)) if *first == "~");

    let mut base = match home {
        Some(home) if tilde => {
            components.next();
            home.to_path_buf()
        }
        _ if path.is_absolute() => PathBuf::new(),
        _ => cwd.map(Path::to_path_buf).unwrap_or_default(),
    };

    for component in components {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                base.pop();
            }
            other => base.push(other.as_os_str()),
        }
    }
    fold_dots(&base)
}

fn fold_dots(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Check that `path` is a readable private key.
///
/// # Errors
///
/// Returns [`GitusrError::KeyFileNotFound`] if the file cannot be read and
/// [`GitusrError::InvalidKeyFormat`] if it does not contain
/// [`PRIVATE_KEY_MARKER`]. Loose permissions only produce a warning.
pub fn validate(path: &Path) -> Result<KeyCheck> {
    let bytes = std::fs::read(path).map_err(|e| {
        log::debug!("cannot read key {}: {e}", path.display());
        GitusrError::KeyFileNotFound(path.to_path_buf())
    })?;

    let mode = permission_bits(path);
    let permission_warning = mode.filter(|m| !SECURE_MODES.contains(m)).map(|m| {
        let warning = format!(
            "SSH key {} has insecure permissions {m:o}; run: chmod 600 {}",
            path.display(),
            path.display()
        );
        log::warn!("{warning}");
        warning
    });

    if !String::from_utf8_lossy(&bytes).contains(PRIVATE_KEY_MARKER) {
        return Err(GitusrError::InvalidKeyFormat(path.to_path_buf()));
    }

    Ok(KeyCheck {
        path: path.to_path_buf(),
        mode,
        permission_warning,
    })
}

/// Hex SHA-256 of the file's raw bytes, or `None` if it cannot be read.
pub fn fingerprint(path: &Path) -> Option<String> {
    std::fs::read(path).ok().map(|bytes| fingerprint_bytes(&bytes))
}

/// Hex SHA-256 of `bytes`.
pub fn fingerprint_bytes(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

#[cfg(unix)]
fn permission_bits(path: &Path) -> Option<u32> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .ok()
        .map(|meta| meta.permissions().mode() & 0o777)
}

#[cfg(not(unix))]
fn permission_bits(_path: &Path) -> Option<u32> {
    None
}
