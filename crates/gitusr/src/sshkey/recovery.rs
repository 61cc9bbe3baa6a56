//! Fingerprint-based recovery of key files that moved.
//!
//! The search is a best-effort heuristic: candidates are tried in a fixed
//! order and the first file whose fingerprint matches wins. No ranking or
//! ambiguity resolution is attempted.

use std::path::{Path, PathBuf};

use crate::config::home_dir;
use crate::error::{GitusrError, Result};
use crate::identity::Identity;
use crate::sshkey::validate::{fingerprint, fingerprint_bytes};

/// Conventional private key names under `~/.ssh`, in search order.
const CONVENTIONAL_KEY_NAMES: [&str; 4] = ["id_rsa", "id_ed25519", "id_ecdsa", "id_dsa"];

/// Directories under home searched for the original base name, in order.
const BASENAME_SEARCH_DIRS: [&str; 3] = [".ssh", "keys", ".keys"];

/// Outcome of [`KeyRecovery::verify_integrity`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntegrityReport {
    pub valid: bool,
    /// Where the key was found when it is no longer at the stored path.
    /// The caller decides whether to persist it.
    pub new_path: Option<PathBuf>,
    pub message: String,
}

impl IntegrityReport {
    fn valid(message: String) -> Self {
        Self {
            valid: true,
            new_path: None,
            message,
        }
    }

    fn invalid(message: String) -> Self {
        Self {
            valid: false,
            new_path: None,
            message,
        }
    }
}

/// Searches well-known locations under a home directory.
#[derive(Debug, Clone)]
pub struct KeyRecovery {
    home: PathBuf,
}

impl KeyRecovery {
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self { home: home.into() }
    }

    /// Search relative to the current user's home directory.
    ///
    /// # Errors
    ///
    /// Returns [`GitusrError::Config`] if no home directory is set.
    pub fn from_env() -> Result<Self> {
        home_dir()
            .map(Self::new)
            .ok_or_else(|| GitusrError::Config("HOME is not set".to_string()))
    }

    fn ssh_dir(&self) -> PathBuf {
        self.home.join(".ssh")
    }

    /// Ordered candidate paths tried before the directory scan.
    pub fn candidates(&self, original: &Path) -> Vec<PathBuf> {
        let ssh_dir = self.ssh_dir();
        let mut candidates = vec![original.to_path_buf()];
        candidates.extend(CONVENTIONAL_KEY_NAMES.iter().map(|name| ssh_dir.join(name)));

        if let Some(base_name) = original.file_name() {
            candidates.extend(
                BASENAME_SEARCH_DIRS
                    .iter()
                    .map(|dir| self.home.join(dir).join(base_name)),
            );
        }
        candidates
    }

    /// Find a file whose content fingerprint equals `wanted`.
    pub fn recover(&self, wanted: &str, original: &Path) -> Option<PathBuf> {
        if let Some(found) = self
            .candidates(original)
            .into_iter()
            .find(|candidate| fingerprint(candidate).as_deref() == Some(wanted))
        {
            log::info!("SSH key found at {}", found.display());
            return Some(found);
        }

        let entries = match std::fs::read_dir(self.ssh_dir()) {
            Ok(entries) => entries,
            Err(e) => {
                log::debug!("cannot scan {}: {e}", self.ssh_dir().display());
                return None;
            }
        };

        let found = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
            .map(|entry| entry.path())
            .filter(|path| path.extension().map(|ext| ext != "pub").unwrap_or(true))
            .find(|path| fingerprint(path).as_deref() == Some(wanted));

        if let Some(ref path) = found {
            log::info!("SSH key found at {}", path.display());
        }
        found
    }

    /// Check that an identity's key is still present and unmodified, looking
    /// for it elsewhere when it has moved.
    pub fn verify_integrity(&self, identity: &Identity) -> IntegrityReport {
        let path = &identity.ssh_key_path;

        if let Ok(bytes) = std::fs::read(path) {
            if let Some(ref recorded) = identity.ssh_key_fingerprint {
                if &fingerprint_bytes(&bytes) != recorded {
                    return IntegrityReport::invalid(format!(
                        "SSH key was modified: {}",
                        path.display()
                    ));
                }
            }
            return IntegrityReport::valid(format!("SSH key is valid: {}", path.display()));
        }

        let Some(ref recorded) = identity.ssh_key_fingerprint else {
            return IntegrityReport::invalid(format!("SSH key not found: {}", path.display()));
        };

        log::warn!("SSH key not found at {}", path.display());
        log::info!("searching common locations for the key");

        match self.recover(recorded, path) {
            Some(new_path) => IntegrityReport {
                valid: true,
                message: format!("SSH key found at new location: {}", new_path.display()),
                new_path: Some(new_path),
            },
            None => IntegrityReport::invalid(format!("SSH key not found: {}", path.display())),
        }
    }
}
