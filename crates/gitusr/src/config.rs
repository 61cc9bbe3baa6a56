//! Store location and environment lookups.
//!
//! By convention the store lives at `~/.gitusr/users.encrypted`:
//!
//! ```text
//! ~/.gitusr/              (mode 0700)
//! └── users.encrypted     (mode 0600)
//! ```
//!
//! `GITUSR_HOME` replaces the `~/.gitusr` directory.

use std::path::{Path, PathBuf};

use crate::error::{GitusrError, Result};

/// Directory name under the home directory.
pub const CONFIG_DIR_NAME: &str = ".gitusr";

/// Store file name inside the config directory.
pub const STORE_FILE_NAME: &str = "users.encrypted";

/// Environment variable overriding the config directory.
pub const HOME_OVERRIDE_VAR: &str = "GITUSR_HOME";

/// Environment variable exposing the running agent's socket.
pub const AGENT_SOCKET_VAR: &str = "SSH_AUTH_SOCK";

/// Where the encrypted store is read from and written to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Directory holding the store file. Created with mode 0700.
    pub config_dir: PathBuf,
    /// The encrypted store file.
    pub store_path: PathBuf,
}

impl StoreConfig {
    /// Store at the default file name inside `config_dir`.
    pub fn at(config_dir: impl Into<PathBuf>) -> Self {
        let config_dir = config_dir.into();
        let store_path = config_dir.join(STORE_FILE_NAME);
        Self {
            config_dir,
            store_path,
        }
    }

    /// Store at an explicit file path; its parent is the config directory.
    pub fn with_store_file(store_path: impl Into<PathBuf>) -> Self {
        let store_path = store_path.into();
        let config_dir = store_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Self {
            config_dir,
            store_path,
        }
    }

    /// Resolve the store location from `GITUSR_HOME` or the home directory.
    ///
    /// # Errors
    ///
    /// Returns [`GitusrError::Config`] if neither `GITUSR_HOME` nor a home
    /// directory variable is set.
    pub fn from_env() -> Result<Self> {
        if let Some(dir) = std::env::var_os(HOME_OVERRIDE_VAR).filter(|v| !v.is_empty()) {
            return Ok(Self::at(dir));
        }
        let home = home_dir().ok_or_else(|| {
            GitusrError::Config(format!(
                "cannot locate the store: neither {HOME_OVERRIDE_VAR} nor HOME is set"
            ))
        })?;
        Ok(Self::at(home.join(CONFIG_DIR_NAME)))
    }
}

/// The current user's home directory from `HOME` (or `USERPROFILE`).
pub fn home_dir() -> Option<PathBuf> {
    ["HOME", "USERPROFILE"]
        .iter()
        .filter_map(|name| std::env::var_os(name))
        .find(|value| !value.is_empty())
        .map(PathBuf::from)
}

/// The agent socket path, if an agent is advertised in the environment.
pub fn agent_socket() -> Option<PathBuf> {
    std::env::var_os(AGENT_SOCKET_VAR)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}
