//! Global Git identity (`user.name` / `user.email`).

use serde::Serialize;

use crate::adapters::command::{run, run_checked};
use crate::error::{GitusrError, Result};

const GIT: &str = "git";

/// `git config --get` exits with 1 when the requested key is not set.
const EXIT_KEY_UNSET: i32 = 1;

/// `git config --unset` exits with 5 when there is nothing to unset.
const EXIT_NOTHING_TO_UNSET: i32 = 5;

/// The two Git config keys gitusr manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GitConfigKey {
    UserName,
    UserEmail,
}

impl GitConfigKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UserName => "user.name",
            Self::UserEmail => "user.email",
        }
    }
}

impl std::fmt::Display for GitConfigKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Global identity as Git currently sees it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GitIdentity {
    pub name: Option<String>,
    pub email: Option<String>,
}

/// Access to the user's global Git configuration.
pub trait GitAdapter {
    fn is_available(&self) -> bool;
    fn set_global_identity(&self, name: &str, email: &str) -> Result<()>;
    fn global_identity(&self) -> Result<GitIdentity>;
    fn unset_global_key(&self, key: GitConfigKey) -> Result<()>;
    fn is_inside_repository(&self) -> bool;
}

impl<G: GitAdapter + ?Sized> GitAdapter for &G {
    fn is_available(&self) -> bool {
        (**self).is_available()
    }
    fn set_global_identity(&self, name: &str, email: &str) -> Result<()> {
        (**self).set_global_identity(name, email)
    }
    fn global_identity(&self) -> Result<GitIdentity> {
        (**self).global_identity()
    }
    fn unset_global_key(&self, key: GitConfigKey) -> Result<()> {
        (**self).unset_global_key(key)
    }
    fn is_inside_repository(&self) -> bool {
        (**self).is_inside_repository()
    }
}

/// [`GitAdapter`] backed by the `git` executable.
#[derive(Debug, Clone, Copy, Default)]
pub struct GitCli;

impl GitCli {
    fn get(&self, key: GitConfigKey) -> Result<Option<String>> {
        let output = run(GIT, ["config", "--global", "--get", key.as_str()])?;
        if output.code == Some(EXIT_KEY_UNSET) {
            return Ok(None);
        }
        let value = output.check(GIT)?.stdout.trim().to_string();
        Ok(Some(value).filter(|v| !v.is_empty()))
    }

    fn set(&self, key: GitConfigKey, value: &str) -> Result<()> {
        run_checked(GIT, ["config", "--global", key.as_str(), value])?;
        Ok(())
    }
}

impl GitAdapter for GitCli {
    fn is_available(&self) -> bool {
        run(GIT, ["--version"]).map(|o| o.success()).unwrap_or(false)
    }

    fn set_global_identity(&self, name: &str, email: &str) -> Result<()> {
        if !self.is_available() {
            return Err(GitusrError::external(GIT, "not available"));
        }
        self.set(GitConfigKey::UserName, name)?;
        self.set(GitConfigKey::UserEmail, email)?;
        log::info!("git global identity set to {name} <{email}>");
        Ok(())
    }

    fn global_identity(&self) -> Result<GitIdentity> {
        Ok(GitIdentity {
            name: self.get(GitConfigKey::UserName)?,
            email: self.get(GitConfigKey::UserEmail)?,
        })
    }

    fn unset_global_key(&self, key: GitConfigKey) -> Result<()> {
        let output = run(GIT, ["config", "--global", "--unset", key.as_str()])?;
        if output.code == Some(EXIT_NOTHING_TO_UNSET) {
            log::debug!("{key} was not set");
            return Ok(());
        }
        output.check(GIT)?;
        log::info!("unset git {key}");
        Ok(())
    }

    fn is_inside_repository(&self) -> bool {
        run(GIT, ["rev-parse", "--git-dir"])
            .map(|o| o.success())
            .unwrap_or(false)
    }
}
