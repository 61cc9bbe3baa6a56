//! SSH agent control through `ssh-add` and `ssh-keygen`.
//!
//! Mutating calls on an [`AgentAdapter`] must go through
//! [`GuardedAgent`](crate::guard::GuardedAgent) so that they never interleave
//! within one process.

use std::path::{Path, PathBuf};

use crate::adapters::command::{run, run_checked};
use crate::error::{GitusrError, Result};

const SSH_ADD: &str = "ssh-add";
const SSH_KEYGEN: &str = "ssh-keygen";

/// `ssh-add -l` / `-L` exit with 1 when the agent holds no keys and with 2
/// when it cannot be reached.
const EXIT_NO_IDENTITIES: i32 = 1;

/// Operations on the running SSH agent.
pub trait AgentAdapter {
    fn is_running(&self) -> bool;
    /// Add a key. Does nothing when it is already loaded.
    fn load_key(&self, path: &Path) -> Result<()>;
    /// Remove a key. Does nothing when it is not loaded.
    fn unload_key(&self, path: &Path) -> Result<()>;
    fn unload_all(&self) -> Result<()>;
    /// One label (usually the key comment) per loaded key.
    fn list_loaded_key_labels(&self) -> Result<Vec<String>>;
    fn is_key_loaded(&self, path: &Path) -> bool;
}

impl<A: AgentAdapter + ?Sized> AgentAdapter for &A {
    fn is_running(&self) -> bool {
        (**self).is_running()
    }
    fn load_key(&self, path: &Path) -> Result<()> {
        (**self).load_key(path)
    }
    fn unload_key(&self, path: &Path) -> Result<()> {
        (**self).unload_key(path)
    }
    fn unload_all(&self) -> Result<()> {
        (**self).unload_all()
    }
    fn list_loaded_key_labels(&self) -> Result<Vec<String>> {
        (**self).list_loaded_key_labels()
    }
    fn is_key_loaded(&self, path: &Path) -> bool {
        (**self).is_key_loaded(path)
    }
}

/// [`AgentAdapter`] backed by the OpenSSH command-line tools.
#[derive(Debug, Clone, Copy, Default)]
pub struct SshAgentCli;

impl SshAgentCli {
    fn ensure_running(&self) -> Result<()> {
        if self.is_running() {
            return Ok(());
        }
        let reason = if crate::config::agent_socket().is_none() {
            "agent is not running (SSH_AUTH_SOCK is not set)"
        } else {
            "agent is not reachable"
        };
        Err(GitusrError::external(SSH_ADD, reason))
    }

    /// `type base64` of the key's public half. Falls back to `<path>.pub`
    /// when `ssh-keygen` cannot read the private key (e.g. it needs a
    /// passphrase).
    fn public_key(&self, path: &Path) -> Option<String> {
        let derived = run(SSH_KEYGEN, [Path::new("-y"), Path::new("-f"), path])
            .ok()
            .filter(|o| o.success())
            .and_then(|o| key_blob(&o.stdout));
        derived.or_else(|| {
            let mut public = path.as_os_str().to_os_string();
            public.push(".pub");
            std::fs::read_to_string(PathBuf::from(public))
                .ok()
                .and_then(|content| key_blob(&content))
        })
    }

    fn loaded_public_keys(&self) -> Result<Vec<String>> {
        let output = run(SSH_ADD, ["-L"])?;
        if output.code == Some(EXIT_NO_IDENTITIES) {
            return Ok(Vec::new());
        }
        Ok(output
            .check(SSH_ADD)?
            .stdout
            .lines()
            .filter_map(key_blob)
            .collect())
    }
}

impl AgentAdapter for SshAgentCli {
    fn is_running(&self) -> bool {
        run(SSH_ADD, ["-l"])
            .map(|o| matches!(o.code, Some(0) | Some(EXIT_NO_IDENTITIES)))
            .unwrap_or(false)
    }

    fn load_key(&self, path: &Path) -> Result<()> {
        if !path.is_file() {
            return Err(GitusrError::KeyFileNotFound(path.to_path_buf()));
        }
        self.ensure_running()?;
        if self.is_key_loaded(path) {
            log::info!("SSH key {} is already loaded", path.display());
            return Ok(());
        }
        run_checked(SSH_ADD, [path])?;
        log::info!("loaded SSH key {}", path.display());
        Ok(())
    }

    fn unload_key(&self, path: &Path) -> Result<()> {
        self.ensure_running()?;
        if !self.is_key_loaded(path) {
            log::info!("SSH key {} is not loaded", path.display());
            return Ok(());
        }
        run_checked(SSH_ADD, [Path::new("-d"), path])?;
        log::info!("unloaded SSH key {}", path.display());
        Ok(())
    }

    fn unload_all(&self) -> Result<()> {
        self.ensure_running()?;
        run_checked(SSH_ADD, ["-D"])?;
        log::info!("removed all keys from the SSH agent");
        Ok(())
    }

    fn list_loaded_key_labels(&self) -> Result<Vec<String>> {
        self.ensure_running()?;
        let output = run(SSH_ADD, ["-l"])?;
        if output.code == Some(EXIT_NO_IDENTITIES) {
            return Ok(Vec::new());
        }
        Ok(parse_key_labels(&output.check(SSH_ADD)?.stdout))
    }

    fn is_key_loaded(&self, path: &Path) -> bool {
        if !self.is_running() {
            return false;
        }
        let Some(wanted) = self.public_key(path) else {
            return false;
        };
        match self.loaded_public_keys() {
            Ok(loaded) => loaded.contains(&wanted),
            Err(e) => {
                log::debug!("cannot list agent keys: {e}");
                false
            }
        }
    }
}

/// Labels from `ssh-add -l` output: the second-to-last field of each line
/// (`bits fingerprint comment (type)`), or the whole line if shorter.
pub fn parse_key_labels(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            match fields.len() {
                n if n >= 2 => fields[n - 2].to_string(),
                _ => line.to_string(),
            }
        })
        .collect()
}

/// `type base64` from a public key line, ignoring the comment.
pub fn key_blob(line: &str) -> Option<String> {
    let mut fields = line.split_whitespace();
    let key_type = fields.next()?;
    let blob = fields.next()?;
    Some(format!("{key_type} {blob}"))
}
