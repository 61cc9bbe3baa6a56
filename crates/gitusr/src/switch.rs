//! Selecting, activating and removing identities.
//!
//! The store only records which identity is active. Making it take effect
//! (Git global config, SSH agent keys) happens here. Adapter failures do not
//! undo the store change; they are logged and returned as warnings.

use std::path::{Path, PathBuf};

use crate::adapters::{AgentAdapter, GitAdapter};
use crate::crypto::KeyProvider;
use crate::error::{GitusrError, Result};
use crate::guard::GuardedAgent;
use crate::identity::Identity;
use crate::sshkey::KeyRecovery;
use crate::storage::IdentityStore;

/// How the operator named an identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    /// Full id or an unambiguous prefix of one.
    Id(String),
    Email(String),
    Nickname(String),
}

impl std::fmt::Display for Selector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Id(id) => write!(f, "id {id}"),
            Self::Email(email) => write!(f, "email {email}"),
            Self::Nickname(nickname) => write!(f, "nickname {nickname}"),
        }
    }
}

/// Find exactly one identity for `selector`.
///
/// # Errors
///
/// [`GitusrError::NotFound`] when nothing matches and
/// [`GitusrError::AmbiguousMatch`] when an email or id prefix matches more
/// than one identity. Ambiguity is never resolved implicitly.
pub fn resolve<'s, K: KeyProvider>(
    store: &'s IdentityStore<K>,
    selector: &Selector,
) -> Result<&'s Identity> {
    let matches = match selector {
        Selector::Id(id) => match store.get_identity(id) {
            Some(identity) => return Ok(identity),
            None if id.is_empty() => Vec::new(),
            None => store.find_by_id_prefix(id),
        },
        Selector::Email(email) => store.find_by_email(email),
        Selector::Nickname(nickname) => store.find_by_nickname(nickname).into_iter().collect(),
    };

    match matches.as_slice() {
        [] => Err(GitusrError::NotFound(selector.to_string())),
        [one] => Ok(*one),
        many => Err(GitusrError::AmbiguousMatch {
            selector: selector.to_string(),
            count: many.len(),
        }),
    }
}

/// Result of [`Switcher::activate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchOutcome {
    /// The identity as stored after the switch.
    pub identity: Identity,
    /// Nothing was done because it was already active.
    pub already_active: bool,
    /// Set when the key had moved and the new location was saved.
    pub relocated_key: Option<PathBuf>,
    pub warnings: Vec<String>,
}

/// Result of [`Switcher::remove`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoveOutcome {
    pub identity: Identity,
    pub was_active: bool,
    pub warnings: Vec<String>,
}

/// Applies identity changes to Git and the SSH agent.
pub struct Switcher<'g, G, A> {
    git: G,
    agent: GuardedAgent<'g, A>,
    recovery: KeyRecovery,
    exclusive: bool,
}

impl<'g, G: GitAdapter, A: AgentAdapter> Switcher<'g, G, A> {
    pub fn new(git: G, agent: GuardedAgent<'g, A>, recovery: KeyRecovery) -> Self {
        Self {
            git,
            agent,
            recovery,
            exclusive: false,
        }
    }

    /// When set, activation empties the agent before loading the new key
    /// instead of only unloading the previous identity's key.
    pub fn exclusive(mut self, exclusive: bool) -> Self {
        self.exclusive = exclusive;
        self
    }

    /// Make `id` the active identity.
    ///
    /// Checks the key first and saves a recovered location if it moved, then
    /// marks the identity active and syncs Git and the agent. A key that is
    /// missing or modified is reported and not loaded.
    ///
    /// # Errors
    ///
    /// [`GitusrError::NotFound`] for an unknown id, or a store write error.
    pub fn activate<K: KeyProvider>(
        &self,
        store: &mut IdentityStore<K>,
        id: &str,
    ) -> Result<SwitchOutcome> {
        let target = store
            .get_identity(id)
            .cloned()
            .ok_or_else(|| GitusrError::NotFound(format!("id {id}")))?;

        if store.active_id() == Some(&target.id) {
            log::info!("{} is already active", target.label());
            return Ok(SwitchOutcome {
                identity: target,
                already_active: true,
                relocated_key: None,
                warnings: Vec::new(),
            });
        }

        let previous_key = store.active_identity().map(|p| p.ssh_key_path.clone());
        let mut warnings = Warnings::default();

        let integrity = self.recovery.verify_integrity(&target);
        let mut relocated_key = None;
        if let Some(ref new_path) = integrity.new_path {
            match store.update_ssh_key_path(id, new_path) {
                Ok(_) => relocated_key = Some(new_path.clone()),
                Err(e) => warnings.push(format!("could not save new key location: {e}")),
            }
        }
        if !integrity.valid {
            warnings.push(integrity.message.clone());
        }

        store.set_active(id)?;
        let identity = store.get_identity(id).cloned().unwrap_or(target);
        log::info!("switched to {} <{}>", identity.label(), identity.email);

        if let Err(e) = self.git.set_global_identity(&identity.name, &identity.email) {
            warnings.push(format!("git config not updated: {e}"));
        }

        if integrity.valid {
            self.sync_agent(previous_key.as_deref(), &identity.ssh_key_path, &mut warnings);
        }

        Ok(SwitchOutcome {
            identity,
            already_active: false,
            relocated_key,
            warnings: warnings.0,
        })
    }

    fn sync_agent(&self, previous: Option<&Path>, key: &Path, warnings: &mut Warnings) {
        if !self.agent.is_running() {
            warnings.push(format!(
                "SSH agent is not running; {} was not loaded",
                key.display()
            ));
            return;
        }
        if self.exclusive {
            if let Err(e) = self.agent.replace_keys(key) {
                warnings.push(format!("SSH agent not updated: {e}"));
            }
            return;
        }
        if let Some(previous) = previous.filter(|p| *p != key) {
            if let Err(e) = self.agent.unload_key(previous) {
                warnings.push(format!("previous SSH key not unloaded: {e}"));
            }
        }
        if let Err(e) = self.agent.load_key(key) {
            warnings.push(format!("SSH key not loaded: {e}"));
        }
    }

    /// Delete `id`. When it was active its key is also unloaded from the
    /// agent, best effort.
    ///
    /// # Errors
    ///
    /// [`GitusrError::NotFound`] for an unknown id, or a store write error.
    pub fn remove<K: KeyProvider>(
        &self,
        store: &mut IdentityStore<K>,
        id: &str,
    ) -> Result<RemoveOutcome> {
        let identity = store
            .get_identity(id)
            .cloned()
            .ok_or_else(|| GitusrError::NotFound(format!("id {id}")))?;
        let was_active = store.active_id() == Some(&identity.id);

        store.remove_identity(id)?;

        let mut warnings = Warnings::default();
        if was_active {
            warnings.push(format!(
                "{} was the active identity; run `gitusr switch` to pick another",
                identity.label()
            ));
            if self.agent.is_running() {
                if let Err(e) = self.agent.unload_key(&identity.ssh_key_path) {
                    warnings.push(format!("SSH key not unloaded: {e}"));
                }
            }
        }

        Ok(RemoveOutcome {
            identity,
            was_active,
            warnings: warnings.0,
        })
    }
}

#[derive(Default)]
struct Warnings(Vec<String>);

impl Warnings {
    fn push(&mut self, warning: String) {
        log::warn!("{warning}");
        self.0.push(warning);
    }
}
