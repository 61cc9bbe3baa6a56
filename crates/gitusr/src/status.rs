//! Snapshot of what is in effect right now.

use std::path::PathBuf;

use serde::Serialize;

use crate::adapters::{AgentAdapter, GitAdapter, GitIdentity};
use crate::config::agent_socket;
use crate::crypto::KeyProvider;
use crate::identity::ListedIdentity;
use crate::storage::IdentityStore;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentStatus {
    pub running: bool,
    pub loaded_keys: Vec<String>,
    pub socket: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub active: Option<ListedIdentity>,
    /// `None` when `git` is not available.
    pub git: Option<GitIdentity>,
    pub agent: AgentStatus,
    pub identity_count: usize,
    /// Records in the store file that could not be decrypted.
    pub unreadable_count: usize,
}

impl StatusReport {
    /// Gather the report. Adapter failures degrade to empty fields.
    pub fn collect<K: KeyProvider>(
        store: &IdentityStore<K>,
        git: &impl GitAdapter,
        agent: &impl AgentAdapter,
    ) -> Self {
        let git = if git.is_available() {
            git.global_identity()
                .map_err(|e| log::warn!("cannot read git config: {e}"))
                .ok()
        } else {
            None
        };

        let running = agent.is_running();
        let loaded_keys = if running {
            agent.list_loaded_key_labels().unwrap_or_else(|e| {
                log::warn!("cannot list agent keys: {e}");
                Vec::new()
            })
        } else {
            Vec::new()
        };

        Self {
            active: store
                .active_identity()
                .map(|identity| ListedIdentity::new(identity, true)),
            git,
            agent: AgentStatus {
                running,
                loaded_keys,
                socket: agent_socket(),
            },
            identity_count: store.len(),
            unreadable_count: store.unreadable_count(),
        }
    }

    /// True when Git's global name and email equal the active identity's.
    pub fn git_matches_active(&self) -> bool {
        match (&self.active, &self.git) {
            (Some(active), Some(git)) => {
                git.name.as_deref() == Some(active.name.as_str())
                    && git.email.as_deref() == Some(active.email.as_str())
            }
            _ => false,
        }
    }
}
