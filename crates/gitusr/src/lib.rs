//! gitusr: switch between Git and SSH identities on one machine.
//!
//! Keeps an encrypted-at-rest store of named identities (name, email, SSH
//! private key path), tracks which one is active, and applies the active one
//! to the global Git config and the running SSH agent.

pub mod adapters;
pub mod config;
pub mod crypto;
pub mod error;
pub mod guard;
pub mod identity;
pub mod sshkey;
pub mod status;
pub mod storage;
pub mod switch;
pub mod time;

#[cfg(test)]
mod test_support;

// Re-export primary types
pub use config::StoreConfig;
pub use error::{GitusrError, Result};
pub use identity::{Identity, IdentityField, IdentityId, ListedIdentity};
pub use storage::{Added, IdentityStore, LoadReport};

pub use adapters::{AgentAdapter, GitAdapter, GitCli, GitIdentity, SshAgentCli};
pub use crypto::{EnvKeyProvider, FixedKeyProvider, KeyProvider, MasterKey};
pub use guard::{AgentGuard, GuardedAgent, AGENT_KEYS};
pub use sshkey::{IntegrityReport, KeyRecovery};
pub use status::StatusReport;
pub use switch::{resolve, RemoveOutcome, Selector, SwitchOutcome, Switcher};
