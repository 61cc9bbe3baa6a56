//! Adapters to external tools: `git` and the SSH agent.
//!
//! The traits are the seams; [`GitCli`] and [`SshAgentCli`] are the real
//! implementations and tests substitute their own.

pub mod agent;
pub mod command;
pub mod git;

pub use agent::{AgentAdapter, SshAgentCli};
pub use command::CommandOutput;
pub use git::{GitAdapter, GitCli, GitConfigKey, GitIdentity};
