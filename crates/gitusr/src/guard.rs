//! Mutual exclusion for SSH agent mutations.
//!
//! Loading and unloading keys are multi-step sequences against an external
//! process (query, then add or delete). Two of them interleaving can leave
//! the agent with the wrong key set, so every mutation runs inside the
//! process-wide [`AGENT_KEYS`] region. Queries run unguarded.
//!
//! The region is released when the [`AgentLock`] drops, including on early
//! return and unwinding. A lock poisoned by a panic inside the region is
//! recovered by the next caller.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use crate::adapters::AgentAdapter;
use crate::error::Result;

/// A named mutual-exclusion region.
#[derive(Debug)]
pub struct AgentGuard {
    name: &'static str,
    lock: Mutex<()>,
}

/// Held while inside an [`AgentGuard`] region.
#[must_use = "the region is released as soon as the lock is dropped"]
pub struct AgentLock<'a> {
    name: &'static str,
    _guard: MutexGuard<'a, ()>,
}

impl Drop for AgentLock<'_> {
    fn drop(&mut self) {
        log::trace!("leaving {}", self.name);
    }
}

impl AgentGuard {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            lock: Mutex::new(()),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Block until the region is free, then enter it.
    pub fn acquire(&self) -> AgentLock<'_> {
        let guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        log::trace!("entered {}", self.name);
        AgentLock {
            name: self.name,
            _guard: guard,
        }
    }

    /// Run `f` inside the region.
    pub fn run<T>(&self, f: impl FnOnce() -> T) -> T {
        let _lock = self.acquire();
        f()
    }
}

/// Guards load-one-key, unload-one-key and unload-all.
pub static AGENT_KEYS: AgentGuard = AgentGuard::new("agent-keys");

/// An [`AgentAdapter`] whose mutations are serialized through an
/// [`AgentGuard`].
#[derive(Debug)]
pub struct GuardedAgent<'g, A> {
    agent: A,
    guard: &'g AgentGuard,
}

impl<A: AgentAdapter> GuardedAgent<'static, A> {
    /// Wrap `agent` using the process-wide [`AGENT_KEYS`] guard.
    pub fn new(agent: A) -> Self {
        Self::with_guard(agent, &AGENT_KEYS)
    }
}

impl<'g, A: AgentAdapter> GuardedAgent<'g, A> {
    pub fn with_guard(agent: A, guard: &'g AgentGuard) -> Self {
        Self { agent, guard }
    }

    pub fn inner(&self) -> &A {
        &self.agent
    }

    pub fn is_running(&self) -> bool {
        self.agent.is_running()
    }

    pub fn is_key_loaded(&self, path: &Path) -> bool {
        self.agent.is_key_loaded(path)
    }

    pub fn list_loaded_key_labels(&self) -> Result<Vec<String>> {
        self.agent.list_loaded_key_labels()
    }

    pub fn load_key(&self, path: &Path) -> Result<()> {
        self.guard.run(|| self.agent.load_key(path))
    }

    pub fn unload_key(&self, path: &Path) -> Result<()> {
        self.guard.run(|| self.agent.unload_key(path))
    }

    pub fn unload_all(&self) -> Result<()> {
        self.guard.run(|| self.agent.unload_all())
    }

    /// Unload every key, then load `path`, without letting another mutation
    /// in between.
    pub fn replace_keys(&self, path: &Path) -> Result<()> {
        self.guard.run(|| {
            self.agent.unload_all()?;
            self.agent.load_key(path)
        })
    }
}
