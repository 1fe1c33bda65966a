//! recollect — per-project persistent memory for AI coding agents.
//!
//! A SQLite+FTS5 store of salient facts (decisions, preferences,
//! anti-patterns, file snapshots) with ranked recall that decays over time,
//! near-duplicate folding, tags, typed links, and a transcript-reduction
//! pipeline for host message streams.

pub mod config;
pub mod db;
pub mod error;
pub mod filecache;
pub mod mistakes;
pub mod query;
pub mod rank;
pub mod scr;
pub mod tools;
pub mod transfer;
pub mod util;

use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::Config;
use crate::error::MemoryError;

pub type SharedStore = Arc<db::MemoryStore>;

enum ContextState {
    /// Not opened yet — first [`StoreContext::store`] call opens lazily.
    Idle,
    Ready(SharedStore),
    /// Open or migration failed. Latched: every later call fails fast with
    /// the same message instead of retrying a poisoned store.
    Failed(String),
}

/// Narrow handle the tool layer threads through every call: configuration
/// plus the lazily-initialized store singleton.
pub struct StoreContext {
    config: Config,
    state: Mutex<ContextState>,
}

impl StoreContext {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            state: Mutex::new(ContextState::Idle),
        }
    }

    /// In-memory context for tests.
    pub fn in_memory() -> Self {
        let mut config = Config::default();
        config.db_path = ":memory:".into();
        Self::new(config)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Open on first use; hand out the shared store afterwards.
    pub fn store(&self) -> Result<SharedStore, MemoryError> {
        let mut state = self.state.lock();
        match &*state {
            ContextState::Ready(store) => Ok(store.clone()),
            ContextState::Failed(msg) => Err(MemoryError::Unavailable(msg.clone())),
            ContextState::Idle => {
                let path = self.config.db_path.to_string_lossy().to_string();
                match db::MemoryStore::open(&path) {
                    Ok(store) => {
                        tracing::info!(db = %path, "memory store opened");
                        let store = Arc::new(store);
                        *state = ContextState::Ready(store.clone());
                        Ok(store)
                    }
                    Err(e) => {
                        let msg = e.to_string();
                        tracing::error!(db = %path, error = %msg, "store open failed, latching");
                        *state = ContextState::Failed(msg.clone());
                        Err(MemoryError::Unavailable(msg))
                    }
                }
            }
        }
    }

    /// Idempotent teardown: runs the optimizer pragma (errors swallowed) and
    /// drops the handle. A latched failure stays latched.
    pub fn close(&self) {
        let mut state = self.state.lock();
        if let ContextState::Ready(store) = &*state {
            store.close();
            *state = ContextState::Idle;
        }
    }
}

#[cfg(test)]
mod context_tests {
    use super::*;

    #[test]
    fn open_failure_is_latched() {
        let mut config = Config::default();
        // A directory path can't be opened as a database file.
        config.db_path = "/dev/null/nope/memory.db".into();
        let ctx = StoreContext::new(config);
        let first = ctx.store().unwrap_err().to_string();
        let second = ctx.store().unwrap_err().to_string();
        assert_eq!(first, second);
        assert!(first.contains("database unavailable"));
    }

    #[test]
    fn close_then_reuse() {
        let ctx = StoreContext::in_memory();
        ctx.store().unwrap();
        ctx.close();
        ctx.close();
        ctx.store().unwrap();
    }
}
