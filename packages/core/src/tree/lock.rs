//! Per-scope mutation locks
//!
//! Structural mutations are several dependent statements over scope-wide
//! numeric state, so two of them interleaving on the same scope corrupt the
//! tree. `ScopeLocks` hands out one async mutex per scope key; `TreeWriter`
//! holds the guard for its whole lifetime. Different scopes never contend.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Registry of scope locks, shared by every `NestedSet` handle that writes to
/// the same storage
#[derive(Debug, Default)]
pub struct ScopeLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl ScopeLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, key: &str) -> Arc<AsyncMutex<()>> {
        // The map only holds Arcs, a panic while holding it cannot leave it inconsistent
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(key.to_string()).or_default().clone()
    }

    /// Wait until the scope is free and take it
    pub async fn acquire(&self, key: &str) -> OwnedMutexGuard<()> {
        self.lock_for(key).lock_owned().await
    }

    /// Take the scope only if nobody holds it
    pub fn try_acquire(&self, key: &str) -> Option<OwnedMutexGuard<()>> {
        self.lock_for(key).try_lock_owned().ok()
    }
}
