//! Per-user run serialization.
//!
//! History updates are read-modify-write against a last-writer-wins upsert,
//! so two concurrent runs for the same user can silently drop each other's
//! turns. Each user id maps to an async `Mutex`; a run holds its user's lock
//! from history read to history write. Runs for different users stay fully
//! parallel.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

pub struct UserLockMap {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl Default for UserLockMap {
    fn default() -> Self {
        Self::new()
    }
}

impl UserLockMap {
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// The lock for one user id, created on first use.
    ///
    /// Each call also drops entries no run holds anymore, so the map stays
    /// bounded by the number of users with an in-flight run.
    pub fn lock_for(&self, user_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock();
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        locks
            .entry(user_id.to_owned())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Number of tracked users (for monitoring).
    pub fn user_count(&self) -> usize {
        self.locks.lock().len()
    }
}
