//! Claim-once registry: at most one winner among racing tasks per key.

use std::collections::HashSet;
use std::hash::Hash;
use std::sync::Mutex;

/// Concurrency-safe set where each key can be claimed exactly once.
///
/// Scoped to a single pipeline run; create a fresh registry per run.
#[derive(Debug)]
pub struct ClaimRegistry<K> {
    claimed: Mutex<HashSet<K>>,
}

impl<K: Eq + Hash> ClaimRegistry<K> {
    pub fn new() -> Self {
        Self {
            claimed: Mutex::new(HashSet::new()),
        }
    }

    /// Try to claim `key`. Returns `true` only for the first caller.
    pub fn claim(&self, key: K) -> bool {
        // A poisoned lock still holds a consistent set: inserts are atomic.
        let mut claimed = self.claimed.lock().unwrap_or_else(|e| e.into_inner());
        claimed.insert(key)
    }

    /// Number of keys claimed so far.
    pub fn len(&self) -> usize {
        self.claimed.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K: Eq + Hash> Default for ClaimRegistry<K> {
    fn default() -> Self {
        Self::new()
    }
}
