//! Call accounting for the in-memory services.

use std::sync::{Mutex, MutexGuard};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Counts calls made against [`InMemoryDirectory`](super::InMemoryDirectory).
#[derive(Debug, Default)]
pub struct CallStats {
    user_lookups: AtomicUsize,
    batches: Mutex<BatchLog>,
    classify_calls: AtomicUsize,
    classify_in_flight: AtomicUsize,
    classify_peak: AtomicUsize,
}

impl CallStats {
    pub fn user_lookups(&self) -> usize {
        self.user_lookups.load(Ordering::SeqCst)
    }

    /// Size of every bulk message lookup, in call order.
    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batches().sizes.clone()
    }

    /// Every user id that reached a bulk lookup, in call order.
    ///
    /// Consecutive runs of [`batch_sizes`](Self::batch_sizes) entries split
    /// this list back into the individual batches.
    pub fn batch_users(&self) -> Vec<u64> {
        self.batches().users.clone()
    }

    pub fn classify_calls(&self) -> usize {
        self.classify_calls.load(Ordering::SeqCst)
    }

    /// Highest number of classifier calls observed in flight at once.
    pub fn peak_concurrent_classifications(&self) -> usize {
        self.classify_peak.load(Ordering::SeqCst)
    }

    pub(crate) fn record_user_lookup(&self) {
        self.user_lookups.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn record_batch(&self, user_ids: impl IntoIterator<Item = u64>) {
        let mut log = self.batches();
        let before = log.users.len();
        log.users.extend(user_ids);
        let size = log.users.len() - before;
        log.sizes.push(size);
    }

    fn batches(&self) -> MutexGuard<'_, BatchLog> {
        self.batches.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Mark a classifier call as started. The guard marks it finished on drop.
    pub(crate) fn start_classify(&self) -> InFlightGuard<'_> {
        self.classify_calls.fetch_add(1, Ordering::SeqCst);
        let now = self.classify_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.classify_peak.fetch_max(now, Ordering::SeqCst);
        InFlightGuard(self)
    }
}

/// Users and sizes of bulk lookups, updated together under one lock.
#[derive(Debug, Default)]
struct BatchLog {
    users: Vec<u64>,
    sizes: Vec<usize>,
}

/// Decrements the in-flight classifier count on drop.
pub(crate) struct InFlightGuard<'a>(&'a CallStats);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.classify_in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}
