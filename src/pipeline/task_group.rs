//! Structured fan-out: spawn child tasks, then join all of them.

use std::future::Future;

use tokio::task::JoinSet;
use tracing::error;

/// A group of fire-and-forget child tasks owned by one stage.
///
/// Children report nothing back; they handle their own errors. The owner
/// must call [`join_all`](Self::join_all) before closing its output so no
/// child can still be writing. Dropping an unjoined group aborts the children.
pub struct TaskGroup {
    name: &'static str,
    tasks: JoinSet<()>,
    spawned: usize,
}

impl TaskGroup {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            tasks: JoinSet::new(),
            spawned: 0,
        }
    }

    /// Spawn a child task onto the current runtime.
    pub fn spawn<F>(&mut self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tasks.spawn(task);
        self.spawned += 1;
    }

    /// Total children spawned so far.
    pub fn spawned(&self) -> usize {
        self.spawned
    }

    /// Wait for every child to finish. Returns how many panicked.
    pub async fn join_all(mut self) -> usize {
        let mut panicked = 0;
        while let Some(result) = self.tasks.join_next().await {
            if let Err(e) = result {
                panicked += 1;
                error!(group = self.name, error = %e, "Child task panicked");
            }
        }
        panicked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn join_waits_for_all_children() {
        let done = Arc::new(AtomicUsize::new(0));
        let mut group = TaskGroup::new("test");

        for i in 0..10u64 {
            let done = Arc::clone(&done);
            group.spawn(async move {
                tokio::time::sleep(Duration::from_millis(i * 3)).await;
                done.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(group.spawned(), 10);

        let panicked = group.join_all().await;
        assert_eq!(panicked, 0);
        assert_eq!(done.load(Ordering::SeqCst), 10);
    }

    #[tokio::test]
    async fn panicking_child_does_not_stop_siblings() {
        let done = Arc::new(AtomicUsize::new(0));
        let mut group = TaskGroup::new("test");

        group.spawn(async {
            panic!("boom");
        });
        for _ in 0..3 {
            let done = Arc::clone(&done);
            group.spawn(async move {
                done.fetch_add(1, Ordering::SeqCst);
            });
        }

        assert_eq!(group.join_all().await, 1);
        assert_eq!(done.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn empty_group_joins_immediately() {
        assert_eq!(TaskGroup::new("empty").join_all().await, 0);
    }
}
