//! Stage 1: resolve emails to users, emitting each user once.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::pipeline::claim::ClaimRegistry;
use crate::pipeline::stage::{Inbound, Outbound, Stage};
use crate::pipeline::task_group::TaskGroup;
use crate::pipeline::types::{Email, UserDirectory, UserId, UserRecord};

/// Looks up every email concurrently and forwards only the first record
/// seen for each user id.
///
/// Fan-out is one task per email with no admission limit; the caller
/// controls input size.
pub struct SelectUsers {
    directory: Arc<dyn UserDirectory>,
    claims: Arc<ClaimRegistry<UserId>>,
}

impl SelectUsers {
    pub const NAME: &'static str = "select_users";

    /// `claims` must be fresh for every run.
    pub fn new(directory: Arc<dyn UserDirectory>, claims: Arc<ClaimRegistry<UserId>>) -> Self {
        Self { directory, claims }
    }
}

#[async_trait]
impl Stage for SelectUsers {
    type Input = Email;
    type Output = UserRecord;

    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn run(&self, mut input: Inbound<Email>, output: Outbound<UserRecord>) {
        let mut lookups = TaskGroup::new(Self::NAME);

        while let Some(email) = input.recv().await {
            let directory = Arc::clone(&self.directory);
            let claims = Arc::clone(&self.claims);
            let output = output.clone();

            lookups.spawn(async move {
                let user = match directory.lookup_user(&email).await {
                    Ok(user) => user,
                    Err(e) => {
                        warn!(email = %email, error = %e, "User lookup failed");
                        output.record_failure();
                        return;
                    }
                };

                if claims.claim(user.id) {
                    output.send(user);
                } else {
                    debug!(email = %email, user_id = %user.id, "Duplicate user, skipping");
                }
            });
        }

        let spawned = lookups.spawned();
        let panicked = lookups.join_all().await;
        output.record_failures(panicked);
        debug!(
            lookups = spawned,
            unique = self.claims.len(),
            "User lookups finished"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::driver::Pipeline;
    use crate::services::InMemoryDirectory;
    use std::time::Duration;

    fn stage(dir: Arc<InMemoryDirectory>) -> SelectUsers {
        SelectUsers::new(dir, Arc::new(ClaimRegistry::new()))
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn aliases_and_repeats_emit_once() {
        let dir = Arc::new(
            InMemoryDirectory::new()
                .with_user(1, "a@x", &[])
                .with_user(2, "b@x", &[])
                .with_alias("bruce@x", 1)
                .with_latency(Duration::from_millis(2)),
        );

        let emails = ["a@x", "b@x", "a@x", "bruce@x", "BRUCE@x"].map(String::from);
        let (users, summary) = Pipeline::from_items(emails)
            .then(stage(Arc::clone(&dir)))
            .run()
            .await;

        let mut ids: Vec<u64> = users.iter().map(|u| u.id.0).collect();
        ids.sort();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(dir.stats().user_lookups(), 5);

        let report = summary.stage(SelectUsers::NAME).unwrap();
        assert_eq!(report.received, 5);
        assert_eq!(report.emitted, 2);
        assert_eq!(report.failures, 0);
    }

    #[tokio::test]
    async fn bad_emails_are_dropped_without_stopping_siblings() {
        let dir = Arc::new(InMemoryDirectory::new().with_user(1, "a@x", &[]));

        let emails = ["garbage", "a@x", "ghost@x"].map(String::from);
        let (users, summary) = Pipeline::from_items(emails).then(stage(dir)).run().await;

        assert_eq!(users.len(), 1);
        assert_eq!(users[0].email, "a@x");
        assert_eq!(summary.stage(SelectUsers::NAME).unwrap().failures, 2);
    }

    #[tokio::test]
    async fn empty_input_closes_cleanly() {
        let dir = Arc::new(InMemoryDirectory::new());
        let (users, summary) = Pipeline::from_items(Vec::<Email>::new())
            .then(stage(dir))
            .run()
            .await;
        assert!(users.is_empty());
        assert!(summary.all_closed());
    }
}
