//! Stage 3: classify every message under a concurrency cap.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tracing::{debug, error, warn};

use crate::pipeline::stage::{Inbound, Outbound, Stage};
use crate::pipeline::task_group::TaskGroup;
use crate::pipeline::types::{MessageId, SpamClassifier, Verdict};

/// Runs the classifier for each message id with at most `max_in_flight`
/// calls outstanding.
///
/// A permit is taken before the task is spawned and moved into it, so it is
/// released when the task ends on any path. Failed checks emit nothing.
pub struct CheckSpam {
    classifier: Arc<dyn SpamClassifier>,
    limiter: Arc<Semaphore>,
}

impl CheckSpam {
    pub const NAME: &'static str = "check_spam";

    /// A `max_in_flight` of zero is treated as one.
    pub fn new(classifier: Arc<dyn SpamClassifier>, max_in_flight: usize) -> Self {
        Self::with_limiter(classifier, Arc::new(Semaphore::new(max_in_flight.max(1))))
    }

    /// Share one admission limit between several pipelines.
    pub fn with_limiter(classifier: Arc<dyn SpamClassifier>, limiter: Arc<Semaphore>) -> Self {
        Self {
            classifier,
            limiter,
        }
    }
}

#[async_trait]
impl Stage for CheckSpam {
    type Input = MessageId;
    type Output = Verdict;

    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn run(&self, mut input: Inbound<MessageId>, output: Outbound<Verdict>) {
        let mut checks = TaskGroup::new(Self::NAME);

        while let Some(id) = input.recv().await {
            let permit = match Arc::clone(&self.limiter).acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    error!(message_id = %id, error = %e, "Classifier limiter closed");
                    output.record_failure();
                    continue;
                }
            };
            let classifier = Arc::clone(&self.classifier);
            let output = output.clone();

            checks.spawn(async move {
                let _permit = permit;
                match classifier.classify(id).await {
                    Ok(is_spam) => output.send(Verdict { id, is_spam }),
                    Err(e) => {
                        warn!(message_id = %id, error = %e, "Spam check failed");
                        output.record_failure();
                    }
                }
            });
        }

        let spawned = checks.spawned();
        let panicked = checks.join_all().await;
        output.record_failures(panicked);
        debug!(checks = spawned, "Spam checks finished");
    }
}
