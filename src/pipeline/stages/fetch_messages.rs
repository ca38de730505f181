//! Stage 2: group users into batches and fetch their message ids.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::pipeline::stage::{Inbound, Outbound, Stage};
use crate::pipeline::task_group::TaskGroup;
use crate::pipeline::types::{MessageId, MessageStore, UserRecord};

/// Buffers users into batches of `batch_size` and spawns one bulk lookup
/// per full batch, plus one for the trailing partial batch.
///
/// The buffer is owned by the stage loop; each task gets its own batch.
pub struct FetchMessages {
    store: Arc<dyn MessageStore>,
    batch_size: usize,
}

impl FetchMessages {
    pub const NAME: &'static str = "fetch_messages";

    /// A `batch_size` of zero is treated as one.
    pub fn new(store: Arc<dyn MessageStore>, batch_size: usize) -> Self {
        Self {
            store,
            batch_size: batch_size.max(1),
        }
    }

    fn spawn_fetch(
        &self,
        fetches: &mut TaskGroup,
        batch: Vec<UserRecord>,
        output: &Outbound<MessageId>,
    ) {
        let store = Arc::clone(&self.store);
        let output = output.clone();

        fetches.spawn(async move {
            match store.lookup_messages(&batch).await {
                Ok(ids) => {
                    debug!(
                        batch_size = batch.len(),
                        messages = ids.len(),
                        "Fetched message batch"
                    );
                    for id in ids {
                        output.send(id);
                    }
                }
                Err(e) => {
                    warn!(batch_size = batch.len(), error = %e, "Message batch lookup failed");
                    output.record_failure();
                }
            }
        });
    }
}

#[async_trait]
impl Stage for FetchMessages {
    type Input = UserRecord;
    type Output = MessageId;

    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn run(&self, mut input: Inbound<UserRecord>, output: Outbound<MessageId>) {
        let mut fetches = TaskGroup::new(Self::NAME);
        let mut batch = Vec::with_capacity(self.batch_size);

        while let Some(user) = input.recv().await {
            batch.push(user);
            if batch.len() < self.batch_size {
                continue;
            }
            let full = std::mem::replace(&mut batch, Vec::with_capacity(self.batch_size));
            self.spawn_fetch(&mut fetches, full, &output);
        }

        if !batch.is_empty() {
            self.spawn_fetch(&mut fetches, batch, &output);
        }

        let spawned = fetches.spawned();
        let panicked = fetches.join_all().await;
        output.record_failures(panicked);
        debug!(batches = spawned, "Message fetches finished");
    }
}
