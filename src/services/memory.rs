//! In-memory stand-in for the user, message and classifier services.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use regex::Regex;
use tracing::debug;

use crate::error::{ClassifyError, LookupError};
use crate::pipeline::types::{
    MessageId, MessageStore, SpamClassifier, UserDirectory, UserId, UserRecord,
};
use crate::services::stats::CallStats;

/// Loose address shape: something, one `@`, something. No whitespace.
static EMAIL_SHAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+$").expect("email regex is valid"));

/// Normalize an address for lookup.
fn canonical(email: &str) -> String {
    email.trim().to_lowercase()
}

/// In-process implementation of all three service contracts.
///
/// Addresses are matched case-insensitively. Aliases resolve to the same
/// user record as the canonical address.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    users: HashMap<String, UserRecord>,
    messages: HashMap<UserId, Vec<MessageId>>,
    spam: HashSet<MessageId>,
    failing_messages: HashSet<MessageId>,
    failing_users: HashSet<UserId>,
    max_batch: Option<usize>,
    latency: Option<Duration>,
    stats: CallStats,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a user with its canonical address and owned messages.
    pub fn with_user(mut self, id: u64, email: &str, messages: &[u64]) -> Self {
        let record = UserRecord {
            id: UserId(id),
            email: canonical(email),
        };
        self.users.insert(record.email.clone(), record);
        self.messages
            .entry(UserId(id))
            .or_default()
            .extend(messages.iter().copied().map(MessageId));
        self
    }

    /// Make `alias` resolve to the already registered user `id`.
    pub fn with_alias(mut self, alias: &str, id: u64) -> Self {
        if let Some(record) = self.users.values().find(|u| u.id == UserId(id)).cloned() {
            self.users.insert(canonical(alias), record);
        }
        self
    }

    /// Mark messages as spam. Every other known message is ham.
    pub fn with_spam(mut self, ids: &[u64]) -> Self {
        self.spam.extend(ids.iter().copied().map(MessageId));
        self
    }

    /// Classifier calls for these messages fail.
    pub fn with_failing_messages(mut self, ids: &[u64]) -> Self {
        self.failing_messages
            .extend(ids.iter().copied().map(MessageId));
        self
    }

    /// Bulk lookups that include any of these users fail.
    pub fn with_failing_users(mut self, ids: &[u64]) -> Self {
        self.failing_users.extend(ids.iter().copied().map(UserId));
        self
    }

    /// Reject bulk lookups larger than `max` users.
    pub fn with_max_batch(mut self, max: usize) -> Self {
        self.max_batch = Some(max);
        self
    }

    /// Delay every call by `latency` plus up to half of it again.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn stats(&self) -> &CallStats {
        &self.stats
    }

    fn is_known_message(&self, id: MessageId) -> bool {
        self.messages.values().any(|ids| ids.contains(&id))
    }

    async fn simulate_latency(&self) {
        if let Some(base) = self.latency {
            let delay = jittered(base);
            tokio::time::sleep(delay).await;
        }
    }
}

/// `base` plus a random extra of up to half of `base`.
fn jittered(base: Duration) -> Duration {
    let max_extra = (base.as_millis() / 2) as u64;
    if max_extra == 0 {
        return base;
    }
    let extra = rand::thread_rng().gen_range(0..=max_extra);
    base + Duration::from_millis(extra)
}

#[async_trait]
impl UserDirectory for InMemoryDirectory {
    async fn lookup_user(&self, email: &str) -> Result<UserRecord, LookupError> {
        self.stats.record_user_lookup();
        self.simulate_latency().await;

        if !EMAIL_SHAPE.is_match(email.trim()) {
            return Err(LookupError::MalformedEmail(email.to_string()));
        }
        self.users
            .get(&canonical(email))
            .cloned()
            .ok_or_else(|| LookupError::UnknownUser(email.to_string()))
    }
}

#[async_trait]
impl MessageStore for InMemoryDirectory {
    async fn lookup_messages(&self, users: &[UserRecord]) -> Result<Vec<MessageId>, LookupError> {
        self.stats.record_batch(users.iter().map(|u| u.id.0));
        self.simulate_latency().await;

        if let Some(max) = self.max_batch
            && users.len() > max
        {
            return Err(LookupError::BatchTooLarge {
                size: users.len(),
                max,
            });
        }
        if let Some(user) = users.iter().find(|u| self.failing_users.contains(&u.id)) {
            let reason = format!("message store rejected user {}", user.id);
            return Err(LookupError::Unavailable(reason));
        }

        let ids: Vec<MessageId> = users
            .iter()
            .filter_map(|u| self.messages.get(&u.id))
            .flatten()
            .copied()
            .collect();
        debug!(
            users = users.len(),
            messages = ids.len(),
            "Served message batch"
        );
        Ok(ids)
    }
}

#[async_trait]
impl SpamClassifier for InMemoryDirectory {
    async fn classify(&self, id: MessageId) -> Result<bool, ClassifyError> {
        let _in_flight = self.stats.start_classify();
        self.simulate_latency().await;

        if self.failing_messages.contains(&id) {
            return Err(ClassifyError::Unavailable(format!("classifier rejected {id}")));
        }
        if !self.is_known_message(id) {
            return Err(ClassifyError::UnknownMessage(id));
        }
        Ok(self.spam.contains(&id))
    }
}
