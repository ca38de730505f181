//! Shared types for the spam pipeline.

use std::cmp::Ordering;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{ClassifyError, LookupError};

/// Raw input identifier. May repeat, and several may resolve to one user.
pub type Email = String;

// ── Identifiers ─────────────────────────────────────────────────────

/// Identity of a user. Two records are the same user iff their ids match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque message identifier, unique per message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub u64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Records ─────────────────────────────────────────────────────────

/// A resolved user, as returned by the user directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: UserId,
    /// Canonical address of the user (not necessarily the email looked up).
    pub email: String,
}

/// Classifier outcome for exactly one message.
///
/// Ordering is the report order: spam before non-spam, then ascending id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub id: MessageId,
    pub is_spam: bool,
}

impl Ord for Verdict {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .is_spam
            .cmp(&self.is_spam)
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl PartialOrd for Verdict {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// One line of the final report: `"<true|false> <message id>"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReportLine(String);

impl ReportLine {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl From<&Verdict> for ReportLine {
    fn from(verdict: &Verdict) -> Self {
        Self(format!("{} {}", verdict.is_spam, verdict.id))
    }
}

impl fmt::Display for ReportLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl PartialEq<&str> for ReportLine {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

// ── Service contracts ───────────────────────────────────────────────

/// Resolves an email address to a user record.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Fails with [`LookupError`] for malformed or unknown emails.
    async fn lookup_user(&self, email: &str) -> Result<UserRecord, LookupError>;
}

/// Bulk message-id retrieval for a batch of users.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Returns the ids of every message owned by any user in `users`.
    ///
    /// `users` never holds more than the configured batch size.
    async fn lookup_messages(&self, users: &[UserRecord]) -> Result<Vec<MessageId>, LookupError>;
}

/// Per-message spam classifier.
#[async_trait]
pub trait SpamClassifier: Send + Sync {
    async fn classify(&self, id: MessageId) -> Result<bool, ClassifyError>;
}
