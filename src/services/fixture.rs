//! JSON fixtures describing an in-memory service world.
//!
//! ```json
//! {
//!   "users": [
//!     { "id": 1, "email": "a@x", "aliases": ["alias@x"], "messages": [10, 11] }
//!   ],
//!   "spam": [11],
//!   "failing_messages": [],
//!   "max_batch": 2,
//!   "latency_ms": 5
//! }
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::services::memory::InMemoryDirectory;

/// One user entry in a fixture.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureUser {
    pub id: u64,
    pub email: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub messages: Vec<u64>,
}

/// Serializable description of an [`InMemoryDirectory`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Fixture {
    #[serde(default)]
    pub users: Vec<FixtureUser>,
    #[serde(default)]
    pub spam: Vec<u64>,
    #[serde(default)]
    pub failing_messages: Vec<u64>,
    #[serde(default)]
    pub failing_users: Vec<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_batch: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
}

impl Fixture {
    /// Read and parse a fixture file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(raw).map_err(|e| ConfigError::Fixture(e.to_string()))
    }

    /// Build the directory this fixture describes.
    pub fn into_directory(self) -> InMemoryDirectory {
        let mut dir = InMemoryDirectory::new();
        for user in &self.users {
            dir = dir.with_user(user.id, &user.email, &user.messages);
        }
        for user in &self.users {
            for alias in &user.aliases {
                dir = dir.with_alias(alias, user.id);
            }
        }
        dir = dir
            .with_spam(&self.spam)
            .with_failing_messages(&self.failing_messages)
            .with_failing_users(&self.failing_users);
        if let Some(max) = self.max_batch {
            dir = dir.with_max_batch(max);
        }
        if let Some(ms) = self.latency_ms {
            dir = dir.with_latency(Duration::from_millis(ms));
        }
        dir
    }
}
