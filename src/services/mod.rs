//! In-process service implementations for demos and tests.
//!
//! The real user directory, message store and classifier are remote
//! systems; these stand-ins implement the same contracts with call
//! accounting and optional simulated latency.

pub mod fixture;
pub mod memory;
pub mod stats;

pub use fixture::{Fixture, FixtureUser};
pub use memory::InMemoryDirectory;
pub use stats::CallStats;
