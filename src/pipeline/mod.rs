//! Concurrent staged pipeline for bulk spam detection.
//!
//! Emails flow through four stages connected by unbounded typed queues:
//! 1. `SelectUsers`: one lookup task per email, each user emitted once
//! 2. `FetchMessages`: users grouped into fixed-size batches, one bulk lookup per batch
//! 3. `CheckSpam`: one classifier call per message, capped by a semaphore
//! 4. `CombineResults`: barrier; sorts all verdicts and writes the report
//!
//! Per-item failures are logged and counted, never propagated: a run always
//! completes, possibly with fewer lines than messages.

pub mod claim;
pub mod driver;
pub mod spam;
pub mod stage;
pub mod stages;
pub mod task_group;
pub mod types;

pub use claim::ClaimRegistry;
pub use driver::{Pipeline, RunSummary};
pub use spam::{SpamReport, SpamServices, run_spam_check, spam_pipeline};
pub use stage::{FnStage, Inbound, Outbound, Stage, StageReport, StageState, stage_fn};
pub use task_group::TaskGroup;
pub use types::{
    Email, MessageId, MessageStore, ReportLine, SpamClassifier, UserDirectory, UserId, UserRecord,
    Verdict,
};
