//! Stage abstraction: typed queue ends, lifecycle state, per-stage counters.

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tracing::{debug, warn};

// ── Stage trait ─────────────────────────────────────────────────────

/// One pipeline phase with a single typed input and a single typed output.
///
/// `run` must not return before every item it will ever emit has been sent:
/// children holding an [`Outbound`] clone are joined first. The output queue
/// closes once `run` has returned and every clone is dropped.
#[async_trait]
pub trait Stage: Send + Sync + 'static {
    type Input: Send + 'static;
    type Output: Send + 'static;

    /// Name used in logs and in the run summary.
    fn name(&self) -> &'static str;

    async fn run(&self, input: Inbound<Self::Input>, output: Outbound<Self::Output>);
}

/// Adapter turning a plain async function into a [`Stage`].
pub struct FnStage<I, O, F> {
    name: &'static str,
    func: F,
    _types: PhantomData<fn(I) -> O>,
}

/// Wrap `func` as a stage named `name`.
pub fn stage_fn<I, O, F, Fut>(name: &'static str, func: F) -> FnStage<I, O, F>
where
    F: Fn(Inbound<I>, Outbound<O>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    FnStage {
        name,
        func,
        _types: PhantomData,
    }
}

#[async_trait]
impl<I, O, F, Fut> Stage for FnStage<I, O, F>
where
    I: Send + 'static,
    O: Send + 'static,
    F: Fn(Inbound<I>, Outbound<O>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    type Input = I;
    type Output = O;

    fn name(&self) -> &'static str {
        self.name
    }

    async fn run(&self, input: Inbound<I>, output: Outbound<O>) {
        (self.func)(input, output).await
    }
}

// ── Lifecycle ───────────────────────────────────────────────────────

/// Lifecycle of one stage instance within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageState {
    /// Input still open.
    Running,
    /// Input closed, children may still be finishing.
    Draining,
    /// `run` returned; the stage will never emit again.
    Closed,
}

impl StageState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Running,
            1 => Self::Draining,
            _ => Self::Closed,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::Running => 0,
            Self::Draining => 1,
            Self::Closed => 2,
        }
    }
}

/// Counters and state shared by a stage's queue ends and the driver.
#[derive(Debug, Default)]
pub(crate) struct StageProbe {
    received: AtomicUsize,
    emitted: AtomicUsize,
    failures: AtomicUsize,
    state: AtomicU8,
}

impl StageProbe {
    pub(crate) fn state(&self) -> StageState {
        StageState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Move forward to `next`. Transitions never go backwards.
    pub(crate) fn advance(&self, next: StageState) {
        self.state.fetch_max(next.as_u8(), Ordering::AcqRel);
    }

    pub(crate) fn report(&self, name: &'static str) -> StageReport {
        StageReport {
            name,
            received: self.received.load(Ordering::Relaxed),
            emitted: self.emitted.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            state: self.state(),
        }
    }
}

/// Final accounting for one stage of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageReport {
    pub name: &'static str,
    /// Items taken off the input queue.
    pub received: usize,
    /// Items delivered to the output queue.
    pub emitted: usize,
    /// Per-item or per-batch failures that were logged and dropped.
    pub failures: usize,
    pub state: StageState,
}

// ── Queue ends ──────────────────────────────────────────────────────

/// Receiving end of a stage's input queue.
pub struct Inbound<T> {
    rx: UnboundedReceiver<T>,
    probe: Arc<StageProbe>,
}

impl<T> Inbound<T> {
    pub(crate) fn new(rx: UnboundedReceiver<T>, probe: Arc<StageProbe>) -> Self {
        Self { rx, probe }
    }

    /// Next input item, or `None` once upstream has closed the queue.
    pub async fn recv(&mut self) -> Option<T> {
        match self.rx.recv().await {
            Some(item) => {
                self.probe.received.fetch_add(1, Ordering::Relaxed);
                Some(item)
            }
            None => {
                if self.probe.state() == StageState::Running {
                    debug!("Input closed, draining");
                }
                self.probe.advance(StageState::Draining);
                None
            }
        }
    }
}

/// Sending end of a stage's output queue. Clone it into child tasks.
pub struct Outbound<T> {
    tx: UnboundedSender<T>,
    probe: Arc<StageProbe>,
}

impl<T> Clone for Outbound<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            probe: Arc::clone(&self.probe),
        }
    }
}

impl<T> Outbound<T> {
    pub(crate) fn new(tx: UnboundedSender<T>, probe: Arc<StageProbe>) -> Self {
        Self { tx, probe }
    }

    /// Hand an item downstream. Never blocks.
    ///
    /// If the downstream stage is gone the item is dropped and logged.
    pub fn send(&self, item: T) {
        if self.tx.send(item).is_err() {
            warn!("Downstream queue closed, dropping item");
            return;
        }
        self.probe.emitted.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one dropped item or batch against this stage.
    pub fn record_failure(&self) {
        self.record_failures(1);
    }

    pub fn record_failures(&self, count: usize) {
        if count > 0 {
            self.probe.failures.fetch_add(count, Ordering::Relaxed);
        }
    }
}
