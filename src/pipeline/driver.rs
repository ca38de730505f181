//! Pipeline driver — wires stages together with typed handoff queues.
//!
//! ```text
//! input ──▶ [stage 1] ──▶ [stage 2] ──▶ … ──▶ [stage N] ──▶ output
//! ```
//!
//! Every stage runs as its own task. A stage closes its output by returning
//! from [`Stage::run`]; the next stage sees that as end of input, finishes,
//! and closes its own output, until the chain terminates.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt};
use serde::Serialize;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info, info_span};
use uuid::Uuid;

use crate::pipeline::stage::{Inbound, Outbound, Stage, StageProbe, StageReport, StageState};

/// A stage task launched by the driver.
struct RunningStage {
    name: &'static str,
    probe: Arc<StageProbe>,
    handle: JoinHandle<()>,
}

/// A pipeline under construction whose current tail yields `T`.
///
/// Stages are spawned as soon as they are added, so building must happen
/// inside a Tokio runtime.
pub struct Pipeline<T> {
    run_id: Uuid,
    started_at: DateTime<Utc>,
    tail: UnboundedReceiver<T>,
    stages: Vec<RunningStage>,
}

impl<T: Send + 'static> Pipeline<T> {
    /// Start from a queue the caller keeps feeding. Input ends when every
    /// sender is dropped.
    pub fn from_receiver(rx: UnboundedReceiver<T>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            tail: rx,
            stages: Vec::new(),
        }
    }

    /// Start from a finite set of items. The input queue is closed up front.
    pub fn from_items<I>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        for item in items {
            // Receiver is held right here; cannot fail.
            let _ = tx.send(item);
        }
        Self::from_receiver(rx)
    }

    /// Start from a lazy stream, forwarded into the input queue by a feeder task.
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: Stream<Item = T> + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            let mut stream = std::pin::pin!(stream);
            while let Some(item) = stream.next().await {
                if tx.send(item).is_err() {
                    break;
                }
            }
        });
        Self::from_receiver(rx)
    }

    /// Identifier of this run, as it appears in log spans.
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Append a stage consuming this pipeline's output and launch it.
    pub fn then<S>(mut self, stage: S) -> Pipeline<S::Output>
    where
        S: Stage<Input = T>,
    {
        let name = stage.name();
        let (tx, rx) = mpsc::unbounded_channel();
        let probe = Arc::new(StageProbe::default());
        let input = Inbound::new(self.tail, Arc::clone(&probe));
        let output = Outbound::new(tx, Arc::clone(&probe));

        let span = info_span!("stage", run_id = %self.run_id, stage = name);
        let task_probe = Arc::clone(&probe);
        let handle = tokio::spawn(
            async move {
                debug!("Stage running");
                stage.run(input, output).await;
                task_probe.advance(StageState::Closed);
                debug!("Stage closed");
            }
            .instrument(span),
        );

        self.stages.push(RunningStage {
            name,
            probe,
            handle,
        });

        Pipeline {
            run_id: self.run_id,
            started_at: self.started_at,
            tail: rx,
            stages: self.stages,
        }
    }

    /// Drain the final queue and wait for every stage to finish.
    pub async fn run(self) -> (Vec<T>, RunSummary) {
        let Self {
            run_id,
            started_at,
            mut tail,
            stages,
        } = self;

        let mut output = Vec::new();
        while let Some(item) = tail.recv().await {
            output.push(item);
        }

        let mut reports = Vec::with_capacity(stages.len());
        for stage in stages {
            if let Err(e) = stage.handle.await {
                error!(run_id = %run_id, stage = stage.name, error = %e, "Stage task failed");
            }
            reports.push(stage.probe.report(stage.name));
        }

        let summary = RunSummary {
            run_id,
            started_at,
            finished_at: Utc::now(),
            stages: reports,
        };

        info!(
            run_id = %run_id,
            stages = summary.stages.len(),
            outputs = output.len(),
            failures = summary.total_failures(),
            "Pipeline run complete"
        );

        (output, summary)
    }
}

/// Accounting for one completed run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// One report per stage, in pipeline order.
    pub stages: Vec<StageReport>,
}

impl RunSummary {
    /// Report for the stage called `name`, if any.
    pub fn stage(&self, name: &str) -> Option<&StageReport> {
        self.stages.iter().find(|s| s.name == name)
    }

    /// Failures across all stages.
    pub fn total_failures(&self) -> usize {
        self.stages.iter().map(|s| s.failures).sum()
    }

    /// True when every stage reached [`StageState::Closed`].
    pub fn all_closed(&self) -> bool {
        self.stages.iter().all(|s| s.state == StageState::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::stage::stage_fn;
    use crate::pipeline::task_group::TaskGroup;
    use std::time::Duration;

    fn doubler() -> impl Stage<Input = u32, Output = u32> {
        stage_fn(
            "double",
            |mut input: Inbound<u32>, output: Outbound<u32>| async move {
                while let Some(n) = input.recv().await {
                    output.send(n * 2);
                }
            },
        )
    }

    #[tokio::test]
    async fn empty_pipeline_passes_input_through() {
        let (out, summary) = Pipeline::from_items(vec![1, 2, 3]).run().await;
        assert_eq!(out, vec![1, 2, 3]);
        assert!(summary.stages.is_empty());
    }

    #[tokio::test]
    async fn stages_chain_in_order() {
        let to_string = stage_fn(
            "fmt",
            |mut input: Inbound<u32>, output: Outbound<String>| async move {
                while let Some(n) = input.recv().await {
                    output.send(format!("#{n}"));
                }
            },
        );

        let (out, summary) = Pipeline::from_items(vec![1u32, 2, 3])
            .then(doubler())
            .then(to_string)
            .run()
            .await;

        assert_eq!(out, vec!["#2", "#4", "#6"]);
        assert_eq!(summary.stages.len(), 2);
        assert_eq!(summary.stages[0].name, "double");
        assert_eq!(summary.stages[0].received, 3);
        assert_eq!(summary.stages[1].emitted, 3);
        assert!(summary.all_closed());
    }

    #[tokio::test]
    async fn source_stage_ignores_empty_input() {
        let source = stage_fn(
            "source",
            |_input: Inbound<()>, output: Outbound<u32>| async move {
                for n in 0..5 {
                    output.send(n);
                }
            },
        );

        let (out, _) = Pipeline::from_items(Vec::<()>::new())
            .then(source)
            .then(doubler())
            .run()
            .await;
        assert_eq!(out, vec![0, 2, 4, 6, 8]);
    }

    #[tokio::test]
    async fn output_waits_for_joined_children() {
        let slow_fanout = stage_fn(
            "fanout",
            |mut input: Inbound<u64>, output: Outbound<u64>| async move {
                let mut group = TaskGroup::new("fanout");
                while let Some(n) = input.recv().await {
                    let output = output.clone();
                    group.spawn(async move {
                        tokio::time::sleep(Duration::from_millis(20 - n * 5)).await;
                        output.send(n);
                    });
                }
                group.join_all().await;
            },
        );

        let (mut out, summary) = Pipeline::from_items(vec![0u64, 1, 2, 3])
            .then(slow_fanout)
            .run()
            .await;
        out.sort();
        assert_eq!(out, vec![0, 1, 2, 3]);
        assert_eq!(summary.stage("fanout").map(|s| s.emitted), Some(4));
    }

    #[tokio::test]
    async fn panicking_stage_still_terminates_run() {
        let explode = stage_fn(
            "explode",
            |mut input: Inbound<u32>, _output: Outbound<u32>| async move {
                if input.recv().await.is_some() {
                    panic!("stage blew up");
                }
            },
        );

        let (out, summary) = Pipeline::from_items(vec![1u32])
            .then(explode)
            .then(doubler())
            .run()
            .await;

        assert!(out.is_empty());
        assert_ne!(summary.stages[0].state, StageState::Closed);
        assert_eq!(summary.stages[1].state, StageState::Closed);
    }

    #[tokio::test]
    async fn streaming_input_from_receiver() {
        let (tx, rx) = mpsc::unbounded_channel();
        let pipeline = Pipeline::from_receiver(rx).then(doubler());

        tokio::spawn(async move {
            for n in 1..=3u32 {
                tx.send(n).unwrap();
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        });

        let (out, _) = pipeline.run().await;
        assert_eq!(out, vec![2, 4, 6]);
    }

    #[tokio::test]
    async fn stream_input() {
        let (out, summary) = Pipeline::from_stream(tokio_stream::iter(vec![5u32, 6]))
            .then(doubler())
            .run()
            .await;
        assert_eq!(out, vec![10, 12]);
        assert_eq!(summary.total_failures(), 0);
    }
}
