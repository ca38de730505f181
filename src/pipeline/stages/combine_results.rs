//! Stage 4: collect every verdict, sort, and format the report.

use async_trait::async_trait;
use tracing::debug;

use crate::pipeline::stage::{Inbound, Outbound, Stage};
use crate::pipeline::types::{ReportLine, Verdict};

/// Barrier stage: emits nothing until its input is closed, then emits one
/// line per verdict, spam first, ascending message id within each group.
#[derive(Debug, Default, Clone, Copy)]
pub struct CombineResults;

impl CombineResults {
    pub const NAME: &'static str = "combine_results";
}

#[async_trait]
impl Stage for CombineResults {
    type Input = Verdict;
    type Output = ReportLine;

    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn run(&self, mut input: Inbound<Verdict>, output: Outbound<ReportLine>) {
        let mut verdicts = Vec::new();
        while let Some(verdict) = input.recv().await {
            verdicts.push(verdict);
        }

        verdicts.sort();
        let spam = verdicts.iter().filter(|v| v.is_spam).count();
        debug!(total = verdicts.len(), spam, "Writing report");

        for verdict in &verdicts {
            output.send(ReportLine::from(verdict));
        }
    }
}
