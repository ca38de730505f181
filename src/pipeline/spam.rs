//! The assembled spam-check pipeline.

use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use crate::config::PipelineConfig;
use crate::error::Result;
use crate::pipeline::claim::ClaimRegistry;
use crate::pipeline::driver::{Pipeline, RunSummary};
use crate::pipeline::stages::{CheckSpam, CombineResults, FetchMessages, SelectUsers};
use crate::pipeline::types::{Email, MessageStore, ReportLine, SpamClassifier, UserDirectory};

/// The external collaborators one run talks to.
#[derive(Clone)]
pub struct SpamServices {
    pub directory: Arc<dyn UserDirectory>,
    pub messages: Arc<dyn MessageStore>,
    pub classifier: Arc<dyn SpamClassifier>,
}

impl SpamServices {
    pub fn new(
        directory: Arc<dyn UserDirectory>,
        messages: Arc<dyn MessageStore>,
        classifier: Arc<dyn SpamClassifier>,
    ) -> Self {
        Self {
            directory,
            messages,
            classifier,
        }
    }

    /// Use one backend that implements all three contracts.
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: UserDirectory + MessageStore + SpamClassifier + 'static,
    {
        Self {
            directory: backend.clone(),
            messages: backend.clone(),
            classifier: backend,
        }
    }
}

/// Output of a spam-check run.
#[derive(Debug, Clone, Serialize)]
pub struct SpamReport {
    /// One line per successfully classified message, in report order.
    pub lines: Vec<ReportLine>,
    pub summary: RunSummary,
}

impl SpamReport {
    /// Lookups, batches and checks that failed and were left out.
    pub fn dropped(&self) -> usize {
        self.summary.total_failures()
    }

    pub fn lines_as_str(&self) -> Vec<&str> {
        self.lines.iter().map(ReportLine::as_str).collect()
    }
}

/// Append the four spam-check stages to `source`.
///
/// Every call gets its own dedup registry, so users are deduplicated per run.
pub fn spam_pipeline(
    config: &PipelineConfig,
    services: &SpamServices,
    source: Pipeline<Email>,
) -> Result<Pipeline<ReportLine>> {
    config.validate()?;

    let claims = Arc::new(ClaimRegistry::new());
    Ok(source
        .then(SelectUsers::new(Arc::clone(&services.directory), claims))
        .then(FetchMessages::new(Arc::clone(&services.messages), config.batch_size))
        .then(CheckSpam::new(
            Arc::clone(&services.classifier),
            config.max_in_flight_classifications,
        ))
        .then(CombineResults))
}

/// Run the full spam check over `emails` and wait for the report.
pub async fn run_spam_check<I>(
    config: &PipelineConfig,
    services: &SpamServices,
    emails: I,
) -> Result<SpamReport>
where
    I: IntoIterator<Item = Email>,
{
    let pipeline = spam_pipeline(config, services, Pipeline::from_items(emails))?;
    let (lines, summary) = pipeline.run().await;

    let report = SpamReport { lines, summary };
    info!(
        run_id = %report.summary.run_id,
        lines = report.lines.len(),
        dropped = report.dropped(),
        "Spam check complete"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ConfigError, Error};
    use crate::services::InMemoryDirectory;

    fn backend() -> Arc<InMemoryDirectory> {
        Arc::new(
            InMemoryDirectory::new()
                .with_user(1, "a@x", &[10, 11])
                .with_user(2, "b@x", &[12])
                .with_spam(&[11]),
        )
    }

    #[tokio::test]
    async fn reports_every_message_in_order() {
        let services = SpamServices::from_backend(backend());
        let emails = ["a@x", "b@x", "a@x"].map(String::from);

        let report = run_spam_check(&PipelineConfig::default(), &services, emails)
            .await
            .unwrap();

        assert_eq!(
            report.lines_as_str(),
            vec!["true 11", "false 10", "false 12"]
        );
        assert_eq!(report.dropped(), 0);
        assert_eq!(report.summary.stages.len(), 4);
        assert!(report.summary.all_closed());
    }

    #[tokio::test]
    async fn invalid_config_is_rejected_up_front() {
        let backend = backend();
        let services = SpamServices::from_backend(Arc::clone(&backend));
        let config = PipelineConfig::default().with_batch_size(0);

        let err = run_spam_check(&config, &services, vec!["a@x".to_string()])
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Config(ConfigError::InvalidValue { .. })));
        assert_eq!(backend.stats().user_lookups(), 0);
    }

    #[tokio::test]
    async fn runs_do_not_share_dedup_state() {
        let services = SpamServices::from_backend(backend());
        let config = PipelineConfig::default();

        let first = run_spam_check(&config, &services, vec!["a@x".to_string()])
            .await
            .unwrap();
        let second = run_spam_check(&config, &services, vec!["a@x".to_string()])
            .await
            .unwrap();

        assert_eq!(first.lines, second.lines);
        assert_eq!(second.lines.len(), 2);
    }

    #[tokio::test]
    async fn report_serializes_with_summary() {
        let services = SpamServices::from_backend(backend());
        let report = run_spam_check(
            &PipelineConfig::default(),
            &services,
            vec!["b@x".to_string()],
        )
        .await
        .unwrap();

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["lines"], serde_json::json!(["false 12"]));
        assert_eq!(json["summary"]["stages"][0]["name"], "select_users");
        assert_eq!(json["summary"]["stages"][3]["state"], "closed");
    }
}
