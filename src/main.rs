use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;

use spam_sieve::config::PipelineConfig;
use spam_sieve::pipeline::{SpamServices, run_spam_check};
use spam_sieve::services::Fixture;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let fixture_path = std::env::var("SPAM_SIEVE_FIXTURE")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            eprintln!("Error: SPAM_SIEVE_FIXTURE not set");
            eprintln!("  export SPAM_SIEVE_FIXTURE=./fixture.json");
            std::process::exit(1);
        });

    let config = PipelineConfig::from_env();
    config.validate().context("invalid pipeline configuration")?;

    let fixture = Fixture::load(&fixture_path)
        .with_context(|| format!("failed to load fixture {}", fixture_path.display()))?;
    let services = SpamServices::from_backend(Arc::new(fixture.into_directory()));

    // Emails come from the command line, or one per line on stdin.
    let mut emails: Vec<String> = std::env::args().skip(1).collect();
    if emails.is_empty() {
        for line in std::io::stdin().lock().lines() {
            let line = line.context("failed to read stdin")?;
            let line = line.trim();
            if !line.is_empty() {
                emails.push(line.to_string());
            }
        }
    }

    eprintln!("🧹 Spam Sieve v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Fixture: {}", fixture_path.display());
    eprintln!(
        "   Batch size: {}, max in-flight checks: {}",
        config.batch_size, config.max_in_flight_classifications
    );
    eprintln!("   Emails: {}\n", emails.len());

    let report = run_spam_check(&config, &services, emails).await?;

    for line in &report.lines {
        println!("{line}");
    }

    for stage in &report.summary.stages {
        eprintln!(
            "   {:<16} in {:>5}  out {:>5}  failed {:>4}",
            stage.name, stage.received, stage.emitted, stage.failures
        );
    }
    let dropped = report.dropped();
    if dropped > 0 {
        eprintln!("   {dropped} item(s) dropped, see log for details");
    }

    Ok(())
}
