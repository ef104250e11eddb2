//! pipeline-worker — claims runnable jobs and drives them to a terminal
//! state.
//!
//! The polling loop is the "durable external task scheduler" of the
//! design: jobs are claimed from the ledger (`FOR UPDATE SKIP LOCKED`
//! under Postgres), executed step by step with checkpoints, and resumed
//! from the first unfinished step when a previous run was interrupted.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};

use aufnahme_core::config::{load_dotenv, Config};
use aufnahme_ingest::embedding::build_embedder;
use aufnahme_ingest::sourcehost::GithubHost;
use aufnahme_ingest::transcription::HttpTranscriptionService;
use aufnahme_llm::{build_provider, ApiRateLimiter, Summarizer};
use aufnahme_pipeline::Orchestrator;
use aufnahme_store::{connect, JobStore, PgLedger};

/// Pipeline worker — repository ingestion and meeting transcription.
#[derive(Parser, Debug)]
#[command(name = "pipeline-worker", version, about)]
struct Cli {
    /// Seconds to sleep between claim attempts when the queue is empty.
    #[arg(long, env = "WORKER_POLL_INTERVAL_SECS", default_value_t = 5)]
    poll_interval: u64,

    /// Seconds after which a non-terminal, untouched job counts as
    /// interrupted and is resumed.
    #[arg(long, env = "WORKER_STALE_AFTER_SECS", default_value_t = 300)]
    stale_after: u64,

    /// Drain the queue once and exit instead of polling forever.
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    load_dotenv();
    let config = Config::from_env();
    config.log_summary();

    let pool = connect(&config.postgres).await?;
    let ledger = Arc::new(PgLedger::new(pool));

    let limiter = Arc::new(ApiRateLimiter::new(config.pipeline.rate_limit_per_minute));
    let provider = build_provider(&config.llm)?;
    let summarizer = Arc::new(Summarizer::new(provider, limiter, &config.llm));
    let embedder = build_embedder(
        &config.embedding,
        config.llm.gemini_api_key.clone(),
        config.llm.ollama_url.clone(),
    )?;
    let host = Arc::new(GithubHost::new(
        config.source_host.api_base.clone(),
        config.source_host.token.clone(),
    ));
    let transcription = Arc::new(HttpTranscriptionService::new(
        config.transcription.api_base.clone(),
        config.transcription.api_key.clone().unwrap_or_default(),
    ));

    let orchestrator = Orchestrator::new(
        ledger.clone(),
        host,
        transcription,
        summarizer,
        embedder,
        config.pipeline.clone(),
        config.source_host.clone(),
        config.transcription.clone(),
    );

    let poll_interval = Duration::from_secs(cli.poll_interval);
    let stale_after = Duration::from_secs(cli.stale_after);

    info!("pipeline-worker started");
    loop {
        match ledger.claim_next_runnable(stale_after).await {
            Ok(Some(job)) => {
                // Errors are already recorded on the job; the loop goes on.
                if let Err(e) = orchestrator.execute(&job).await {
                    error!(job = %job.id, error = %e, "job execution failed");
                }
            }
            Ok(None) => {
                if cli.once {
                    break;
                }
                tokio::time::sleep(poll_interval).await;
            }
            Err(e) => {
                error!(error = %e, "claim failed");
                tokio::time::sleep(poll_interval).await;
            }
        }
    }
    info!("pipeline-worker exited cleanly");
    Ok(())
}
