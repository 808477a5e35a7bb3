use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use paperfeed_adapters::build_adapters;
use paperfeed_pipeline::{
    build_scheduler, load_registry, NoEnrichment, Orchestrator, PipelineConfig, ScoringConfig,
    SemanticScholarClient,
};
use paperfeed_storage::{FileKv, HttpClientConfig, HttpFetcher, KvStore};
use paperfeed_web::AppState;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "paperfeed")]
#[command(about = "Scholarly paper discovery worker")]
struct Cli {
    /// Worker profile from the source registry (main, newsletters, labs).
    #[arg(long)]
    profile: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run one discovery cycle and exit.
    Run,
    /// Serve the HTTP API.
    Serve {
        #[arg(long, default_value = "0.0.0.0:8787")]
        addr: String,
    },
    /// Run on the profile's cron schedule until interrupted.
    Schedule,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = PipelineConfig::from_env();
    if let Some(profile) = cli.profile {
        config.profile = profile;
    }

    let (orchestrator, cron) = build_orchestrator(&config)?;
    let orchestrator = Arc::new(orchestrator);

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            let summary = orchestrator.run_once().await?;
            println!(
                "run complete: run_id={} fetched={} fresh={} papers_stored={} latest_total={}",
                summary.run_id,
                summary.fetched,
                summary.fresh,
                summary.papers_stored,
                summary.latest_total
            );
        }
        Commands::Serve { addr } => {
            let state = AppState::new(orchestrator.store(), orchestrator.clone());
            paperfeed_web::serve(&addr, state).await?;
        }
        Commands::Schedule => {
            info!(profile = %config.profile, cron = %cron, "starting scheduler");
            let _sched = build_scheduler(orchestrator, &cron).await?;
            tokio::signal::ctrl_c()
                .await
                .context("waiting for shutdown signal")?;
            info!("shutdown signal received");
        }
    }

    Ok(())
}

fn build_orchestrator(config: &PipelineConfig) -> Result<(Orchestrator, String)> {
    let scoring = ScoringConfig::load(config.interests_path.as_deref())?;
    let registry = load_registry(config.sources_path.as_deref())?;
    let Some(profile) = registry.profile(&config.profile) else {
        bail!("unknown worker profile {}", config.profile);
    };
    let adapters = build_adapters(&registry, profile, config.fetch_delay);
    if adapters.is_empty() {
        bail!("profile {} names no known sources", config.profile);
    }

    let store: Arc<dyn KvStore> = Arc::new(FileKv::new(&config.data_dir));
    let http = Arc::new(
        HttpFetcher::new(HttpClientConfig::default()).context("building http client")?,
    );
    let enricher: Arc<dyn paperfeed_pipeline::CitationProvider> = if config.enrich_enabled {
        Arc::new(
            SemanticScholarClient::new(
                config.semantic_scholar_api_key.clone(),
                std::time::Duration::from_secs(20),
            )
            .context("building citation client")?,
        )
    } else {
        Arc::new(NoEnrichment)
    };

    let orchestrator = Orchestrator::new(
        store,
        http,
        adapters,
        &scoring,
        enricher,
        config.lookback_days,
        config.fetch_delay,
    );
    Ok((orchestrator, profile.cron.clone()))
}
