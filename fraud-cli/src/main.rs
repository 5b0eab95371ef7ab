//! Award Fraud Research CLI
//!
//! Researches a federal award on the web and prints the resulting report as
//! JSON. Reports are cached in the configured result store.

use std::{path::PathBuf, sync::Arc};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use fraud_core::AwardMetadata;
use fraud_research::{
    AwardSearchContext, ExaClient, FirecrawlClient, MemoryResultStore, OpenAIClient,
    ReportCache, ResearchConfig, ResearchOrchestrator, ResearchUpdate, ResultStore,
    S3ResultStore, SearchProvider,
};
use fraud_services::{
    RateLimitedSearch, RateLimiter, ResearchService, ResearchStatus, SqliteResultStore,
};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Iterative fraud research for federal awards
#[derive(Parser)]
#[command(name = "fraud-research")]
#[command(version)]
struct Cli {
    /// Where research reports are cached
    #[arg(long, value_enum, default_value_t = StoreKind::Sqlite, global = true)]
    store: StoreKind,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Research an award, or print its cached report
    Run {
        award_id: String,

        /// Award metadata as JSON (details plus transactions)
        #[arg(long)]
        metadata: Option<PathBuf>,
    },
    /// Exit successfully only if a completed report is cached
    Cached { award_id: String },
    /// Print whatever is stored for an award, including unfinished checkpoints
    Show { award_id: String },
}

#[derive(Clone, Copy, ValueEnum)]
enum StoreKind {
    Memory,
    Sqlite,
    S3,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env.local file
    if let Err(e) = dotenvy::from_filename(".env.local") {
        // Not an error if the file doesn't exist
        if !matches!(e, dotenvy::Error::Io(_)) {
            eprintln!("Warning: Failed to load .env.local: {}", e);
        }
    }

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,fraud_research=debug")),
        )
        .init();

    let cli = Cli::parse();
    let config = ResearchConfig::from_env()?;
    let store = build_store(cli.store).await?;

    match cli.command {
        Command::Run { award_id, metadata } => run(&award_id, metadata, store, config).await,
        Command::Cached { award_id } => {
            let reports = ReportCache::new(store, config.retry_policy());
            let cached = reports.is_cached(&award_id).await?;
            println!("{}", cached);
            if !cached {
                std::process::exit(1);
            }
            Ok(())
        }
        Command::Show { award_id } => {
            let reports = ReportCache::new(store, config.retry_policy());
            match reports.load(&award_id).await? {
                Some(context) => print_json(&context),
                None => bail!("Nothing stored for award {}", award_id),
            }
        }
    }
}

async fn run(
    award_id: &str,
    metadata_path: Option<PathBuf>,
    store: Arc<dyn ResultStore>,
    config: ResearchConfig,
) -> anyhow::Result<()> {
    let metadata = metadata_path.map(read_metadata).transpose()?;
    info!(
        "Researching award {} (max {} URLs, {}s budget)",
        award_id, config.max_urls, config.max_search_time_secs
    );

    let crawler = FirecrawlClient::from_env()?;
    let (search, limiter) = build_search(&crawler)?;
    let model = OpenAIClient::new()?.with_model(&config.model);

    let orchestrator =
        ResearchOrchestrator::new(search, Arc::new(crawler), Arc::new(model), store, config);
    let service = ResearchService::new(orchestrator);

    let mut updates = service.subscribe();
    tokio::spawn(async move {
        while let Ok(update) = updates.recv().await {
            if let ResearchUpdate::FindingRecorded {
                source, risk_level, ..
            } = update
            {
                info!("Finding (risk {}): {}", risk_level, source);
            }
        }
    });

    let job = tokio::select! {
        job = service.research(award_id, metadata) => job?,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted; findings recorded so far remain checkpointed in the store");
            std::process::exit(130);
        }
    };

    let stats = limiter.stats();
    info!(
        "{} search requests, {} paced by the {} limiter",
        stats.total_requests, stats.waited_requests, stats.name
    );

    match (job.status, job.report) {
        (ResearchStatus::Completed, Some(report)) => {
            if job.cached {
                info!("Served from cache");
            }
            print_json(&report)
        }
        _ => bail!(
            "Research failed: {}",
            job.error.unwrap_or_else(|| "unknown error".to_string())
        ),
    }
}

async fn build_store(kind: StoreKind) -> anyhow::Result<Arc<dyn ResultStore>> {
    let store: Arc<dyn ResultStore> = match kind {
        StoreKind::Memory => Arc::new(MemoryResultStore::new()),
        StoreKind::Sqlite => {
            let path = std::env::var("RESEARCH_DB_PATH")
                .unwrap_or_else(|_| "data/research.db".to_string());
            info!("Using SQLite result store at {}", path);
            Arc::new(SqliteResultStore::new(&path)?)
        }
        StoreKind::S3 => Arc::new(S3ResultStore::new().await?),
    };
    Ok(store)
}

/// Search backend chosen by SEARCH_PROVIDER (firecrawl or exa), rate limited
fn build_search(
    firecrawl: &FirecrawlClient,
) -> anyhow::Result<(Arc<dyn SearchProvider>, Arc<RateLimiter>)> {
    let provider = std::env::var("SEARCH_PROVIDER").unwrap_or_else(|_| "firecrawl".to_string());
    let (search, limiter): (Arc<dyn SearchProvider>, Arc<RateLimiter>) =
        match provider.to_lowercase().as_str() {
            "firecrawl" => {
                let limiter = RateLimiter::for_firecrawl();
                let search = RateLimitedSearch::new(firecrawl.clone(), limiter.clone());
                (Arc::new(search), limiter)
            }
            "exa" => {
                let limiter = RateLimiter::for_exa();
                let search = RateLimitedSearch::new(ExaClient::new()?, limiter.clone());
                (Arc::new(search), limiter)
            }
            other => bail!("Unknown SEARCH_PROVIDER {:?} (expected firecrawl or exa)", other),
        };
    Ok((search, limiter))
}

fn read_metadata(path: PathBuf) -> anyhow::Result<AwardMetadata> {
    let raw = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid award metadata in {}", path.display()))
}

fn print_json(context: &AwardSearchContext) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(context)?);
    Ok(())
}
