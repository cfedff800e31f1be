//! metascrape - bibliographic metadata resolver
//!
//! Reads partial paper records as JSON, completes them from scholarly
//! sources and writes the resolved records to stdout. Logs and progress go
//! to stderr.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use metascrape::io::{read_drafts, write_drafts};
use metascrape::Resolver;
use metascrape_common::config::{resolve_config, ConfigOverrides, Preset};
use metascrape_common::events::ScrapeEvent;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for metascrape
#[derive(Parser, Debug)]
#[command(name = "metascrape")]
#[command(about = "Complete partial paper metadata from scholarly sources")]
#[command(version)]
struct Args {
    /// Config file (defaults to the per-user config when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// JSON file with the drafts to resolve, `-` for stdin
    #[arg(short, long, default_value = "-")]
    input: PathBuf,

    /// Output file, `-` for stdout
    #[arg(short, long, default_value = "-")]
    output: PathBuf,

    /// Comma-separated sources to enable, replacing preset and toggles
    #[arg(short, long, value_delimiter = ',')]
    sources: Option<Vec<String>>,

    /// Source preset (general, cs, es, phy)
    #[arg(short, long)]
    preset: Option<Preset>,

    /// Re-resolve drafts that are already complete
    #[arg(short, long)]
    force: bool,

    /// IEEE Xplore API key
    #[arg(long)]
    ieee_api_key: Option<String>,

    /// Drafts resolved concurrently
    #[arg(long)]
    concurrency: Option<usize>,

    /// Skip the remote aggregation service and only query sources directly
    #[arg(long)]
    no_aggregator: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = resolve_config(&ConfigOverrides {
        config_path: args.config.clone(),
        preset: args.preset,
        sources: args.sources.clone(),
        ieee_api_key: args.ieee_api_key.clone(),
        batch_concurrency: args.concurrency,
    })
    .context("Failed to resolve configuration")?;

    // Logs to stderr so stdout stays pure JSON
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.as_str().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let drafts = read_drafts(&args.input)
        .with_context(|| format!("Failed to read drafts from {}", args.input.display()))?;
    info!(
        drafts = drafts.len(),
        sources = %config.enabled_sources.join(","),
        "Starting metascrape {}",
        env!("CARGO_PKG_VERSION")
    );

    let mut resolver = Resolver::from_config(&config).context("Failed to initialize resolver")?;
    if args.no_aggregator {
        resolver = resolver.without_aggregator();
    }

    let mut events = resolver.events().subscribe();
    let progress = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(ScrapeEvent::DraftResolved { completed, total, .. }) => {
                    info!("Resolved {}/{}", completed, total);
                }
                Ok(ScrapeEvent::BatchCompleted { total, complete, .. }) => {
                    info!("{} of {} drafts complete", complete, total);
                    break;
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Progress events dropped"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let resolved = resolver
        .resolve(drafts, &config.enabled_sources, args.force)
        .await;
    if let Err(e) = progress.await {
        warn!(error = %e, "Progress reporter ended abnormally");
    }

    write_drafts(&args.output, &resolved)
        .with_context(|| format!("Failed to write drafts to {}", args.output.display()))?;
    Ok(())
}
