use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use research::security::{mask_secret, SecretString};
use research::{
    FileStore, OpenAiToolModel, RateLimitedFetcher, ReaderFetcher, ResearchConfig,
    ResearchOutcome, ResearchPipeline, TavilyWebSearcher, ValidatedFetcher,
};

/// Evidence-grounded web research from the command line
#[derive(Debug, Parser)]
#[command(name = "research", version)]
struct Cli {
    /// Project storage directory (defaults to RESEARCH_STORAGE_DIR, then .research)
    #[arg(long, global = true)]
    storage: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Research a query and print its references
    Run {
        query: String,

        /// Print the whole outcome as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print a persisted reference
    Resolve { uri: String },

    /// Read prose from stdin and link its citation markers
    Link {
        #[arg(long)]
        search_id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,research=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_line_number(true)
                .with_writer(std::io::stderr),
        )
        .init();

    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = ResearchConfig::from_env().context("Failed to load research config")?;

    let storage = cli
        .storage
        .or_else(|| std::env::var("RESEARCH_STORAGE_DIR").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(".research"));
    let store = FileStore::open(&storage)
        .await
        .with_context(|| format!("Failed to open storage at {}", storage.display()))?;

    let pipeline = build_pipeline(Arc::new(store), config)?;

    match cli.command {
        Command::Run { query, json } => run(&pipeline, &query, json).await,
        Command::Resolve { uri } => {
            let reference = pipeline
                .resolve_reference(&uri)
                .await
                .context("Failed to resolve reference")?;
            println!("{}", serde_json::to_string_pretty(&reference)?);
            Ok(())
        }
        Command::Link { search_id } => {
            let session = pipeline
                .load_session(&search_id)
                .await
                .context("Failed to load search session")?
                .with_context(|| format!("No search session {}", search_id))?;

            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .context("Failed to read stdin")?;
            print!("{}", pipeline.link_citations(&text, &session.references));
            Ok(())
        }
    }
}

fn build_pipeline(store: Arc<FileStore>, config: ResearchConfig) -> Result<ResearchPipeline> {
    let tavily_key =
        SecretString::new(std::env::var("TAVILY_API_KEY").context("TAVILY_API_KEY not set")?);
    tracing::debug!(api_key = %mask_secret(&tavily_key), "Using Tavily search");
    let searcher = TavilyWebSearcher::new(tavily_key);

    let mut reader = ReaderFetcher::new();
    if let Ok(endpoint) = std::env::var("READER_ENDPOINT") {
        reader = reader.with_endpoint(endpoint);
    }
    if let Ok(key) = std::env::var("READER_API_KEY") {
        let key = SecretString::new(key);
        tracing::debug!(api_key = %mask_secret(&key), "Using reader API key");
        reader = reader.with_api_key(key);
    }
    let fetcher = ValidatedFetcher::new(RateLimitedFetcher::new(reader, 2));

    let model = OpenAiToolModel::from_env().context("Failed to configure OpenAI model")?;
    tracing::info!(model = %model.model(), storage = %store.root().display(), "Research CLI ready");

    Ok(
        ResearchPipeline::new(store, Arc::new(searcher), Arc::new(fetcher), Arc::new(model))
            .with_config(config),
    )
}

async fn run(pipeline: &ResearchPipeline, query: &str, json: bool) -> Result<()> {
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("received shutdown signal");
        on_signal.cancel();
    });

    let outcome = pipeline
        .run(query, &cancel)
        .await
        .context("Research run failed")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome_json(&outcome))?);
    } else {
        print_outcome(&outcome);
    }

    if outcome.fatal {
        bail!("every search or extract call failed");
    }
    Ok(())
}

fn outcome_json(outcome: &ResearchOutcome) -> serde_json::Value {
    serde_json::json!({
        "query": outcome.query,
        "searchId": outcome.search_id,
        "projectId": outcome.project_id,
        "fatal": outcome.fatal,
        "sources": outcome.sources,
        "references": outcome.references,
        "errors": outcome.errors,
        "events": outcome.events,
    })
}

fn print_outcome(outcome: &ResearchOutcome) {
    println!("Search {} ({} sources)", outcome.search_id, outcome.sources.len());
    println!();

    for reference in &outcome.references {
        println!(
            "[{}] {} (lines {}-{})",
            reference.ref_id, reference.url, reference.start_line, reference.end_line
        );
        println!("    {}", reference.viewpoint);
        println!("    {}", reference.uri);
    }

    if !outcome.errors.is_empty() {
        println!();
        println!("Errors:");
        for error in &outcome.errors {
            println!("  - {}", error);
        }
    }

    println!();
    println!("{} events recorded", outcome.events.len());
}
