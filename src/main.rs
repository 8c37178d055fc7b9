//! research-index - DOI ingestion into the research knowledge graph
//!
//! ## Usage
//!
//! ```bash
//! research-index ingest dois.csv --initialise
//! research-index seed data/init
//! research-index validate dois.csv
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use research_index::config::Config;
use research_index::doi::{read_doi_list, DoiManager};
use research_index::fetcher::ApiFetcher;
use research_index::ingest::{IngestOptions, Ingestor};
use research_index::openaire::OpenAireClient;
use research_index::openalex::OpenAlexClient;
use research_index::resolver::IdentityResolver;
use research_index::seed::Seeder;
use research_index::store::{GraphStore, MemgraphStore, MemoryStore};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, Level};
use tracing_subscriber::{fmt, EnvFilter};

// ============================================================================
// CLI Definition
// ============================================================================

/// Populate the research knowledge graph from a list of DOIs
#[derive(Parser)]
#[command(name = "research-index")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch metadata for each DOI and write it to the graph
    Ingest {
        /// CSV file containing a list of DOIs
        list_of_dois: PathBuf,

        /// Delete any existing data and load the reference data first
        #[arg(short, long)]
        initialise: bool,

        /// Process only the first N DOIs
        #[arg(short, long)]
        limit: Option<usize>,

        /// Re-fetch and rewrite DOIs already in the graph
        #[arg(short, long)]
        update_metadata: bool,

        /// Save raw API responses as JSON
        #[arg(short, long)]
        write_metadata: bool,

        /// Directory for raw JSON responses
        #[arg(long, default_value = "data/json")]
        json_dir: PathBuf,

        /// Reference data directory used by --initialise
        #[arg(long, default_value = "data/init")]
        data_dir: PathBuf,

        /// Write to an in-memory graph instead of Memgraph
        #[arg(long)]
        dry_run: bool,
    },

    /// Load reference data (workstreams, partners, authors, countries)
    Seed {
        /// Directory containing the reference CSV files
        #[arg(default_value = "data/init")]
        dir: PathBuf,
    },

    /// Check DOIs against the DOI pattern without fetching anything
    Validate {
        /// CSV file containing a list of DOIs
        list_of_dois: PathBuf,
    },
}

#[derive(Serialize)]
struct ValidationReport {
    valid: Vec<String>,
    invalid: Vec<String>,
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.debug { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .init();

    match cli.command {
        Commands::Ingest {
            list_of_dois,
            initialise,
            limit,
            update_metadata,
            write_metadata,
            json_dir,
            data_dir,
            dry_run,
        } => {
            let config = Config::from_env().context("Failed to load configuration")?;
            let args = IngestArgs {
                list_of_dois,
                initialise,
                options: IngestOptions { limit, update_metadata },
                json_dir: write_metadata.then_some(json_dir),
                data_dir,
            };
            if dry_run {
                run_ingest(&config, &MemoryStore::new(), &args).await
            } else {
                let store = MemgraphStore::connect(&config)
                    .await
                    .context("Failed to connect to Memgraph")?;
                run_ingest(&config, &store, &args).await
            }
        }
        Commands::Seed { dir } => {
            let config = Config::from_env().context("Failed to load configuration")?;
            let store = MemgraphStore::connect(&config)
                .await
                .context("Failed to connect to Memgraph")?;
            let resolver = IdentityResolver::new(config.thresholds);
            let report = Seeder::new(&store, &resolver)
                .seed(&dir)
                .await
                .context("Failed to load reference data")?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Commands::Validate { list_of_dois } => validate(&list_of_dois),
    }
}

// ============================================================================
// Commands
// ============================================================================

struct IngestArgs {
    list_of_dois: PathBuf,
    initialise: bool,
    options: IngestOptions,
    json_dir: Option<PathBuf>,
    data_dir: PathBuf,
}

async fn run_ingest<S: GraphStore>(config: &Config, store: &S, args: &IngestArgs) -> Result<()> {
    let dois = read_doi_list(&args.list_of_dois)
        .with_context(|| format!("Failed to read {}", args.list_of_dois.display()))?;
    let resolver = IdentityResolver::new(config.thresholds);

    if args.initialise {
        info!("Initialising graph");
        store.clear().await.context("Failed to clear graph")?;
        Seeder::new(store, &resolver)
            .seed(&args.data_dir)
            .await
            .context("Failed to load reference data")?;
    }

    let openaire = OpenAireClient::connect(config)
        .await
        .context("Failed to authenticate with OpenAire")?;
    let openalex = OpenAlexClient::new(&config.openalex_api, config.openalex_mailto.clone())?;
    let mut fetcher = ApiFetcher::new(openaire, openalex);
    if let Some(dir) = &args.json_dir {
        fetcher = fetcher.with_dump_dir(dir.clone());
    }

    let metrics = Ingestor::new(&fetcher, store, &resolver)
        .run(&dois, args.options)
        .await
        .context("Ingestion failed")?;

    println!("{}", serde_json::to_string_pretty(&metrics)?);
    Ok(())
}

fn validate(path: &Path) -> Result<()> {
    let dois = read_doi_list(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let mut manager = DoiManager::new(&dois, dois.len(), false)?;
    manager.pattern_check();

    let (valid, invalid): (Vec<_>, Vec<_>) = manager.statuses().iter().partition(|s| s.valid_pattern);
    let report = ValidationReport {
        valid: valid.into_iter().map(|s| s.doi.clone()).collect(),
        invalid: invalid.into_iter().map(|s| s.doi.clone()).collect(),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
