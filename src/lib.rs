//! # research_index
//!
//! Builds a research knowledge graph from DOIs: fetches metadata from
//! OpenAIRE and OpenAlex, resolves author identities against the people
//! already in the graph and writes outputs, authors and affiliations to
//! Memgraph.
//!
//! ## Modules
//!
//! - [`doi`] - DOI cleaning, validation and run metrics
//! - [`openaire`] / [`openalex`] - API clients
//! - [`fetcher`] - concurrent fetching of both sources
//! - [`parser`] - raw JSON to [`models::ArticleMetadata`]
//! - [`resolver`] - author identity resolution
//! - [`affiliation`] - person to partner institution links
//! - [`store`] - graph store trait with Memgraph and in-memory backends
//! - [`seed`] - reference data from CSV
//! - [`ingest`] - the ingestion pipeline
//!
//! ## Usage
//!
//! ```rust,no_run
//! use research_index::{config::Config, fetcher::ApiFetcher, ingest::{Ingestor, IngestOptions}};
//! use research_index::{openaire::OpenAireClient, openalex::OpenAlexClient};
//! use research_index::{resolver::IdentityResolver, store::MemgraphStore};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let store = MemgraphStore::connect(&config).await?;
//!     let fetcher = ApiFetcher::new(
//!         OpenAireClient::connect(&config).await?,
//!         OpenAlexClient::new(&config.openalex_api, config.openalex_mailto.clone())?,
//!     );
//!     let resolver = IdentityResolver::new(config.thresholds);
//!     let dois = vec!["10.5281/zenodo.8140241".to_string()];
//!     let metrics = Ingestor::new(&fetcher, &store, &resolver)
//!         .run(&dois, IngestOptions::default())
//!         .await?;
//!     println!("Ingested {} DOIs", metrics.ingested_dois);
//!     Ok(())
//! }
//! ```

pub mod affiliation;
pub mod config;
pub mod doi;
pub mod error;
pub mod fetcher;
pub mod ingest;
pub mod models;
pub mod names;
pub mod openaire;
pub mod openalex;
pub mod parser;
pub mod resolver;
pub mod seed;
pub mod store;

pub use error::{IndexError, Result};
