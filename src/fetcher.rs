//! Record fetching by DOI.
//!
//! [`MetadataFetcher`] is the seam the ingestion pipeline depends on;
//! [`ApiFetcher`] queries OpenAIRE and OpenAlex concurrently.

use crate::error::{IndexError, Result};
use crate::openaire::OpenAireClient;
use crate::openalex::OpenAlexClient;
use reqwest::{RequestBuilder, Response, StatusCode};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, error, warn};

const MAX_RETRIES: u32 = 3;

/// Raw API payloads for one DOI
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawMetadata {
    pub openaire: Option<serde_json::Value>,
    pub openalex: Option<serde_json::Value>,
}

/// Source of raw metadata records
pub trait MetadataFetcher: Send + Sync {
    /// Fetch whatever each source has for `doi`. Missing records are `None`;
    /// only errors that would fail every later DOI too are returned as `Err`.
    fn fetch(&self, doi: &str) -> impl Future<Output = Result<RawMetadata>> + Send;
}

/// Send a request, retrying with exponential backoff while rate limited.
pub(crate) async fn send_with_backoff<F>(build: F) -> Result<Response>
where
    F: Fn() -> RequestBuilder,
{
    let mut retries = 0;
    loop {
        let response = build().send().await?;
        if response.status() != StatusCode::TOO_MANY_REQUESTS {
            return Ok(response);
        }
        if retries >= MAX_RETRIES {
            return Err(IndexError::RateLimited(60));
        }
        let backoff = Duration::from_secs(2u64.pow(retries));
        warn!(retries = retries, backoff_secs = backoff.as_secs(), "Rate limited, backing off");
        tokio::time::sleep(backoff).await;
        retries += 1;
    }
}

/// File name for a raw dump: the DOI with slashes removed
pub fn dump_file_name(doi: &str) -> String {
    format!("{}.json", doi.replace('/', ""))
}

/// Fetches from OpenAIRE and OpenAlex
#[derive(Debug, Clone)]
pub struct ApiFetcher {
    openaire: OpenAireClient,
    openalex: OpenAlexClient,
    dump_dir: Option<PathBuf>,
}

impl ApiFetcher {
    pub fn new(openaire: OpenAireClient, openalex: OpenAlexClient) -> Self {
        Self {
            openaire,
            openalex,
            dump_dir: None,
        }
    }

    /// Write every raw response under `dir/{openaire,openalex}/`.
    pub fn with_dump_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dump_dir = Some(dir.into());
        self
    }

    async fn dump(&self, source: &str, doi: &str, body: &serde_json::Value) {
        let Some(root) = &self.dump_dir else {
            return;
        };
        if let Err(e) = write_dump(root, source, doi, body).await {
            error!(doi = %doi, source, error = %e, "Failed to write raw metadata");
        }
    }
}

async fn write_dump(root: &Path, source: &str, doi: &str, body: &serde_json::Value) -> Result<()> {
    let dir = root.join(source);
    tokio::fs::create_dir_all(&dir).await?;
    let path = dir.join(dump_file_name(doi));
    tokio::fs::write(&path, serde_json::to_vec(body)?).await?;
    debug!(path = %path.display(), "Wrote raw metadata");
    Ok(())
}

impl MetadataFetcher for ApiFetcher {
    async fn fetch(&self, doi: &str) -> Result<RawMetadata> {
        let (openaire, openalex) = futures::join!(
            self.openaire.fetch_products(doi),
            self.openalex.fetch_work(doi)
        );

        let openaire = match openaire {
            Ok(body) => body,
            Err(IndexError::Unauthorized) => return Err(IndexError::Unauthorized),
            Err(e) => {
                error!(doi = %doi, error = %e, "No metadata found on OpenAire");
                None
            }
        };
        let openalex = openalex.unwrap_or_else(|e| {
            warn!(doi = %doi, error = %e, "No metadata found on OpenAlex");
            None
        });

        if let Some(body) = &openaire {
            self.dump("openaire", doi, body).await;
        }
        if let Some(body) = &openalex {
            self.dump("openalex", doi, body).await;
        }

        Ok(RawMetadata { openaire, openalex })
    }
}
