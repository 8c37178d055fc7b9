//! OpenAlex API client
//!
//! Looks up a single work by DOI. OpenAlex data only enriches OpenAIRE
//! records (author ids, institutions, citation counts), so callers treat a
//! failed lookup as "no OpenAlex metadata".
//!
//! API best practices (per OpenAlex docs):
//! - Use the `mailto` parameter for the polite pool
//! - Back off exponentially on 429

use crate::error::{IndexError, Result};
use crate::fetcher::send_with_backoff;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::{debug, info};

/// OpenAlex works endpoint client
#[derive(Debug, Clone)]
pub struct OpenAlexClient {
    client: Client,
    api: String,
    mailto: Option<String>,
}

impl OpenAlexClient {
    pub fn new(api: &str, mailto: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("research-index/0.1")
            .build()?;
        Ok(Self {
            client,
            api: api.trim_end_matches('/').to_string(),
            mailto,
        })
    }

    /// Request URL for a DOI
    pub fn work_url(&self, doi: &str) -> String {
        let mut url = format!("{}/works/doi:{}", self.api, doi);
        if let Some(mailto) = &self.mailto {
            url.push_str(&format!("?mailto={}", urlencoding::encode(mailto)));
        }
        url
    }

    /// Fetch the work for `doi`. `Ok(None)` when OpenAlex does not know it.
    pub async fn fetch_work(&self, doi: &str) -> Result<Option<serde_json::Value>> {
        let url = self.work_url(doi);
        info!(doi = %doi, "Requesting work from OpenAlex");

        let response = send_with_backoff(|| self.client.get(&url)).await?;
        let status = response.status();
        debug!(doi = %doi, status = %status, "OpenAlex response");

        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(IndexError::Api {
                code: status.as_u16() as i32,
                message: format!("OpenAlex API error: {}", status),
            });
        }

        let body: serde_json::Value = response.json().await?;
        Ok(non_empty(body))
    }
}

fn non_empty(body: serde_json::Value) -> Option<serde_json::Value> {
    match &body {
        serde_json::Value::Null => None,
        serde_json::Value::Object(map) if map.is_empty() => None,
        _ => Some(body),
    }
}
