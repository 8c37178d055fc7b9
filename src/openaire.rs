//! OpenAIRE Graph API client
//!
//! Research products are looked up by DOI with a bearer token. A personal
//! access token is obtained from a refresh token when one is configured,
//! falling back to a directly supplied token.

use crate::config::Config;
use crate::error::{IndexError, Result};
use crate::fetcher::send_with_backoff;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Deserialize)]
struct AccessTokenResponse {
    access_token: String,
}

/// Authenticated OpenAIRE client
#[derive(Debug, Clone)]
pub struct OpenAireClient {
    client: Client,
    api: String,
    token: String,
}

impl OpenAireClient {
    /// Build a client and obtain an access token.
    pub async fn connect(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .user_agent("research-index/0.1")
            .build()?;

        let token = match &config.refresh_token {
            Some(refresh) => {
                info!("Found refresh token. Obtaining personal token.");
                match access_token(&client, &config.openaire_service, refresh).await {
                    Ok(token) => Some(token),
                    Err(e) => {
                        warn!(error = %e, "Could not exchange refresh token, using TOKEN");
                        config.token.clone()
                    }
                }
            }
            None => config.token.clone(),
        };
        let token = token.ok_or_else(|| IndexError::Config("No token found".to_string()))?;

        Ok(Self::with_token(client, &config.openaire_api, token))
    }

    pub fn with_token(client: Client, api: &str, token: String) -> Self {
        Self {
            client,
            api: api.trim_end_matches('/').to_string(),
            token,
        }
    }

    /// Request URL for a DOI
    pub fn product_url(&self, doi: &str) -> String {
        format!("{}/graph/v1/researchProducts?pid={}", self.api, urlencoding::encode(doi))
    }

    /// Fetch research products for `doi`. `Ok(None)` when OpenAIRE has
    /// nothing for it.
    pub async fn fetch_products(&self, doi: &str) -> Result<Option<serde_json::Value>> {
        let url = self.product_url(doi);
        info!(doi = %doi, "Requesting research products from OpenAire");

        let response = send_with_backoff(|| self.client.get(&url).bearer_auth(&self.token)).await?;
        let status = response.status();
        debug!(doi = %doi, status = %status, "OpenAire response");

        if status == StatusCode::FORBIDDEN || status == StatusCode::UNAUTHORIZED {
            return Err(IndexError::Unauthorized);
        }
        if !status.is_success() {
            return Err(IndexError::Api {
                code: status.as_u16() as i32,
                message: format!("OpenAire API error: {}", status),
            });
        }

        let body: serde_json::Value = response.json().await?;
        Ok(interpret_products(doi, body))
    }
}

async fn access_token(client: &Client, service: &str, refresh_token: &str) -> Result<String> {
    let url = format!(
        "{}/uoa-user-management/api/users/getAccessToken?refreshToken={}",
        service.trim_end_matches('/'),
        urlencoding::encode(refresh_token)
    );
    let response = client.get(&url).send().await?;
    let status = response.status();
    info!(status = %status, "Access token response");
    if !status.is_success() {
        return Err(IndexError::Api {
            code: status.as_u16() as i32,
            message: "Failed to obtain OpenAire access token".to_string(),
        });
    }
    let body: AccessTokenResponse = response.json().await?;
    Ok(body.access_token)
}

/// `None` when the body reports an error or carries no results.
fn interpret_products(doi: &str, body: serde_json::Value) -> Option<serde_json::Value> {
    if let Some(error) = body.get("error").filter(|e| !e.is_null()) {
        warn!(doi = %doi, error = %error, "OpenAire returned an error");
        return None;
    }
    let has_results = body
        .get("results")
        .and_then(|r| r.as_array())
        .is_some_and(|r| !r.is_empty());
    if !has_results {
        warn!(doi = %doi, "DOI returned no results");
        return None;
    }
    Some(body)
}
