//! Environment-supplied configuration.
//!
//! Values are read from the process environment after loading an optional
//! `.env` file. Every setting has a default except the OpenAIRE credentials,
//! which are only required when metadata is actually fetched.

use crate::error::{IndexError, Result};
use std::str::FromStr;
use tracing::debug;

const DEFAULT_MG_HOST: &str = "127.0.0.1";
const DEFAULT_MG_PORT: u16 = 7687;
const DEFAULT_OPENAIRE_API: &str = "https://api.openaire.eu";
const DEFAULT_OPENAIRE_SERVICE: &str = "https://services.openaire.eu";
const DEFAULT_OPENALEX_API: &str = "https://api.openalex.org";
const DEFAULT_THRESHOLD: f64 = 0.8;

/// Name-similarity thresholds used by the identity resolver.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    /// Minimum score for a name match when the mention carries an ORCID
    pub orcid_name: f64,
    /// Minimum score for a name-only match
    pub name: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            orcid_name: DEFAULT_THRESHOLD,
            name: DEFAULT_THRESHOLD,
        }
    }
}

impl Thresholds {
    /// Check both thresholds lie in `[0, 1]`.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.orcid_name) {
            return Err(IndexError::Config(
                "ORCID_NAME_SIMILARITY_THRESHOLD must be between 0 and 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.name) {
            return Err(IndexError::Config(
                "NAME_SIMILARITY_THRESHOLD must be between 0 and 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Runtime configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub mg_host: String,
    pub mg_port: u16,
    pub mg_user: String,
    pub mg_password: String,
    pub openaire_api: String,
    pub openaire_service: String,
    pub openalex_api: String,
    pub openalex_mailto: Option<String>,
    pub refresh_token: Option<String>,
    pub token: Option<String>,
    pub thresholds: Thresholds,
}

impl Config {
    /// Load `.env` (if present) and read the process environment.
    pub fn from_env() -> Result<Self> {
        match dotenvy::dotenv() {
            Ok(path) => debug!(path = %path.display(), "Loaded .env"),
            Err(e) => debug!(error = %e, "No .env loaded"),
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let thresholds = Thresholds {
            orcid_name: parse_or(get("ORCID_NAME_SIMILARITY_THRESHOLD"), DEFAULT_THRESHOLD, "ORCID_NAME_SIMILARITY_THRESHOLD")?,
            name: parse_or(get("NAME_SIMILARITY_THRESHOLD"), DEFAULT_THRESHOLD, "NAME_SIMILARITY_THRESHOLD")?,
        };
        thresholds.validate()?;

        Ok(Self {
            mg_host: get("MG_HOST").unwrap_or_else(|| DEFAULT_MG_HOST.to_string()),
            mg_port: parse_or(get("MG_PORT"), DEFAULT_MG_PORT, "MG_PORT")?,
            mg_user: get("MG_USER").unwrap_or_default(),
            mg_password: get("MG_PASSWORD").unwrap_or_default(),
            openaire_api: get("OPENAIRE_API").unwrap_or_else(|| DEFAULT_OPENAIRE_API.to_string()),
            openaire_service: get("OPENAIRE_SERVICE")
                .unwrap_or_else(|| DEFAULT_OPENAIRE_SERVICE.to_string()),
            openalex_api: get("OPENALEX_API").unwrap_or_else(|| DEFAULT_OPENALEX_API.to_string()),
            openalex_mailto: get("OPENALEX_MAILTO"),
            refresh_token: get("REFRESH_TOKEN"),
            token: get("TOKEN"),
            thresholds,
        })
    }

    /// Bolt URI of the graph store
    pub fn bolt_uri(&self) -> String {
        format!("{}:{}", self.mg_host, self.mg_port)
    }
}

fn parse_or<T: FromStr>(value: Option<String>, default: T, key: &str) -> Result<T> {
    match value {
        Some(v) => v
            .parse()
            .map_err(|_| IndexError::Config(format!("{} has an invalid value: {}", key, v))),
        None => Ok(default),
    }
}
