//! Custom error types for research-index.
//!
//! All library functions return `Result<T, IndexError>`. Per-DOI and
//! per-mention conditions that the pipeline recovers from are still surfaced
//! as errors here; the caller decides whether they are fatal.

use thiserror::Error;

/// Main error type for research-index operations.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Network/HTTP request error
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Graph database error (connection or query)
    #[error("Graph store error: {0}")]
    Graph(#[from] neo4rs::Error),

    /// Metadata parsing error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Rate limited by external API
    #[error("Rate limited, retry after {0}s")]
    RateLimited(u64),

    /// External API returned an error
    #[error("API error: {code} - {message}")]
    Api {
        /// HTTP status code
        code: i32,
        /// Error message from API
        message: String,
    },

    /// The OpenAIRE token was rejected
    #[error("OpenAire refresh token is invalid or expired. Please update token and try again.")]
    Unauthorized,

    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV reading/writing error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Result type alias using `IndexError`
pub type Result<T> = std::result::Result<T, IndexError>;
