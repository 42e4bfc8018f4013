use thiserror::Error;

use crate::config::ConfigError;

/// Errors that abort the whole run (non-zero exit).
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Listing fetch failed: {0}")]
    ListingFetch(String),

    #[error("Listing page not understood: {0}")]
    ListingStructure(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Per-artist enrichment failures. These degrade a record, never the run.
#[derive(Debug, Error)]
pub enum EnrichError {
    #[error("Request failed: {0}")]
    Network(String),

    #[error("HTTP {status} for {url}")]
    Status { status: u16, url: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("No Spotify token available")]
    MissingToken,

    #[error("No match for '{0}'")]
    NoMatch(String),
}

impl From<reqwest::Error> for EnrichError {
    fn from(e: reqwest::Error) -> Self {
        EnrichError::Network(e.to_string())
    }
}
