//! Catalog client errors.

use thiserror::Error;

/// Errors from the catalog API client.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered with a non-success status.
    #[error("Catalog API returned status {status}")]
    Status {
        /// The HTTP status code.
        status: u16,
    },

    /// The requested resource does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Rate limited by the API.
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// The response body did not parse.
    #[error("Failed to parse catalog response: {0}")]
    Parse(#[from] serde_json::Error),
}
