//! Hetzner Cloud client errors

use thiserror::Error;

/// Errors that can occur when interacting with the Hetzner Cloud API
#[derive(Debug, Error)]
pub enum HcloudError {
    /// HTTP request/response error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned an error (`code: message`)
    #[error("Hetzner Cloud API error: {0}")]
    Api(String),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Authentication failed (invalid or revoked token)
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// A resource with the same unique attribute already exists
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Rate limit exceeded
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// An asynchronous action finished with an error or did not finish in time
    #[error("Action {id} failed: {message}")]
    Action { id: u64, message: String },

    /// Invalid request (e.g. malformed label selector)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}
