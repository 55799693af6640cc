//! Error types for the feeds module

use thiserror::Error;

/// Errors that can occur while loading or fetching feeds
#[derive(Debug, Error)]
pub enum FeedError {
    /// HTTP request failed
    #[error("Request failed: {0}")]
    RequestFailed(String),

    /// Feed host returned an error response
    #[error("HTTP error (status {status}) for {url}")]
    HttpStatus {
        /// HTTP status code
        status: u16,
        /// Feed URL
        url: String,
    },

    /// Body was neither RSS nor Atom
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Feeds file could not be read
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
