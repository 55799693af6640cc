//! Error types for enrichment

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EnrichmentError {
    #[error("Generation failed: {0}")]
    Generation(String),

    #[error("Generator returned no content")]
    EmptyResponse,

    #[error("Transcript fetch failed: {0}")]
    Transcript(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl EnrichmentError {
    pub fn generation(msg: impl Into<String>) -> Self {
        EnrichmentError::Generation(msg.into())
    }

    pub fn transcript(msg: impl Into<String>) -> Self {
        EnrichmentError::Transcript(msg.into())
    }
}
