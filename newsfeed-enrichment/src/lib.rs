//! Enrichment collaborators for newsfeed entries
//!
//! This crate provides the external services the summarization worker
//! talks to: an OpenAI-compatible chat model that writes summaries, and a
//! YouTube caption scraper that turns videos into text.

pub mod error;
pub mod openai;
pub mod summary;
pub mod transcript;

pub use error::EnrichmentError;
pub use openai::{OpenAIGenerator, TextGenerator};
pub use summary::{render_summary_html, strip_reasoning, SUMMARY_SYSTEM_PROMPT};
pub use transcript::{TranscriptSource, YoutubeTranscriptClient};
