//! Persistence gateway
//!
//! The store is the single source of truth for entries and the only place
//! where "does this link exist" is authoritative. Implementations may offer
//! a live change feed; those that cannot must fail `watch` with
//! [`StoreError::ChangeStreamUnsupported`] so the change notifier can fall
//! back to polling.

mod memory;
mod sqlite;

pub use memory::MemoryNewsStore;
pub use sqlite::SqliteNewsStore;

use async_trait::async_trait;
use futures::stream::BoxStream;
use newsfeed_core::{ChangeEvent, NewsEntry};

/// Live feed of store mutations
pub type ChangeStream = BoxStream<'static, Result<ChangeEvent, StoreError>>;

/// Errors that can occur during store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Entry already exists: {0}")]
    Duplicate(String),

    #[error("Entry not found: {0}")]
    NotFound(String),

    /// The backend cannot provide a live change feed at all
    #[error("Change stream unsupported: {0}")]
    ChangeStreamUnsupported(String),

    /// The change feed broke and may work again after a retry
    #[error("Change stream interrupted: {0}")]
    ChangeStream(String),

    #[error("Corrupt entry {link}: {message}")]
    Corrupt { link: String, message: String },

    #[error("IO error: {0}")]
    Io(String),

    #[error("Failed to acquire lock")]
    LockError,
}

impl StoreError {
    pub fn is_unsupported(&self) -> bool {
        matches!(self, StoreError::ChangeStreamUnsupported(_))
    }
}

/// Entry storage keyed by link.
///
/// An empty `languages` slice matches every language. Listings never
/// include soft-deleted entries.
#[async_trait]
pub trait NewsStore: Send + Sync {
    /// Short backend name for health output
    fn backend(&self) -> &'static str;

    async fn exists(&self, link: &str) -> Result<bool, StoreError>;

    /// Create a new entry; fails with `Duplicate` if the link is taken
    async fn save(&self, entry: &NewsEntry) -> Result<(), StoreError>;

    /// Overwrite an existing entry; fails with `NotFound` if it is missing
    async fn update(&self, entry: &NewsEntry) -> Result<(), StoreError>;

    async fn find_by_link(&self, link: &str) -> Result<Option<NewsEntry>, StoreError>;

    /// Entries published within the last `window_days`, newest first
    async fn find_recent(
        &self,
        languages: &[String],
        window_days: i64,
        limit: usize,
    ) -> Result<Vec<NewsEntry>, StoreError>;

    /// Entries with at least one vote, ranked by day and votes
    async fn find_by_votes(
        &self,
        languages: &[String],
        limit: usize,
    ) -> Result<Vec<NewsEntry>, StoreError>;

    /// Entries with at least one view, ranked by day and views
    async fn find_by_views(
        &self,
        languages: &[String],
        limit: usize,
    ) -> Result<Vec<NewsEntry>, StoreError>;

    /// Entries whose host (without `www.`) equals `domain`, newest first
    async fn find_by_site(
        &self,
        domain: &str,
        languages: &[String],
        limit: usize,
    ) -> Result<Vec<NewsEntry>, StoreError>;

    /// Entries whose title contains every whitespace-separated token of
    /// `query`, ignoring case, newest first
    async fn search_titles(
        &self,
        query: &str,
        languages: &[String],
        limit: usize,
    ) -> Result<Vec<NewsEntry>, StoreError>;

    /// Recent entries without a summary, newest first
    async fn find_unsummarized(
        &self,
        window_days: i64,
        limit: usize,
    ) -> Result<Vec<NewsEntry>, StoreError>;

    /// Links of the newest entries, used for the fallback snapshot diff
    async fn recent_links(&self, window_days: i64, limit: usize)
        -> Result<Vec<String>, StoreError>;

    /// Open a live change feed
    async fn watch(&self) -> Result<ChangeStream, StoreError>;
}

/// Split a search query into lowercase tokens
pub(crate) fn search_tokens(query: &str) -> Vec<String> {
    query
        .split_whitespace()
        .map(|t| t.to_lowercase())
        .collect()
}

pub(crate) fn language_matches(languages: &[String], language: &str) -> bool {
    languages.is_empty() || languages.iter().any(|l| l == language)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_tokens() {
        assert_eq!(search_tokens("  Tour  de FRANCE "), vec!["tour", "de", "france"]);
        assert!(search_tokens("   ").is_empty());
    }

    #[test]
    fn test_language_matches() {
        assert!(language_matches(&[], "de"));
        assert!(language_matches(&["en".to_string(), "de".to_string()], "de"));
        assert!(!language_matches(&["en".to_string()], "de"));
    }

    #[test]
    fn test_is_unsupported() {
        assert!(StoreError::ChangeStreamUnsupported("x".into()).is_unsupported());
        assert!(!StoreError::ChangeStream("x".into()).is_unsupported());
    }
}
