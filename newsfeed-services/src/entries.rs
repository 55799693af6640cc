//! Entry Service
//!
//! Read and write operations behind the HTTP listings: date, vote and view
//! ordered listings, per-site and title search, votes, views, soft deletes
//! and manually added links.

use std::sync::Arc;

use chrono::Utc;
use newsfeed_core::{CoreError, NewsEntry, VoteDirection};
use tracing::{debug, info, instrument};

use crate::broadcaster::Broadcaster;
use crate::store::{NewsStore, StoreError};
use crate::summarization::SummarizationQueue;

/// Listing window for date-ordered reads
pub const LISTING_WINDOW_DAYS: i64 = 2;

pub const DEFAULT_PAGE_SIZE: usize = 50;
pub const MAX_PAGE_SIZE: usize = 100;

#[derive(Debug, thiserror::Error)]
pub enum EntryError {
    #[error("Entry not found: {0}")]
    NotFound(String),

    #[error("Entry already exists: {0}")]
    AlreadyExists(String),

    #[error(transparent)]
    Invalid(#[from] CoreError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct EntryService {
    store: Arc<dyn NewsStore>,
    broadcaster: Arc<Broadcaster>,
    summarizer: Option<Arc<SummarizationQueue>>,
    summary_min_content_len: usize,
}

fn page_size(limit: Option<usize>) -> usize {
    limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
}

impl EntryService {
    pub fn new(store: Arc<dyn NewsStore>, broadcaster: Arc<Broadcaster>) -> Self {
        Self {
            store,
            broadcaster,
            summarizer: None,
            summary_min_content_len: 1000,
        }
    }

    pub fn with_summarizer(mut self, summarizer: Arc<SummarizationQueue>) -> Self {
        self.summary_min_content_len = summarizer.min_content_len();
        self.summarizer = Some(summarizer);
        self
    }

    pub fn store(&self) -> &Arc<dyn NewsStore> {
        &self.store
    }

    pub fn summarizer(&self) -> Option<&Arc<SummarizationQueue>> {
        self.summarizer.as_ref()
    }

    pub async fn latest(
        &self,
        languages: &[String],
        limit: Option<usize>,
    ) -> Result<Vec<NewsEntry>, EntryError> {
        Ok(self
            .store
            .find_recent(languages, LISTING_WINDOW_DAYS, page_size(limit))
            .await?)
    }

    pub async fn most_voted(
        &self,
        languages: &[String],
        limit: Option<usize>,
    ) -> Result<Vec<NewsEntry>, EntryError> {
        Ok(self.store.find_by_votes(languages, page_size(limit)).await?)
    }

    pub async fn most_viewed(
        &self,
        languages: &[String],
        limit: Option<usize>,
    ) -> Result<Vec<NewsEntry>, EntryError> {
        Ok(self.store.find_by_views(languages, page_size(limit)).await?)
    }

    pub async fn by_site(
        &self,
        domain: &str,
        languages: &[String],
        limit: Option<usize>,
    ) -> Result<Vec<NewsEntry>, EntryError> {
        Ok(self
            .store
            .find_by_site(domain, languages, page_size(limit))
            .await?)
    }

    pub async fn search(
        &self,
        query: &str,
        languages: &[String],
        limit: Option<usize>,
    ) -> Result<Vec<NewsEntry>, EntryError> {
        Ok(self
            .store
            .search_titles(query, languages, page_size(limit))
            .await?)
    }

    async fn load(&self, link: &str) -> Result<NewsEntry, EntryError> {
        self.store
            .find_by_link(link)
            .await?
            .filter(|e| !e.is_deleted())
            .ok_or_else(|| EntryError::NotFound(link.to_string()))
    }

    #[instrument(skip(self))]
    pub async fn vote(&self, link: &str, direction: VoteDirection) -> Result<NewsEntry, EntryError> {
        let mut entry = self.load(link).await?;
        entry.vote(direction);
        self.store.update(&entry).await?;
        debug!("Vote {:?} on {} -> {}", direction, link, entry.votes);
        Ok(entry)
    }

    pub async fn record_view(&self, link: &str) -> Result<NewsEntry, EntryError> {
        let mut entry = self.load(link).await?;
        entry.record_view();
        self.store.update(&entry).await?;
        Ok(entry)
    }

    #[instrument(skip(self))]
    pub async fn soft_delete(&self, link: &str) -> Result<(), EntryError> {
        let mut entry = self
            .store
            .find_by_link(link)
            .await?
            .ok_or_else(|| EntryError::NotFound(link.to_string()))?;
        if entry.is_deleted() {
            return Ok(());
        }
        entry.soft_delete();
        self.store.update(&entry).await?;
        info!("Soft-deleted {}", link);
        Ok(())
    }

    /// Store a link submitted by hand, then fan it out like a polled entry
    #[instrument(skip(self))]
    pub async fn add_manual(
        &self,
        link: &str,
        title: &str,
        language: &str,
    ) -> Result<NewsEntry, EntryError> {
        let mut entry = NewsEntry::new(link, title, Utc::now())?;
        entry.language = language.trim().to_string();

        if self.store.exists(entry.link()).await? {
            return Err(EntryError::AlreadyExists(entry.link().to_string()));
        }
        match self.store.save(&entry).await {
            Ok(()) => {}
            Err(StoreError::Duplicate(link)) => return Err(EntryError::AlreadyExists(link)),
            Err(e) => return Err(e.into()),
        }
        info!("Added {} by hand", entry.link());

        if let Some(queue) = &self.summarizer {
            if entry.needs_summary(self.summary_min_content_len) {
                queue.enqueue(&entry);
            }
        }
        self.broadcaster.broadcast(entry.clone());
        Ok(entry)
    }

    /// Queue an existing entry for summarization; false when not queued
    pub async fn enqueue(&self, link: &str) -> Result<bool, EntryError> {
        let entry = self.load(link).await?;
        Ok(self
            .summarizer
            .as_ref()
            .is_some_and(|queue| !entry.has_summary() && queue.enqueue(&entry)))
    }
}
