//! In-process entry store with a live change feed

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use chrono_tz::Tz;
use futures::StreamExt;
use newsfeed_core::{rank_by_views, rank_by_votes, ChangeEvent, ChangeKind, NewsEntry};
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use tracing::debug;

use super::{language_matches, search_tokens, ChangeStream, NewsStore, StoreError};

const CHANGE_CHANNEL_CAPACITY: usize = 1024;

/// Entries kept in a map guarded by a read-write lock.
///
/// Every `save` and `update` is published on a broadcast channel which
/// backs `watch`. A store built with [`MemoryNewsStore::without_change_feed`]
/// reports the change feed as unsupported instead.
pub struct MemoryNewsStore {
    entries: RwLock<HashMap<String, NewsEntry>>,
    changes: Option<broadcast::Sender<ChangeEvent>>,
    zone: Tz,
}

impl MemoryNewsStore {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            entries: RwLock::new(HashMap::new()),
            changes: Some(tx),
            zone: newsfeed_core::DEFAULT_REFERENCE_ZONE,
        }
    }

    pub fn without_change_feed() -> Self {
        Self {
            changes: None,
            ..Self::new()
        }
    }

    /// Zone used to day-bucket the vote and view rankings
    pub fn with_zone(mut self, zone: Tz) -> Self {
        self.zone = zone;
        self
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    fn publish(&self, kind: ChangeKind, link: &str) {
        if let Some(tx) = &self.changes {
            // No receivers is fine
            let _ = tx.send(ChangeEvent::tailing(kind, link));
        }
    }

    /// Visible entries matching `predicate`, newest first
    fn select<F>(&self, languages: &[String], predicate: F) -> Vec<NewsEntry>
    where
        F: Fn(&NewsEntry) -> bool,
    {
        let mut selected: Vec<NewsEntry> = self
            .entries
            .read()
            .values()
            .filter(|e| !e.is_deleted())
            .filter(|e| language_matches(languages, &e.language))
            .filter(|e| predicate(e))
            .cloned()
            .collect();
        selected.sort_by_key(|e| std::cmp::Reverse(e.published_at()));
        selected
    }
}

impl Default for MemoryNewsStore {
    fn default() -> Self {
        Self::new()
    }
}

fn truncated(mut entries: Vec<NewsEntry>, limit: usize) -> Vec<NewsEntry> {
    entries.truncate(limit);
    entries
}

#[async_trait]
impl NewsStore for MemoryNewsStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn exists(&self, link: &str) -> Result<bool, StoreError> {
        Ok(self.entries.read().contains_key(link))
    }

    async fn save(&self, entry: &NewsEntry) -> Result<(), StoreError> {
        {
            let mut entries = self.entries.write();
            if entries.contains_key(entry.link()) {
                return Err(StoreError::Duplicate(entry.link().to_string()));
            }
            entries.insert(entry.link().to_string(), entry.clone());
        }
        debug!("Saved {}", entry.link());
        self.publish(ChangeKind::Insert, entry.link());
        Ok(())
    }

    async fn update(&self, entry: &NewsEntry) -> Result<(), StoreError> {
        {
            let mut entries = self.entries.write();
            match entries.get_mut(entry.link()) {
                Some(existing) => *existing = entry.clone(),
                None => return Err(StoreError::NotFound(entry.link().to_string())),
            }
        }
        self.publish(ChangeKind::Update, entry.link());
        Ok(())
    }

    async fn find_by_link(&self, link: &str) -> Result<Option<NewsEntry>, StoreError> {
        Ok(self.entries.read().get(link).cloned())
    }

    async fn find_recent(
        &self,
        languages: &[String],
        window_days: i64,
        limit: usize,
    ) -> Result<Vec<NewsEntry>, StoreError> {
        let cutoff = Utc::now() - Duration::days(window_days);
        let entries = self.select(languages, |e| e.published_at() >= cutoff);
        Ok(truncated(entries, limit))
    }

    async fn find_by_votes(
        &self,
        languages: &[String],
        limit: usize,
    ) -> Result<Vec<NewsEntry>, StoreError> {
        let mut entries = self.select(languages, |e| e.votes >= 1);
        rank_by_votes(&mut entries, self.zone);
        Ok(truncated(entries, limit))
    }

    async fn find_by_views(
        &self,
        languages: &[String],
        limit: usize,
    ) -> Result<Vec<NewsEntry>, StoreError> {
        let mut entries = self.select(languages, |e| e.views >= 1);
        rank_by_views(&mut entries, self.zone);
        Ok(truncated(entries, limit))
    }

    async fn find_by_site(
        &self,
        domain: &str,
        languages: &[String],
        limit: usize,
    ) -> Result<Vec<NewsEntry>, StoreError> {
        let domain = domain.trim().trim_start_matches("www.").to_lowercase();
        let entries = self.select(languages, |e| {
            e.domain_only()
                .map(|d| d.to_lowercase() == domain)
                .unwrap_or(false)
        });
        Ok(truncated(entries, limit))
    }

    async fn search_titles(
        &self,
        query: &str,
        languages: &[String],
        limit: usize,
    ) -> Result<Vec<NewsEntry>, StoreError> {
        let tokens = search_tokens(query);
        if tokens.is_empty() {
            return Ok(Vec::new());
        }
        let entries = self.select(languages, |e| {
            let title = e.title.to_lowercase();
            tokens.iter().all(|t| title.contains(t.as_str()))
        });
        Ok(truncated(entries, limit))
    }

    async fn find_unsummarized(
        &self,
        window_days: i64,
        limit: usize,
    ) -> Result<Vec<NewsEntry>, StoreError> {
        let cutoff = Utc::now() - Duration::days(window_days);
        let entries = self.select(&[], |e| e.published_at() >= cutoff && !e.has_summary());
        Ok(truncated(entries, limit))
    }

    async fn recent_links(
        &self,
        window_days: i64,
        limit: usize,
    ) -> Result<Vec<String>, StoreError> {
        let entries = self.find_recent(&[], window_days, limit).await?;
        Ok(entries.iter().map(|e| e.link().to_string()).collect())
    }

    async fn watch(&self) -> Result<ChangeStream, StoreError> {
        let tx = self.changes.as_ref().ok_or_else(|| {
            StoreError::ChangeStreamUnsupported("store was built without a change feed".into())
        })?;

        let stream = BroadcastStream::new(tx.subscribe()).map(|item| {
            item.map_err(|e: BroadcastStreamRecvError| {
                StoreError::ChangeStream(format!("watcher fell behind: {}", e))
            })
        });
        Ok(stream.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use newsfeed_core::ChangeOrigin;

    fn entry(link: &str, title: &str, language: &str, age_hours: i64) -> NewsEntry {
        let now = Utc::now();
        let mut e = NewsEntry::new(link, title, now).unwrap();
        e.set_published_at(now - Duration::hours(age_hours), now);
        e.language = language.to_string();
        e
    }

    fn links(entries: &[NewsEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.link()).collect()
    }

    #[tokio::test]
    async fn test_save_and_exists() {
        let store = MemoryNewsStore::new();
        let e = entry("https://example.com/a", "Race Update", "en", 1);

        assert!(!store.exists(e.link()).await.unwrap());
        store.save(&e).await.unwrap();
        assert!(store.exists(e.link()).await.unwrap());
        assert_eq!(store.find_by_link(e.link()).await.unwrap(), Some(e.clone()));

        assert!(matches!(
            store.save(&e).await,
            Err(StoreError::Duplicate(_))
        ));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_update_requires_existing() {
        let store = MemoryNewsStore::new();
        let mut e = entry("https://example.com/a", "t", "en", 1);
        assert!(matches!(
            store.update(&e).await,
            Err(StoreError::NotFound(_))
        ));

        store.save(&e).await.unwrap();
        e.summary = "short".to_string();
        store.update(&e).await.unwrap();
        let stored = store.find_by_link(e.link()).await.unwrap().unwrap();
        assert_eq!(stored.summary, "short");
    }

    #[tokio::test]
    async fn test_find_recent_filters() {
        let store = MemoryNewsStore::new();
        store.save(&entry("https://a.com/1", "t", "en", 1)).await.unwrap();
        store.save(&entry("https://a.com/2", "t", "de", 2)).await.unwrap();
        store.save(&entry("https://a.com/old", "t", "en", 24 * 5)).await.unwrap();
        let mut deleted = entry("https://a.com/deleted", "t", "en", 1);
        deleted.soft_delete();
        store.save(&deleted).await.unwrap();

        let all = store.find_recent(&[], 2, 100).await.unwrap();
        assert_eq!(links(&all), vec!["https://a.com/1", "https://a.com/2"]);

        let de = store.find_recent(&["de".to_string()], 2, 100).await.unwrap();
        assert_eq!(links(&de), vec!["https://a.com/2"]);

        let limited = store.find_recent(&[], 2, 1).await.unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn test_votes_and_views_listings() {
        let store = MemoryNewsStore::new().with_zone(chrono_tz::UTC);
        let mut a = entry("https://a.com/a", "t", "en", 1);
        a.votes = 3;
        let mut b = entry("https://a.com/b", "t", "en", 1);
        b.votes = 1;
        b.views = 4;
        let c = entry("https://a.com/c", "t", "en", 1);
        for e in [&a, &b, &c] {
            store.save(e).await.unwrap();
        }

        let voted = store.find_by_votes(&[], 10).await.unwrap();
        let voted_links = links(&voted);
        assert_eq!(voted_links.len(), 2);
        assert!(!voted_links.contains(&"https://a.com/c"));

        let viewed = store.find_by_views(&[], 10).await.unwrap();
        assert_eq!(links(&viewed), vec!["https://a.com/b"]);
    }

    #[tokio::test]
    async fn test_find_by_site_and_search() {
        let store = MemoryNewsStore::new();
        store
            .save(&entry("https://www.velonews.com/a", "Tour de France stage 9", "en", 1))
            .await
            .unwrap();
        store
            .save(&entry("https://road.cc/b", "Tour of Flanders preview", "en", 2))
            .await
            .unwrap();

        let site = store.find_by_site("velonews.com", &[], 10).await.unwrap();
        assert_eq!(links(&site), vec!["https://www.velonews.com/a"]);
        let site = store.find_by_site("www.velonews.com", &[], 10).await.unwrap();
        assert_eq!(site.len(), 1);

        let hits = store.search_titles("tour STAGE", &[], 10).await.unwrap();
        assert_eq!(links(&hits), vec!["https://www.velonews.com/a"]);
        let hits = store.search_titles("tour", &[], 10).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert!(store.search_titles("  ", &[], 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unsummarized_and_recent_links() {
        let store = MemoryNewsStore::new();
        let a = entry("https://a.com/a", "t", "en", 1);
        let mut b = entry("https://a.com/b", "t", "en", 2);
        b.summary = "done".to_string();
        store.save(&a).await.unwrap();
        store.save(&b).await.unwrap();

        let pending = store.find_unsummarized(2, 100).await.unwrap();
        assert_eq!(links(&pending), vec!["https://a.com/a"]);

        let recent = store.recent_links(2, 100).await.unwrap();
        assert_eq!(recent, vec!["https://a.com/a", "https://a.com/b"]);
    }

    #[tokio::test]
    async fn test_watch_receives_changes() {
        let store = MemoryNewsStore::new();
        let mut changes = store.watch().await.unwrap();

        let mut e = entry("https://a.com/a", "t", "en", 1);
        store.save(&e).await.unwrap();
        e.votes = 1;
        store.update(&e).await.unwrap();

        let first = changes.next().await.unwrap().unwrap();
        assert_eq!(first.kind, ChangeKind::Insert);
        assert_eq!(first.link.as_deref(), Some("https://a.com/a"));
        assert_eq!(first.origin, ChangeOrigin::Tailing);

        let second = changes.next().await.unwrap().unwrap();
        assert_eq!(second.kind, ChangeKind::Update);
    }

    #[tokio::test]
    async fn test_watch_unsupported() {
        let store = MemoryNewsStore::without_change_feed();
        let err = match store.watch().await {
            Err(e) => e,
            Ok(_) => panic!("expected unsupported"),
        };
        assert!(err.is_unsupported());
    }
}
