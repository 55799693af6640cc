//! Change Notifier
//!
//! Watches the store for entry changes and fans `(kind, link)` events out to
//! subscribers. The store's live change feed is used while it works; a store
//! that reports the feed as unsupported switches the notifier to snapshot
//! polling for the rest of the process lifetime.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use newsfeed_core::{ChangeEvent, ChangeKind};
use parking_lot::RwLock;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::listeners::{ListenerSet, Registration};
use crate::store::NewsStore;

/// Watch loop state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchMode {
    Starting,
    Tailing,
    Fallback,
    Stopped,
}

/// What happened on the last watch attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchOutcome {
    /// A live change feed was opened
    Opened,
    /// The change feed closed on its own
    StreamEnded,
    /// Opening or reading the change feed failed
    Transient,
    /// The store cannot provide a change feed
    Unsupported,
    Shutdown,
}

impl WatchMode {
    /// Fallback is one-way; only shutdown leaves it.
    pub fn next(self, outcome: WatchOutcome) -> WatchMode {
        match (self, outcome) {
            (_, WatchOutcome::Shutdown) | (WatchMode::Stopped, _) => WatchMode::Stopped,
            (WatchMode::Fallback, _) => WatchMode::Fallback,
            (_, WatchOutcome::Unsupported) => WatchMode::Fallback,
            _ => WatchMode::Tailing,
        }
    }
}

/// Configuration for ChangeNotifier
#[derive(Debug, Clone)]
pub struct ChangeNotifierConfig {
    /// Delay before reopening a failed change feed
    pub retry_delay: Duration,
    /// Interval between snapshots in fallback mode
    pub fallback_poll_delay: Duration,
    pub snapshot_window_days: i64,
    pub snapshot_limit: usize,
}

impl Default for ChangeNotifierConfig {
    fn default() -> Self {
        Self {
            retry_delay: Duration::from_secs(3),
            fallback_poll_delay: Duration::from_secs(5),
            snapshot_window_days: 2,
            snapshot_limit: 100,
        }
    }
}

pub struct ChangeNotifier {
    store: Arc<dyn NewsStore>,
    config: ChangeNotifierConfig,
    listeners: ListenerSet<ChangeEvent>,
    mode: RwLock<WatchMode>,
    shutdown_tx: watch::Sender<bool>,
}

impl ChangeNotifier {
    pub fn new(store: Arc<dyn NewsStore>, config: ChangeNotifierConfig) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            store,
            config,
            listeners: ListenerSet::new("ChangeNotifier"),
            mode: RwLock::new(WatchMode::Starting),
            shutdown_tx,
        }
    }

    pub fn subscribe<F>(&self, listener: F) -> Registration
    where
        F: Fn(ChangeEvent) + Send + Sync + 'static,
    {
        self.listeners.register(listener)
    }

    pub fn subscribe_channel(&self) -> (Registration, mpsc::Receiver<ChangeEvent>) {
        self.listeners.register_channel()
    }

    /// Fan out an application event that did not come from the store
    pub fn publish_synthetic(&self, kind: ChangeKind, key: Option<String>) -> usize {
        debug!("[ChangeNotifier] Synthetic {} {:?}", kind, key);
        self.listeners.publish(ChangeEvent::synthetic(kind, key))
    }

    pub fn mode(&self) -> WatchMode {
        *self.mode.read()
    }

    pub fn subscriber_count(&self) -> usize {
        self.listeners.len()
    }

    /// Start the watch loop
    pub fn start(self: Arc<Self>) -> JoinHandle<()> {
        info!("[ChangeNotifier] Starting watch loop on {} store", self.store.backend());
        tokio::spawn(async move {
            self.run().await;
        })
    }

    /// Stop the watch loop, interrupting any wait in progress
    pub fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
        self.transition(WatchOutcome::Shutdown);
    }

    fn is_shutdown(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    fn transition(&self, outcome: WatchOutcome) -> WatchMode {
        let mut mode = self.mode.write();
        let next = mode.next(outcome);
        if next != *mode {
            info!("[ChangeNotifier] {:?} -> {:?} ({:?})", *mode, next, outcome);
        }
        *mode = next;
        next
    }

    /// Resolves once shutdown was requested
    async fn stopped(&self) {
        let mut rx = self.shutdown_tx.subscribe();
        // The sender lives in self, so this only returns on shutdown
        let _ = rx.wait_for(|stopped| *stopped).await;
    }

    /// Sleep unless shutdown arrives first; returns false on shutdown
    async fn pause(&self, delay: Duration) -> bool {
        tokio::select! {
            _ = self.stopped() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }

    async fn run(&self) {
        loop {
            if self.is_shutdown() {
                self.transition(WatchOutcome::Shutdown);
            }

            match self.mode() {
                WatchMode::Stopped => break,
                WatchMode::Starting | WatchMode::Tailing => {
                    let outcome = self.tail_once().await;
                    let next = self.transition(outcome);
                    if next == WatchMode::Tailing {
                        debug!(
                            "[ChangeNotifier] Reopening change feed in {:?}",
                            self.config.retry_delay
                        );
                        if !self.pause(self.config.retry_delay).await {
                            self.transition(WatchOutcome::Shutdown);
                        }
                    }
                }
                WatchMode::Fallback => {
                    self.poll_snapshots().await;
                    self.transition(WatchOutcome::Shutdown);
                }
            }
        }

        info!("[ChangeNotifier] Watch loop stopped");
    }

    /// Open the change feed and forward events until it fails or ends.
    /// The stream is dropped before returning.
    async fn tail_once(&self) -> WatchOutcome {
        let opened = tokio::select! {
            _ = self.stopped() => return WatchOutcome::Shutdown,
            opened = self.store.watch() => opened,
        };

        let mut changes = match opened {
            Ok(changes) => changes,
            Err(e) if e.is_unsupported() => {
                warn!("[ChangeNotifier] {}; switching to snapshot polling", e);
                return WatchOutcome::Unsupported;
            }
            Err(e) => {
                error!("[ChangeNotifier] Failed to open change feed: {}", e);
                return WatchOutcome::Transient;
            }
        };

        self.transition(WatchOutcome::Opened);
        info!("[ChangeNotifier] Tailing change feed");

        loop {
            tokio::select! {
                _ = self.stopped() => return WatchOutcome::Shutdown,
                next = changes.next() => match next {
                    Some(Ok(event)) => {
                        let delivered = self.listeners.publish(event);
                        debug!("[ChangeNotifier] Change delivered to {} listeners", delivered);
                    }
                    Some(Err(e)) => {
                        warn!("[ChangeNotifier] Change feed error: {}", e);
                        return WatchOutcome::Transient;
                    }
                    None => {
                        warn!("[ChangeNotifier] Change feed ended");
                        return WatchOutcome::StreamEnded;
                    }
                },
            }
        }
    }

    async fn snapshot(&self) -> Option<HashSet<String>> {
        match self
            .store
            .recent_links(self.config.snapshot_window_days, self.config.snapshot_limit)
            .await
        {
            Ok(links) => Some(links.into_iter().collect()),
            Err(e) => {
                warn!("[ChangeNotifier] Snapshot failed: {}", e);
                None
            }
        }
    }

    /// Diff recent-link snapshots until shutdown
    async fn poll_snapshots(&self) {
        let mut previous = self.snapshot().await;

        while self.pause(self.config.fallback_poll_delay).await {
            let Some(current) = self.snapshot().await else {
                continue;
            };

            if previous.as_ref().is_some_and(|prev| *prev != current) {
                let delivered = self.listeners.publish(ChangeEvent::batch_changed());
                debug!("[ChangeNotifier] Batch change delivered to {} listeners", delivered);
            }
            previous = Some(current);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ChangeStream, MemoryNewsStore, StoreError};
    use async_trait::async_trait;
    use chrono::Utc;
    use newsfeed_core::{ChangeOrigin, NewsEntry};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fast_config() -> ChangeNotifierConfig {
        ChangeNotifierConfig {
            retry_delay: Duration::from_millis(20),
            fallback_poll_delay: Duration::from_millis(20),
            ..Default::default()
        }
    }

    fn entry(link: &str) -> NewsEntry {
        NewsEntry::new(link, "Race Update", Utc::now()).unwrap()
    }

    async fn next_event(rx: &mut mpsc::Receiver<ChangeEvent>) -> ChangeEvent {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for change")
            .expect("listener channel closed")
    }

    async fn wait_for_mode(notifier: &ChangeNotifier, mode: WatchMode) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while notifier.mode() != mode {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("mode not reached");
    }

    /// Fails the first `failures` watch calls, then delegates
    struct FlakyStore {
        inner: MemoryNewsStore,
        failures: AtomicUsize,
        watch_calls: AtomicUsize,
    }

    impl FlakyStore {
        fn new(failures: usize) -> Self {
            Self {
                inner: MemoryNewsStore::new(),
                failures: AtomicUsize::new(failures),
                watch_calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl NewsStore for FlakyStore {
        fn backend(&self) -> &'static str {
            "flaky"
        }
        async fn exists(&self, link: &str) -> Result<bool, StoreError> {
            self.inner.exists(link).await
        }
        async fn save(&self, entry: &NewsEntry) -> Result<(), StoreError> {
            self.inner.save(entry).await
        }
        async fn update(&self, entry: &NewsEntry) -> Result<(), StoreError> {
            self.inner.update(entry).await
        }
        async fn find_by_link(&self, link: &str) -> Result<Option<NewsEntry>, StoreError> {
            self.inner.find_by_link(link).await
        }
        async fn find_recent(
            &self,
            languages: &[String],
            window_days: i64,
            limit: usize,
        ) -> Result<Vec<NewsEntry>, StoreError> {
            self.inner.find_recent(languages, window_days, limit).await
        }
        async fn find_by_votes(
            &self,
            languages: &[String],
            limit: usize,
        ) -> Result<Vec<NewsEntry>, StoreError> {
            self.inner.find_by_votes(languages, limit).await
        }
        async fn find_by_views(
            &self,
            languages: &[String],
            limit: usize,
        ) -> Result<Vec<NewsEntry>, StoreError> {
            self.inner.find_by_views(languages, limit).await
        }
        async fn find_by_site(
            &self,
            domain: &str,
            languages: &[String],
            limit: usize,
        ) -> Result<Vec<NewsEntry>, StoreError> {
            self.inner.find_by_site(domain, languages, limit).await
        }
        async fn search_titles(
            &self,
            query: &str,
            languages: &[String],
            limit: usize,
        ) -> Result<Vec<NewsEntry>, StoreError> {
            self.inner.search_titles(query, languages, limit).await
        }
        async fn find_unsummarized(
            &self,
            window_days: i64,
            limit: usize,
        ) -> Result<Vec<NewsEntry>, StoreError> {
            self.inner.find_unsummarized(window_days, limit).await
        }
        async fn recent_links(
            &self,
            window_days: i64,
            limit: usize,
        ) -> Result<Vec<String>, StoreError> {
            self.inner.recent_links(window_days, limit).await
        }
        async fn watch(&self) -> Result<ChangeStream, StoreError> {
            self.watch_calls.fetch_add(1, Ordering::SeqCst);
            let remaining = self.failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures.store(remaining - 1, Ordering::SeqCst);
                return Err(StoreError::ChangeStream("connection reset".into()));
            }
            self.inner.watch().await
        }
    }

    #[test]
    fn test_transitions() {
        use WatchMode::*;
        use WatchOutcome::*;

        assert_eq!(Starting.next(Opened), Tailing);
        assert_eq!(Starting.next(Transient), Tailing);
        assert_eq!(Tailing.next(StreamEnded), Tailing);
        assert_eq!(Tailing.next(Transient), Tailing);
        assert_eq!(Starting.next(Unsupported), Fallback);
        assert_eq!(Tailing.next(Unsupported), Fallback);

        // Fallback never goes back to tailing
        assert_eq!(Fallback.next(Opened), Fallback);
        assert_eq!(Fallback.next(Transient), Fallback);

        for mode in [Starting, Tailing, Fallback, Stopped] {
            assert_eq!(mode.next(Shutdown), Stopped);
        }
        assert_eq!(Stopped.next(Opened), Stopped);
    }

    #[tokio::test]
    async fn test_tailing_forwards_store_changes() {
        let store = Arc::new(MemoryNewsStore::new());
        let notifier = Arc::new(ChangeNotifier::new(store.clone(), fast_config()));
        let (_registration, mut rx) = notifier.subscribe_channel();
        let handle = notifier.clone().start();

        wait_for_mode(&notifier, WatchMode::Tailing).await;
        store.save(&entry("https://example.com/a")).await.unwrap();

        let event = next_event(&mut rx).await;
        assert_eq!(event.kind, ChangeKind::Insert);
        assert_eq!(event.link.as_deref(), Some("https://example.com/a"));
        assert_eq!(event.origin, ChangeOrigin::Tailing);

        notifier.shutdown();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(notifier.mode(), WatchMode::Stopped);
    }

    #[tokio::test]
    async fn test_transient_error_retries_tailing() {
        let store = Arc::new(FlakyStore::new(2));
        let notifier = Arc::new(ChangeNotifier::new(store.clone(), fast_config()));
        let (_registration, mut rx) = notifier.subscribe_channel();
        let handle = notifier.clone().start();

        tokio::time::timeout(Duration::from_secs(2), async {
            while store.watch_calls.load(Ordering::SeqCst) < 3 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        wait_for_mode(&notifier, WatchMode::Tailing).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        store.save(&entry("https://example.com/a")).await.unwrap();
        assert_eq!(next_event(&mut rx).await.kind, ChangeKind::Insert);

        notifier.shutdown();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_unsupported_switches_to_fallback() {
        let store = Arc::new(MemoryNewsStore::without_change_feed());
        store.save(&entry("https://example.com/a")).await.unwrap();

        let notifier = Arc::new(ChangeNotifier::new(store.clone(), fast_config()));
        let (_registration, mut rx) = notifier.subscribe_channel();
        let handle = notifier.clone().start();

        wait_for_mode(&notifier, WatchMode::Fallback).await;
        // Let the baseline snapshot happen before changing the store
        tokio::time::sleep(Duration::from_millis(50)).await;
        store.save(&entry("https://example.com/b")).await.unwrap();

        let event = next_event(&mut rx).await;
        assert_eq!(event, ChangeEvent::batch_changed());
        assert_eq!(notifier.mode(), WatchMode::Fallback);

        notifier.shutdown();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_unchanged_snapshot_is_silent() {
        let store = Arc::new(MemoryNewsStore::without_change_feed());
        store.save(&entry("https://example.com/a")).await.unwrap();
        let notifier = Arc::new(ChangeNotifier::new(store, fast_config()));
        let (_registration, mut rx) = notifier.subscribe_channel();
        let handle = notifier.clone().start();

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(rx.try_recv().is_err());

        notifier.shutdown();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_long_waits() {
        let store = Arc::new(MemoryNewsStore::without_change_feed());
        let config = ChangeNotifierConfig {
            fallback_poll_delay: Duration::from_secs(3600),
            ..Default::default()
        };
        let notifier = Arc::new(ChangeNotifier::new(store, config));
        let handle = notifier.clone().start();

        wait_for_mode(&notifier, WatchMode::Fallback).await;
        notifier.shutdown();
        tokio::time::timeout(Duration::from_millis(500), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_synthetic_events() {
        let store = Arc::new(MemoryNewsStore::new());
        let notifier = ChangeNotifier::new(store, fast_config());
        let (_registration, mut rx) = notifier.subscribe_channel();

        let delivered =
            notifier.publish_synthetic(ChangeKind::LanguageChanged, Some("de".to_string()));
        assert_eq!(delivered, 1);

        let event = next_event(&mut rx).await;
        assert_eq!(event.kind, ChangeKind::LanguageChanged);
        assert_eq!(event.link.as_deref(), Some("de"));
        assert_eq!(event.origin, ChangeOrigin::Synthetic);
    }
}
