//! Feed Poller
//!
//! Background service that polls every configured feed on a fixed
//! interval, stores entries whose links are not yet known and fans them
//! out to the broadcaster and the summarization queue.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashSet;
use newsfeed_core::NewsEntry;
use newsfeed_feeds::{normalize, FeedFetcher, FeedSource, SpamFilter};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn};

use crate::broadcaster::Broadcaster;
use crate::existence_cache::ExistenceCache;
use crate::store::{NewsStore, StoreError};
use crate::summarization::SummarizationQueue;

/// Configuration for FeedPoller
#[derive(Debug, Clone)]
pub struct FeedPollerConfig {
    pub poll_interval: Duration,
    pub initial_delay: Duration,
    /// Content length above which new entries are queued for a summary
    pub summary_min_content_len: usize,
}

impl Default for FeedPollerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(15 * 60),
            initial_delay: Duration::from_secs(60),
            summary_min_content_len: 1000,
        }
    }
}

/// Counters for one poll of one or more feeds
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollReport {
    /// Raw items returned by the feeds
    pub fetched: usize,
    /// Items without a usable link or title
    pub rejected: usize,
    pub spam: usize,
    pub duplicates: usize,
    pub stored: usize,
    /// Entries whose persistence failed; retried next cycle
    pub failed: usize,
    pub enqueued: usize,
    /// Feeds that could not be fetched or parsed
    pub fetch_errors: usize,
    /// Feeds skipped because their previous poll was still running
    pub overlapped: usize,
}

impl PollReport {
    fn merge(&mut self, other: &PollReport) {
        self.fetched += other.fetched;
        self.rejected += other.rejected;
        self.spam += other.spam;
        self.duplicates += other.duplicates;
        self.stored += other.stored;
        self.failed += other.failed;
        self.enqueued += other.enqueued;
        self.fetch_errors += other.fetch_errors;
        self.overlapped += other.overlapped;
    }
}

enum Ingested {
    Duplicate,
    Stored { enqueued: bool },
    Failed,
}

/// Marks a key as taken for as long as the guard lives
struct Claim<'a> {
    set: &'a DashSet<String>,
    key: String,
}

impl<'a> Claim<'a> {
    fn take(set: &'a DashSet<String>, key: &str) -> Option<Self> {
        set.insert(key.to_string()).then(|| Self {
            set,
            key: key.to_string(),
        })
    }
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        self.set.remove(&self.key);
    }
}

pub struct FeedPoller {
    feeds: Vec<FeedSource>,
    fetcher: Arc<dyn FeedFetcher>,
    store: Arc<dyn NewsStore>,
    broadcaster: Arc<Broadcaster>,
    summarizer: Option<Arc<SummarizationQueue>>,
    spam_filter: SpamFilter,
    existence: ExistenceCache,
    config: FeedPollerConfig,
    in_flight_feeds: DashSet<String>,
    claimed_links: DashSet<String>,
}

impl FeedPoller {
    pub fn new(
        feeds: Vec<FeedSource>,
        fetcher: Arc<dyn FeedFetcher>,
        store: Arc<dyn NewsStore>,
        broadcaster: Arc<Broadcaster>,
        config: FeedPollerConfig,
    ) -> Self {
        info!("Initializing FeedPoller with {} feeds", feeds.len());
        Self {
            feeds,
            fetcher,
            store,
            broadcaster,
            summarizer: None,
            spam_filter: SpamFilter::default(),
            existence: ExistenceCache::default(),
            config,
            in_flight_feeds: DashSet::new(),
            claimed_links: DashSet::new(),
        }
    }

    pub fn with_summarizer(mut self, summarizer: Arc<SummarizationQueue>) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    pub fn with_spam_filter(mut self, spam_filter: SpamFilter) -> Self {
        self.spam_filter = spam_filter;
        self
    }

    pub fn with_existence_cache(mut self, existence: ExistenceCache) -> Self {
        self.existence = existence;
        self
    }

    pub fn feeds(&self) -> &[FeedSource] {
        &self.feeds
    }

    /// Start the polling loop
    pub fn start(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            tokio::time::sleep(self.config.initial_delay).await;
            info!(
                "[FeedPoller] Polling {} feeds every {:?}",
                self.feeds.len(),
                self.config.poll_interval
            );

            let mut ticker = interval(self.config.poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;

                // A cycle may outlive the interval; slow feeds are skipped, not doubled
                let poller = Arc::clone(&self);
                tokio::spawn(async move {
                    let report = poller.poll_all().await;
                    info!(
                        "[FeedPoller] Cycle done: {} fetched, {} stored, {} duplicates, {} spam, {} failed, {} feed errors",
                        report.fetched,
                        report.stored,
                        report.duplicates,
                        report.spam,
                        report.failed,
                        report.fetch_errors
                    );
                });

                let purged = self.existence.purge_expired();
                if purged > 0 {
                    debug!("[FeedPoller] Purged {} cached links", purged);
                }
            }
        })
    }

    /// Poll every feed concurrently and add up the reports
    pub async fn poll_all(self: &Arc<Self>) -> PollReport {
        let mut tasks = JoinSet::new();
        for source in self.feeds.clone() {
            let poller = Arc::clone(self);
            tasks.spawn(async move { poller.poll_feed(&source).await });
        }

        let mut total = PollReport::default();
        while let Some(result) = tasks.join_next().await {
            match result {
                Ok(report) => total.merge(&report),
                Err(e) => {
                    error!("[FeedPoller] Feed task failed: {}", e);
                    total.fetch_errors += 1;
                }
            }
        }
        total
    }

    /// Fetch one feed and ingest its new entries
    #[instrument(skip(self, source), fields(feed = %source.url))]
    pub async fn poll_feed(self: &Arc<Self>, source: &FeedSource) -> PollReport {
        let mut report = PollReport::default();

        let Some(_claim) = Claim::take(&self.in_flight_feeds, &source.url) else {
            debug!("[FeedPoller] Previous poll still running, skipping");
            report.overlapped = 1;
            return report;
        };

        let items = match self.fetcher.fetch(&source.url).await {
            Ok(items) => items,
            Err(e) => {
                warn!("[FeedPoller] Failed to fetch {}: {}", source.url, e);
                report.fetch_errors = 1;
                return report;
            }
        };
        report.fetched = items.len();

        let now = Utc::now();
        let mut tasks = JoinSet::new();
        for item in &items {
            let entry = match normalize(item, now) {
                Ok(entry) => entry,
                Err(rejection) => {
                    debug!("[FeedPoller] Rejected item: {:?}", rejection);
                    report.rejected += 1;
                    continue;
                }
            };
            let Some(entry) = self.spam_filter.screen(entry) else {
                report.spam += 1;
                continue;
            };

            let poller = Arc::clone(self);
            let language = source.language.clone();
            tasks.spawn(async move { poller.ingest(entry, language).await });
        }

        while let Some(result) = tasks.join_next().await {
            match result {
                Ok(Ingested::Duplicate) => report.duplicates += 1,
                Ok(Ingested::Stored { enqueued }) => {
                    report.stored += 1;
                    if enqueued {
                        report.enqueued += 1;
                    }
                }
                Ok(Ingested::Failed) => report.failed += 1,
                Err(e) => {
                    error!("[FeedPoller] Entry task failed: {}", e);
                    report.failed += 1;
                }
            }
        }

        if report.stored > 0 {
            info!(
                "[FeedPoller] {} new entries from {}",
                report.stored, source.url
            );
        }
        report
    }

    /// Dedup, persist and fan out a single entry
    async fn ingest(&self, mut entry: NewsEntry, language: String) -> Ingested {
        let link = entry.link().to_string();

        // The same link may show up in several feeds of one cycle
        let Some(_claim) = Claim::take(&self.claimed_links, &link) else {
            return Ingested::Duplicate;
        };

        if self.existence.contains(&link) {
            return Ingested::Duplicate;
        }
        match self.store.exists(&link).await {
            Ok(true) => {
                self.existence.remember(&link);
                return Ingested::Duplicate;
            }
            Ok(false) => {}
            Err(e) => {
                error!("[FeedPoller] Existence check failed for {}: {}", link, e);
                return Ingested::Failed;
            }
        }

        entry.language = language;
        match self.store.save(&entry).await {
            Ok(()) => {}
            Err(StoreError::Duplicate(_)) => {
                self.existence.remember(&link);
                return Ingested::Duplicate;
            }
            Err(e) => {
                error!("[FeedPoller] Failed to save {}: {}", link, e);
                return Ingested::Failed;
            }
        }
        self.existence.remember(&link);
        debug!("[FeedPoller] Stored {}", link);

        let enqueued = match &self.summarizer {
            Some(queue) if entry.needs_summary(self.config.summary_min_content_len) => {
                queue.enqueue(&entry)
            }
            _ => false,
        };
        self.broadcaster.broadcast(entry);

        Ingested::Stored { enqueued }
    }
}
