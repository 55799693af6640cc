//! Summarization Queue
//!
//! FIFO of entry links awaiting a summary, drained by a single worker that
//! handles at most one entry per tick to stay within the generator's rate
//! limits.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use newsfeed_core::NewsEntry;
use newsfeed_enrichment::{
    render_summary_html, strip_reasoning, EnrichmentError, TextGenerator, TranscriptSource,
    SUMMARY_SYSTEM_PROMPT,
};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn};

use crate::store::{NewsStore, StoreError};

/// What to do with an entry whose processing failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPolicy {
    /// Drop it; the startup recovery scan may find it again
    Never,
    /// Put it back at the tail until it failed `max_attempts` times
    Requeue { max_attempts: u32 },
}

/// Configuration for SummarizationQueue
#[derive(Debug, Clone)]
pub struct SummarizationConfig {
    pub tick_interval: Duration,
    pub initial_delay: Duration,
    pub max_queue_len: usize,
    /// Content length above which an entry is worth summarizing
    pub min_content_len: usize,
    pub recovery_window_days: i64,
    pub recovery_limit: usize,
    pub retry: RetryPolicy,
    pub system_prompt: String,
}

impl Default for SummarizationConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(15),
            initial_delay: Duration::from_secs(30),
            max_queue_len: 500,
            min_content_len: 1000,
            recovery_window_days: 2,
            recovery_limit: 100,
            retry: RetryPolicy::Never,
            system_prompt: SUMMARY_SYSTEM_PROMPT.to_string(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SummarizeError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Enrichment error: {0}")]
    Enrichment(#[from] EnrichmentError),
}

/// Result of one worker tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Nothing queued
    Idle,
    /// Another tick is still processing
    Busy,
    Summarized(String),
    Skipped { link: String, reason: &'static str },
    Failed { link: String, error: String },
}

#[derive(Default)]
struct QueueState {
    items: VecDeque<String>,
    queued: HashSet<String>,
    failures: HashMap<String, u32>,
}

/// Clears the in-flight flag when processing ends, including on panic
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct SummarizationQueue {
    store: Arc<dyn NewsStore>,
    generator: Arc<dyn TextGenerator>,
    transcripts: Arc<dyn TranscriptSource>,
    config: SummarizationConfig,
    state: Mutex<QueueState>,
    in_flight: AtomicBool,
}

impl SummarizationQueue {
    pub fn new(
        store: Arc<dyn NewsStore>,
        generator: Arc<dyn TextGenerator>,
        transcripts: Arc<dyn TranscriptSource>,
        config: SummarizationConfig,
    ) -> Self {
        info!(
            "Initializing SummarizationQueue (tick {:?}, max {} queued)",
            config.tick_interval, config.max_queue_len
        );
        Self {
            store,
            generator,
            transcripts,
            config,
            state: Mutex::new(QueueState::default()),
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn min_content_len(&self) -> usize {
        self.config.min_content_len
    }

    /// Queue an entry; false if it is already queued or the queue is full
    pub fn enqueue(&self, entry: &NewsEntry) -> bool {
        self.enqueue_link(entry.link())
    }

    pub fn enqueue_link(&self, link: &str) -> bool {
        let mut state = self.state.lock();
        if state.queued.contains(link) {
            return false;
        }
        if state.items.len() >= self.config.max_queue_len {
            warn!("[Summarizer] Queue full, dropping {}", link);
            return false;
        }

        state.queued.insert(link.to_string());
        state.items.push_back(link.to_string());
        debug!("[Summarizer] Queued {} ({} pending)", link, state.items.len());
        true
    }

    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().items.is_empty()
    }

    /// Links in processing order
    pub fn pending(&self) -> Vec<String> {
        self.state.lock().items.iter().cloned().collect()
    }

    fn dequeue(&self) -> Option<String> {
        let mut state = self.state.lock();
        let link = state.items.pop_front()?;
        state.queued.remove(&link);
        Some(link)
    }

    fn record_failure(&self, link: &str) {
        let RetryPolicy::Requeue { max_attempts } = self.config.retry else {
            return;
        };

        let attempts = {
            let mut state = self.state.lock();
            let attempts = state.failures.entry(link.to_string()).or_insert(0);
            *attempts += 1;
            *attempts
        };

        if attempts < max_attempts {
            if self.enqueue_link(link) {
                debug!("[Summarizer] Requeued {} after attempt {}", link, attempts);
            }
        } else {
            warn!("[Summarizer] Giving up on {} after {} attempts", link, attempts);
            self.state.lock().failures.remove(link);
        }
    }

    /// Enqueue recent entries that still lack a summary
    pub async fn recover_pending(&self) -> Result<usize, StoreError> {
        let candidates = self
            .store
            .find_unsummarized(self.config.recovery_window_days, self.config.recovery_limit)
            .await?;

        let recovered = candidates
            .iter()
            .filter(|e| e.needs_summary(self.config.min_content_len))
            .filter(|e| self.enqueue(e))
            .count();

        info!("[Summarizer] Recovered {} pending entries", recovered);
        Ok(recovered)
    }

    /// Take the next queued entry and summarize it
    pub async fn process_next(&self) -> ProcessOutcome {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            return ProcessOutcome::Busy;
        }
        let _in_flight = InFlight(&self.in_flight);

        let Some(link) = self.dequeue() else {
            return ProcessOutcome::Idle;
        };

        match self.summarize(&link).await {
            Ok(outcome) => {
                self.state.lock().failures.remove(&link);
                outcome
            }
            Err(e) => {
                error!("[Summarizer] Failed to summarize {}: {}", link, e);
                self.record_failure(&link);
                ProcessOutcome::Failed {
                    link,
                    error: e.to_string(),
                }
            }
        }
    }

    #[instrument(skip(self))]
    async fn summarize(&self, link: &str) -> Result<ProcessOutcome, SummarizeError> {
        let skipped = |reason| {
            debug!("[Summarizer] Skipping {}: {}", link, reason);
            Ok(ProcessOutcome::Skipped {
                link: link.to_string(),
                reason,
            })
        };

        let Some(mut entry) = self.store.find_by_link(link).await? else {
            return skipped("missing");
        };
        if entry.is_deleted() {
            return skipped("deleted");
        }
        if entry.has_summary() {
            return skipped("already summarized");
        }

        // Video feeds only carry the description; the transcript replaces it
        if entry.is_transcript_source() {
            let Some(video_id) = entry.video_id() else {
                return skipped("no video id");
            };
            match self.transcripts.list_transcripts(&video_id).await? {
                Some(transcript)
                    if !transcript.trim().is_empty() && transcript != entry.content =>
                {
                    entry.content = transcript;
                    self.store.update(&entry).await?;
                    debug!("[Summarizer] Stored transcript for {}", link);
                }
                Some(_) => {}
                None => debug!("[Summarizer] No transcript for {}", link),
            }
            if entry.content.trim().is_empty() {
                return skipped("no transcript");
            }
        }

        if entry.content.trim().is_empty() {
            return skipped("empty content");
        }

        let raw = self
            .generator
            .summarize(&self.config.system_prompt, &entry.content)
            .await?;
        let summary = render_summary_html(&strip_reasoning(&raw));
        if summary.is_empty() {
            return Err(EnrichmentError::EmptyResponse.into());
        }

        // Votes and views may have changed while the generator ran
        let mut latest = match self.store.find_by_link(link).await? {
            Some(latest) => latest,
            None => entry.clone(),
        };
        if latest.content.trim().is_empty() || latest.is_transcript_source() {
            latest.content = entry.content;
        }
        latest.summary = summary;
        self.store.update(&latest).await?;

        info!("[Summarizer] Summarized {}", link);
        Ok(ProcessOutcome::Summarized(link.to_string()))
    }

    /// Start the worker: recovery scan, initial delay, then one item per tick
    pub fn start(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            if let Err(e) = self.recover_pending().await {
                error!("[Summarizer] Recovery scan failed: {}", e);
            }

            tokio::time::sleep(self.config.initial_delay).await;
            info!(
                "[Summarizer] Worker running every {:?}",
                self.config.tick_interval
            );

            let mut ticker = interval(self.config.tick_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                match self.process_next().await {
                    ProcessOutcome::Idle | ProcessOutcome::Busy => {}
                    outcome => debug!("[Summarizer] Tick finished: {:?}", outcome),
                }
            }
        })
    }
}
