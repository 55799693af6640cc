//! Services for the cycling newsfeed
//!
//! This crate wires feed ingestion, persistence and enrichment together:
//! - `store`: the persistence gateway with SQLite and in-memory backends
//! - `feed_poller`: scheduled fetch, dedup, persist and fan-out of feeds
//! - `change_notifier`: store change feed with a snapshot polling fallback
//! - `summarization`: single-worker summary queue
//! - `broadcaster`: in-process fan-out of new entries
//! - `entries`: listings, votes, views, deletes and manual adds

pub mod broadcaster;
pub mod change_notifier;
pub mod entries;
pub mod existence_cache;
pub mod feed_poller;
pub mod listeners;
pub mod store;
pub mod summarization;

pub use broadcaster::Broadcaster;
pub use change_notifier::{ChangeNotifier, ChangeNotifierConfig, WatchMode, WatchOutcome};
pub use entries::{EntryError, EntryService, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
pub use existence_cache::ExistenceCache;
pub use feed_poller::{FeedPoller, FeedPollerConfig, PollReport};
pub use listeners::{ListenerSet, Registration};
pub use store::{ChangeStream, MemoryNewsStore, NewsStore, SqliteNewsStore, StoreError};
pub use summarization::{
    ProcessOutcome, RetryPolicy, SummarizationConfig, SummarizationQueue, SummarizeError,
};
