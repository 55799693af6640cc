//! Advisory cache of links known to be stored.
//!
//! Only positive answers are cached, and only for a limited time. A miss
//! always falls through to the store, which stays authoritative.

use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;

const DEFAULT_TTL: Duration = Duration::from_secs(10 * 60);

pub struct ExistenceCache {
    known: DashMap<String, Instant>,
    ttl: Duration,
}

impl ExistenceCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            known: DashMap::new(),
            ttl,
        }
    }

    /// True while `link` was remembered less than one TTL ago
    pub fn contains(&self, link: &str) -> bool {
        match self.known.get(link) {
            Some(seen) if seen.elapsed() < self.ttl => true,
            Some(seen) => {
                drop(seen);
                self.known.remove(link);
                false
            }
            None => false,
        }
    }

    pub fn remember(&self, link: &str) {
        self.known.insert(link.to_string(), Instant::now());
    }

    pub fn forget(&self, link: &str) {
        self.known.remove(link);
    }

    /// Drop expired links, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let before = self.known.len();
        self.known.retain(|_, seen| seen.elapsed() < self.ttl);
        before.saturating_sub(self.known.len())
    }

    pub fn len(&self) -> usize {
        self.known.len()
    }

    pub fn is_empty(&self) -> bool {
        self.known.is_empty()
    }
}

impl Default for ExistenceCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}
