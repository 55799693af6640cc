//! In-process fan-out of newly stored entries

use newsfeed_core::NewsEntry;
use tokio::sync::mpsc;
use tracing::debug;

use crate::listeners::{ListenerSet, Registration};

/// Single-channel publish/subscribe for new entries.
///
/// `broadcast` only queues the entry; listeners run on their own tasks.
pub struct Broadcaster {
    listeners: ListenerSet<NewsEntry>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self {
            listeners: ListenerSet::new("Broadcaster"),
        }
    }

    pub fn register<F>(&self, listener: F) -> Registration
    where
        F: Fn(NewsEntry) + Send + Sync + 'static,
    {
        self.listeners.register(listener)
    }

    pub fn register_channel(&self) -> (Registration, mpsc::Receiver<NewsEntry>) {
        self.listeners.register_channel()
    }

    pub fn broadcast(&self, entry: NewsEntry) -> usize {
        let link = entry.link().to_string();
        let delivered = self.listeners.publish(entry);
        debug!("[Broadcaster] {} delivered to {} listeners", link, delivered);
        delivered
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_broadcast_reaches_callbacks_and_channels() {
        let broadcaster = Broadcaster::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _callback = broadcaster.register(move |entry: NewsEntry| {
            let _ = tx.send(entry.link().to_string());
        });
        let (_channel, mut channel_rx) = broadcaster.register_channel();

        let entry = NewsEntry::new("https://example.com/a", "Race Update", Utc::now()).unwrap();
        assert_eq!(broadcaster.broadcast(entry), 2);

        let received = tokio::time::timeout(Duration::from_secs(1), channel_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received.title, "Race Update");
        assert_eq!(rx.recv().await.as_deref(), Some("https://example.com/a"));
    }

    #[tokio::test]
    async fn test_cancelled_listener_stops_receiving() {
        let broadcaster = Broadcaster::new();
        let (registration, mut rx) = broadcaster.register_channel();
        registration.cancel();
        assert_eq!(broadcaster.listener_count(), 0);

        let entry = NewsEntry::new("https://example.com/a", "t", Utc::now()).unwrap();
        assert_eq!(broadcaster.broadcast(entry), 0);
        assert!(rx.recv().await.is_none());
    }
}
