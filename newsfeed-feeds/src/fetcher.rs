//! Feed fetching and parsing
//!
//! Fetches RSS/Atom documents over HTTP and flattens them into
//! `RawFeedItem`s. Feed hosts are third-party infrastructure with a long
//! tail of broken certificate setups, so certificate validation is off.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use tracing::{debug, instrument};

use crate::error::FeedError;

const USER_AGENT: &str = "CyclingNewsfeed/1.0";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

/// One item as found in a feed, before validation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawFeedItem {
    pub title: Option<String>,
    pub link: Option<String>,
    pub published: Option<DateTime<Utc>>,
    /// Full content blocks (`content:encoded`, Atom `content`)
    pub contents: Vec<String>,
    /// Description or summary field
    pub description: Option<String>,
}

/// Source of raw feed items
#[async_trait]
pub trait FeedFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<RawFeedItem>, FeedError>;
}

/// HTTP feed fetcher
#[derive(Debug, Clone)]
pub struct HttpFeedFetcher {
    client: Client,
}

impl HttpFeedFetcher {
    pub fn new() -> Result<Self, FeedError> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, FeedError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|e| FeedError::InvalidConfig(e.to_string()))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl FeedFetcher for HttpFeedFetcher {
    #[instrument(skip(self))]
    async fn fetch(&self, url: &str) -> Result<Vec<RawFeedItem>, FeedError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FeedError::RequestFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(FeedError::HttpStatus {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }

        let content = response
            .bytes()
            .await
            .map_err(|e| FeedError::RequestFailed(e.to_string()))?;

        let items = parse_feed(&content)
            .map_err(|_| FeedError::ParseError(format!("Failed to parse feed: {}", url)))?;
        debug!("Fetched {} items from {}", items.len(), url);
        Ok(items)
    }
}

/// Parse a feed document, trying RSS first and then Atom
pub fn parse_feed(content: &[u8]) -> Result<Vec<RawFeedItem>, FeedError> {
    if let Ok(channel) = rss::Channel::read_from(content) {
        return Ok(parse_rss_channel(&channel));
    }

    if let Ok(atom_feed) = atom_syndication::Feed::read_from(content) {
        return Ok(parse_atom_feed(&atom_feed));
    }

    Err(FeedError::ParseError(
        "document is neither RSS nor Atom".to_string(),
    ))
}

fn parse_rss_channel(channel: &rss::Channel) -> Vec<RawFeedItem> {
    channel
        .items()
        .iter()
        .map(|item| {
            let published = item
                .pub_date()
                .and_then(parse_date)
                .or_else(|| {
                    item.dublin_core_ext()
                        .and_then(|dc| dc.dates().first())
                        .and_then(|d| parse_date(d))
                });

            RawFeedItem {
                title: item.title().map(str::to_string),
                link: item.link().map(str::to_string),
                published,
                contents: item.content().map(str::to_string).into_iter().collect(),
                description: item.description().map(str::to_string),
            }
        })
        .collect()
}

fn parse_atom_feed(atom_feed: &atom_syndication::Feed) -> Vec<RawFeedItem> {
    atom_feed
        .entries()
        .iter()
        .map(|entry| {
            let link = entry
                .links()
                .iter()
                .find(|l| l.rel() == "alternate")
                .or_else(|| entry.links().first())
                .map(|l| l.href().to_string());

            let published = entry
                .published()
                .or_else(|| Some(entry.updated()))
                .map(|d| d.with_timezone(&Utc));

            let description = entry
                .summary()
                .map(|s| s.as_str().to_string())
                .or_else(|| media_description(entry));

            RawFeedItem {
                title: Some(entry.title().as_str().to_string()),
                link,
                published,
                contents: entry
                    .content()
                    .and_then(|c| c.value())
                    .map(str::to_string)
                    .into_iter()
                    .collect(),
                description,
            }
        })
        .collect()
}

/// `media:group/media:description`, where YouTube puts the video text
fn media_description(entry: &atom_syndication::Entry) -> Option<String> {
    entry
        .extensions()
        .get("media")?
        .get("group")?
        .first()?
        .children()
        .get("description")?
        .first()?
        .value()
        .map(str::to_string)
}

fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    DateTime::parse_from_rfc2822(value)
        .or_else(|_| DateTime::parse_from_rfc3339(value))
        .ok()
        .map(|d| d.with_timezone(&Utc))
}
