//! Feed ingestion for the cycling newsfeed
//!
//! This crate provides:
//! - Feed sources: the curated cycling feed list and a TOML feeds file loader
//! - Fetching: an HTTP fetcher that parses RSS 2.0 and Atom documents
//! - Normalization: raw feed items into validated `NewsEntry` candidates
//! - Filtering: title entity cleanup and the spam denylist
//! - HTML sanitizing: body markup reduced to line breaks

pub mod error;
pub mod fetcher;
pub mod filter;
pub mod html;
pub mod normalizer;
pub mod sources;

pub use error::FeedError;
pub use fetcher::{parse_feed, FeedFetcher, HttpFeedFetcher, RawFeedItem};
pub use filter::{SpamFilter, DEFAULT_SPAM_TOKENS};
pub use html::sanitize_html;
pub use normalizer::{normalize, Rejection};
pub use sources::{get_curated_feeds, load_feeds_file, parse_feeds_toml, FeedSource};
