//! The news entry aggregate
//!
//! A `NewsEntry` is keyed by its source link. The link is validated on
//! construction and cannot be changed afterwards; the publish date can only
//! be set through a clamping setter so that it never lies in the future.

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{CoreError, CoreResult};

/// Language tag used until a feed assigns one
pub const DEFAULT_LANGUAGE: &str = "undefined";

/// Distance from "now" used when a future publish date is clamped
pub const FUTURE_CLAMP_EPSILON: Duration = Duration::seconds(10);

const VIDEO_HOST_PREFIX: &str = "https://www.youtube.com";
const VIDEO_WATCH_PREFIX: &str = "https://www.youtube.com/watch?v=";

/// Direction of a vote
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteDirection {
    Up,
    Down,
}

/// A single aggregated news item
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewsEntry {
    /// Source URL, the identity of the entry
    link: String,
    /// Entity-decoded title
    pub title: String,
    /// Sanitized body; only `<br>` markup survives
    pub content: String,
    /// Generated summary, empty until enrichment ran
    pub summary: String,
    /// Publication date, never in the future
    published_at: DateTime<Utc>,
    pub votes: i64,
    pub views: i64,
    /// Language tag of the feed the entry came from
    pub language: String,
    /// Soft-delete marker
    deleted: bool,
}

impl NewsEntry {
    /// Create an entry for `link`, published at `now`.
    ///
    /// Fails when the link does not start with `http` or the title is blank.
    pub fn new(
        link: impl Into<String>,
        title: impl Into<String>,
        now: DateTime<Utc>,
    ) -> CoreResult<Self> {
        let link = link.into().trim().to_string();
        if !is_valid_link(&link) {
            return Err(CoreError::invalid_link(link));
        }

        let title = title.into().trim().to_string();
        if title.is_empty() {
            return Err(CoreError::missing_title(link));
        }

        Ok(Self {
            link,
            title,
            content: String::new(),
            summary: String::new(),
            published_at: now,
            votes: 0,
            views: 0,
            language: DEFAULT_LANGUAGE.to_string(),
            deleted: false,
        })
    }

    pub fn link(&self) -> &str {
        &self.link
    }

    pub fn published_at(&self) -> DateTime<Utc> {
        self.published_at
    }

    /// Publish date rendered in the given zone
    pub fn published_in(&self, zone: Tz) -> DateTime<Tz> {
        self.published_at.with_timezone(&zone)
    }

    /// Set the publish date, clamping anything after `now` to `now - 10s`
    pub fn set_published_at(&mut self, value: DateTime<Utc>, now: DateTime<Utc>) {
        self.published_at = if value > now {
            now - FUTURE_CLAMP_EPSILON
        } else {
            value
        };
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    pub fn soft_delete(&mut self) {
        self.deleted = true;
    }

    pub fn has_summary(&self) -> bool {
        !self.summary.trim().is_empty()
    }

    /// Whether the entry should go through the summarization queue
    pub fn needs_summary(&self, min_content_len: usize) -> bool {
        if self.has_summary() || self.deleted {
            return false;
        }
        self.content.chars().count() > min_content_len || self.is_transcript_source()
    }

    pub fn vote(&mut self, direction: VoteDirection) {
        match direction {
            VoteDirection::Up => self.votes += 1,
            VoteDirection::Down => self.votes -= 1,
        }
    }

    pub fn record_view(&mut self) {
        self.views += 1;
    }

    /// Entries hosted on the video platform carry plain text, not HTML
    pub fn is_video_host(&self) -> bool {
        self.link.starts_with(VIDEO_HOST_PREFIX)
    }

    /// Video watch pages whose body can be filled from a transcript
    pub fn is_transcript_source(&self) -> bool {
        self.link.starts_with(VIDEO_WATCH_PREFIX)
    }

    /// Video id of a watch link (`v` query parameter)
    pub fn video_id(&self) -> Option<String> {
        if !self.is_transcript_source() {
            return None;
        }
        let url = Url::parse(&self.link).ok()?;
        url.query_pairs()
            .find(|(key, _)| key == "v")
            .map(|(_, value)| value.into_owned())
            .filter(|id| !id.is_empty())
    }

    /// `scheme://host` of the link
    pub fn domain_with_protocol(&self) -> Option<String> {
        let url = Url::parse(&self.link).ok()?;
        let host = url.host_str()?;
        Some(format!("{}://{}", url.scheme(), host))
    }

    /// Host of the link without a leading `www.`
    pub fn domain_only(&self) -> Option<String> {
        let url = Url::parse(&self.link).ok()?;
        let host = url.host_str()?;
        Some(host.strip_prefix("www.").unwrap_or(host).to_string())
    }
}

/// Links must be absolute http(s) URLs
pub fn is_valid_link(link: &str) -> bool {
    link.starts_with("http") && Url::parse(link).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 7, 14, 12, 0, 0).unwrap()
    }

    fn entry(link: &str) -> NewsEntry {
        NewsEntry::new(link, "Race Update", now()).unwrap()
    }

    #[test]
    fn test_new_trims_and_defaults() {
        let e = NewsEntry::new("  https://example.com/a ", " Race Update ", now()).unwrap();
        assert_eq!(e.link(), "https://example.com/a");
        assert_eq!(e.title, "Race Update");
        assert_eq!(e.votes, 0);
        assert_eq!(e.views, 0);
        assert_eq!(e.summary, "");
        assert_eq!(e.content, "");
        assert_eq!(e.language, DEFAULT_LANGUAGE);
        assert!(!e.is_deleted());
    }

    #[test]
    fn test_new_rejects_bad_link() {
        assert!(matches!(
            NewsEntry::new("ftp://example.com/a", "t", now()),
            Err(CoreError::InvalidLink(_))
        ));
        assert!(matches!(
            NewsEntry::new("   ", "t", now()),
            Err(CoreError::InvalidLink(_))
        ));
        assert!(matches!(
            NewsEntry::new("/relative/path", "t", now()),
            Err(CoreError::InvalidLink(_))
        ));
    }

    #[test]
    fn test_new_rejects_blank_title() {
        assert!(matches!(
            NewsEntry::new("https://example.com/a", "  ", now()),
            Err(CoreError::MissingTitle(_))
        ));
    }

    #[test]
    fn test_future_date_is_clamped() {
        let mut e = entry("https://example.com/a");
        e.set_published_at(now() + Duration::hours(3), now());
        assert_eq!(e.published_at(), now() - FUTURE_CLAMP_EPSILON);
        assert!(e.published_at() <= now());
    }

    #[test]
    fn test_past_date_is_kept() {
        let mut e = entry("https://example.com/a");
        let past = now() - Duration::days(1);
        e.set_published_at(past, now());
        assert_eq!(e.published_at(), past);

        e.set_published_at(now(), now());
        assert_eq!(e.published_at(), now());
    }

    #[test]
    fn test_published_in_reference_zone() {
        let e = entry("https://example.com/a");
        let local = e.published_in(chrono_tz::Europe::Berlin);
        assert_eq!(local.format("%H:%M").to_string(), "14:00");
    }

    #[test]
    fn test_soft_delete() {
        let mut e = entry("https://example.com/a");
        e.soft_delete();
        e.soft_delete();
        assert!(e.is_deleted());
        assert!(!e.needs_summary(0));
    }

    #[test]
    fn test_votes_and_views() {
        let mut e = entry("https://example.com/a");
        e.vote(VoteDirection::Up);
        e.vote(VoteDirection::Up);
        e.vote(VoteDirection::Down);
        e.record_view();
        assert_eq!(e.votes, 1);
        assert_eq!(e.views, 1);
    }

    #[test]
    fn test_domains() {
        let e = entry("https://www.velonews.com/news/road/tour");
        assert_eq!(
            e.domain_with_protocol().as_deref(),
            Some("https://www.velonews.com")
        );
        assert_eq!(e.domain_only().as_deref(), Some("velonews.com"));
    }

    #[test]
    fn test_video_links() {
        let e = entry("https://www.youtube.com/watch?v=dQw4w9WgXcQ");
        assert!(e.is_video_host());
        assert!(e.is_transcript_source());
        assert_eq!(e.video_id().as_deref(), Some("dQw4w9WgXcQ"));

        let channel = entry("https://www.youtube.com/channel/UC77UtoyivVHkpApL0wGfH5w");
        assert!(channel.is_video_host());
        assert!(!channel.is_transcript_source());
        assert_eq!(channel.video_id(), None);
    }

    #[test]
    fn test_needs_summary() {
        let mut e = entry("https://example.com/a");
        e.content = "x".repeat(1000);
        assert!(!e.needs_summary(1000));
        e.content.push('x');
        assert!(e.needs_summary(1000));
        e.summary = "done".to_string();
        assert!(!e.needs_summary(1000));

        let video = entry("https://www.youtube.com/watch?v=abc");
        assert!(video.needs_summary(1000));
    }
}
