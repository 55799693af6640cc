//! Raw feed item to `NewsEntry` mapping

use chrono::{DateTime, Duration, Utc};
use newsfeed_core::{CoreError, NewsEntry};

use crate::fetcher::RawFeedItem;
use crate::html::sanitize_html;

/// Source dates this close to the ingestion instant were stamped at fetch time
const SAME_INSTANT_TOLERANCE: Duration = Duration::seconds(1);

/// Why a raw item did not become an entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    MissingLink,
    MissingTitle,
    InvalidLink(String),
}

impl From<CoreError> for Rejection {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::MissingTitle(_) => Rejection::MissingTitle,
            CoreError::InvalidLink(link) => Rejection::InvalidLink(link),
            other => Rejection::InvalidLink(other.to_string()),
        }
    }
}

/// Map a raw feed item to a candidate entry ingested at `now`
pub fn normalize(item: &RawFeedItem, now: DateTime<Utc>) -> Result<NewsEntry, Rejection> {
    let link = non_blank(item.link.as_deref()).ok_or(Rejection::MissingLink)?;
    let title = non_blank(item.title.as_deref()).ok_or(Rejection::MissingTitle)?;

    let mut entry = NewsEntry::new(link, title, now)?;

    let body = body_of(item);
    entry.content = if entry.is_video_host() {
        body.trim().to_string()
    } else {
        sanitize_html(&body)
    };

    let published = match item.published {
        Some(source) if (source - now).abs() >= SAME_INSTANT_TOLERANCE => source,
        _ => now,
    };
    entry.set_published_at(published, now);

    Ok(entry)
}

/// Content blocks joined, or the description when there are none
fn body_of(item: &RawFeedItem) -> String {
    let content = item.contents.concat();
    if !content.trim().is_empty() {
        return content;
    }
    item.description.clone().unwrap_or_default()
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
