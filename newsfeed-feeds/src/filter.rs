//! Spam and title cleanup

use newsfeed_core::NewsEntry;
use tracing::debug;

/// Promotional markers and entity remnants that disqualify a title
pub const DEFAULT_SPAM_TOKENS: &[&str] = &["deal", "&#"];

const TITLE_ENTITIES: &[(&str, &str)] = &[
    ("&quot;", "\""),
    ("&#039;", "'"),
    ("&#39;", "'"),
    ("&amp;", "&"),
];

/// Case-insensitive substring denylist on titles
#[derive(Debug, Clone)]
pub struct SpamFilter {
    tokens: Vec<String>,
}

impl SpamFilter {
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            tokens: tokens
                .into_iter()
                .map(|t| t.as_ref().trim().to_lowercase())
                .filter(|t| !t.is_empty())
                .collect(),
        }
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// Replace the handful of entities feeds commonly leave in titles
    pub fn clean_title(title: &str) -> String {
        TITLE_ENTITIES
            .iter()
            .fold(title.to_string(), |acc, (entity, ch)| acc.replace(entity, ch))
    }

    pub fn is_spam(&self, title: &str) -> bool {
        let lower = title.to_lowercase();
        self.tokens.iter().any(|token| lower.contains(token.as_str()))
    }

    /// Clean the entry's title, then drop it if the title is spam
    pub fn screen(&self, mut entry: NewsEntry) -> Option<NewsEntry> {
        entry.title = Self::clean_title(&entry.title);
        if self.is_spam(&entry.title) {
            debug!("Dropping spam entry {}: {}", entry.link(), entry.title);
            return None;
        }
        Some(entry)
    }
}

impl Default for SpamFilter {
    fn default() -> Self {
        Self::new(DEFAULT_SPAM_TOKENS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn entry(title: &str) -> NewsEntry {
        NewsEntry::new("https://example.com/a", title, Utc::now()).unwrap()
    }

    #[test]
    fn test_spam_is_case_insensitive() {
        let filter = SpamFilter::default();
        assert!(filter.is_spam("Black Friday DEALS on wheels"));
        assert!(filter.is_spam("Ideal gearing"));
        assert!(filter.is_spam("Broken &#8217; entity"));
        assert!(!filter.is_spam("Race Update"));
    }

    #[test]
    fn test_clean_title() {
        assert_eq!(
            SpamFilter::clean_title("&quot;Pogi&quot; wins, Vingegaard&#039;s reply"),
            "\"Pogi\" wins, Vingegaard's reply"
        );
    }

    #[test]
    fn test_known_entities_do_not_trip_the_filter() {
        let filter = SpamFilter::default();
        let screened = filter.screen(entry("It&#039;s a sprint stage")).unwrap();
        assert_eq!(screened.title, "It's a sprint stage");
    }

    #[test]
    fn test_screen_drops_spam() {
        let filter = SpamFilter::default();
        assert!(filter.screen(entry("Prime Day deal: cheap tyres")).is_none());
        assert!(filter.screen(entry("Unknown &#8230; remnant")).is_none());
    }

    #[test]
    fn test_custom_tokens() {
        let filter = SpamFilter::new(["  Sponsored ", ""]);
        assert_eq!(filter.tokens(), &["sponsored".to_string()]);
        assert!(filter.is_spam("SPONSORED: new bike"));
        assert!(!filter.is_spam("Cheap deal"));
    }
}
