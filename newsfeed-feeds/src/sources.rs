//! Feed source configuration
//!
//! Each source is a feed URL with the language tag assigned to every entry
//! it produces. The built-in list covers English and German cycling sites
//! and YouTube channels; a TOML feeds file can replace it.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::FeedError;

/// A feed URL and the language of its entries
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FeedSource {
    pub url: String,
    pub language: String,
}

impl FeedSource {
    pub fn new(url: &str, language: &str) -> Self {
        Self {
            url: url.to_string(),
            language: language.to_string(),
        }
    }
}

/// Curated list of cycling feeds
pub fn get_curated_feeds() -> Vec<FeedSource> {
    vec![
        // English road and racing news
        FeedSource::new("https://bikerumor.com/feed/", "en"),
        FeedSource::new("https://bikesnobnyc.com/feed/", "en"),
        FeedSource::new("https://cycling.today/feed/", "en"),
        FeedSource::new("https://escapecollective.com/feed/", "en"),
        FeedSource::new("https://feeds.sbs.com.au/cycling-central", "en"),
        FeedSource::new("https://granfondo-cycling.com/feed/", "en"),
        FeedSource::new("https://inrng.com/feed", "en"),
        FeedSource::new("https://intheknowcycling.com/feed/", "en"),
        FeedSource::new("https://pezcyclingnews.com/feed/", "en"),
        FeedSource::new("https://procyclinguk.com/feed/", "en"),
        FeedSource::new("https://road.cc/rss", "en"),
        FeedSource::new("https://www.bikeradar.com/road/feed/", "en"),
        FeedSource::new("https://www.cyclist.co.uk/feeds/all", "en"),
        FeedSource::new("https://www.podiumcafe.com/rss/current.xml", "en"),
        FeedSource::new("https://www.velonews.com/feed/", "en"),
        // Training and indoor riding
        FeedSource::new("https://joefrieltraining.com/feed/", "en"),
        FeedSource::new("https://www.fasttalklabs.com/feed/", "en"),
        FeedSource::new("https://www.trainerroad.com/blog/feed/", "en"),
        FeedSource::new("https://zwiftinsider.com/feed/", "en"),
        FeedSource::new("https://forum.intervals.icu/latest.rss", "en"),
        // Teams
        FeedSource::new("https://bahraincyclingteam.com/news/feed/", "en"),
        FeedSource::new("http://www.uaeteamemirates.com/news-and-media/feed/", "en"),
        // German language
        FeedSource::new("http://feeds.feedburner.com/ilovecyclingde", "de"),
        FeedSource::new("http://feeds.feedburner.com/shutuplegsde", "de"),
        FeedSource::new("https://challenge-magazin.com/feed/", "de"),
        FeedSource::new("https://classic.rad-net.de/html/feed.xml", "de"),
        FeedSource::new("https://gruppetto-magazin.ch/api/rss-feed", "de"),
        FeedSource::new("https://radamring.de/feed/", "de"),
        FeedSource::new("https://radsportverband-nrw.de/feed/", "de"),
        FeedSource::new("https://roadcycling.de/feed", "de"),
        FeedSource::new("https://www.radsport-news.com/rss.xml", "de"),
        FeedSource::new("https://www.radsport-rennrad.de/feed/", "de"),
        FeedSource::new("https://www.rennrad-news.de/news/feed/", "de"),
        FeedSource::new("https://www.swiss-cycling.ch/de/feed", "de"),
        FeedSource::new("https://www.velomotion.de/magazin/feed", "de"),
        // YouTube channels (Atom)
        FeedSource::new(
            "https://www.youtube.com/feeds/videos.xml?channel_id=UC77UtoyivVHkpApL0wGfH5w",
            "en",
        ),
        FeedSource::new(
            "https://www.youtube.com/feeds/videos.xml?channel_id=UCH9263dSaOHFe25dkyGAu3Q",
            "en",
        ),
        FeedSource::new(
            "https://www.youtube.com/feeds/videos.xml?channel_id=UCIf1xvRN8pzyd_VfLgj_dow",
            "en",
        ),
        FeedSource::new(
            "https://www.youtube.com/feeds/videos.xml?channel_id=UCYuKCZ35_lrDmFj2gNuAwZw",
            "en",
        ),
        FeedSource::new(
            "https://www.youtube.com/feeds/videos.xml?channel_id=UCuTaETsuCOkJ0H_GAztWt0Q",
            "en",
        ),
    ]
}

#[derive(Debug, Deserialize)]
struct FeedsFile {
    #[serde(default, rename = "feed")]
    feeds: Vec<FeedSource>,
}

/// Parse a feeds file of `[[feed]]` tables with `url` and `language` keys.
///
/// Duplicate URLs keep their first occurrence.
pub fn parse_feeds_toml(text: &str) -> Result<Vec<FeedSource>, FeedError> {
    let file: FeedsFile =
        toml::from_str(text).map_err(|e| FeedError::InvalidConfig(e.to_string()))?;

    let mut seen = HashSet::new();
    let mut feeds = Vec::with_capacity(file.feeds.len());

    for feed in file.feeds {
        let url = feed.url.trim().to_string();
        let language = feed.language.trim().to_string();

        if !url.starts_with("http") {
            return Err(FeedError::InvalidConfig(format!(
                "feed url must start with http: {}",
                url
            )));
        }
        if language.is_empty() {
            return Err(FeedError::InvalidConfig(format!(
                "missing language for {}",
                url
            )));
        }
        if !seen.insert(url.clone()) {
            warn!("Duplicate feed url in feeds file: {}", url);
            continue;
        }

        feeds.push(FeedSource { url, language });
    }

    Ok(feeds)
}

/// Load feed sources from a TOML file
pub fn load_feeds_file(path: impl AsRef<Path>) -> Result<Vec<FeedSource>, FeedError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)?;
    let feeds = parse_feeds_toml(&text)?;
    info!("Loaded {} feeds from {}", feeds.len(), path.display());
    Ok(feeds)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_curated_feeds() {
        let feeds = get_curated_feeds();
        assert!(!feeds.is_empty());
        assert!(feeds.iter().all(|f| f.url.starts_with("http")));
        assert!(feeds.iter().any(|f| f.language == "de"));
        assert!(feeds.iter().any(|f| f.url.contains("youtube.com/feeds")));

        let unique: HashSet<_> = feeds.iter().map(|f| &f.url).collect();
        assert_eq!(unique.len(), feeds.len());
    }

    #[test]
    fn test_parse_feeds_toml() {
        let text = r#"
[[feed]]
url = "https://inrng.com/feed"
language = "en"

[[feed]]
url = " https://roadcycling.de/feed "
language = "de"

[[feed]]
url = "https://inrng.com/feed"
language = "en"
"#;
        let feeds = parse_feeds_toml(text).unwrap();
        assert_eq!(
            feeds,
            vec![
                FeedSource::new("https://inrng.com/feed", "en"),
                FeedSource::new("https://roadcycling.de/feed", "de"),
            ]
        );
    }

    #[test]
    fn test_parse_feeds_toml_rejects_bad_entries() {
        let bad_url = "[[feed]]\nurl = \"ftp://x\"\nlanguage = \"en\"\n";
        assert!(matches!(
            parse_feeds_toml(bad_url),
            Err(FeedError::InvalidConfig(_))
        ));

        let no_language = "[[feed]]\nurl = \"https://x.com/feed\"\nlanguage = \"\"\n";
        assert!(matches!(
            parse_feeds_toml(no_language),
            Err(FeedError::InvalidConfig(_))
        ));

        assert!(parse_feeds_toml("not toml [").is_err());
    }

    #[test]
    fn test_empty_feeds_file() {
        assert!(parse_feeds_toml("").unwrap().is_empty());
    }
}
