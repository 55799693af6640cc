//! YouTube caption transcripts
//!
//! The watch page embeds a `captionTracks` JSON array; each track points at
//! a timedtext XML document whose `<text>` nodes hold the caption lines.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::error::EnrichmentError;

const WATCH_URL: &str = "https://www.youtube.com/watch?v=";

const CAPTION_TRACKS_KEY: &str = "\"captionTracks\":";

static TEXT_NODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<text[^>]*>(.*?)</text>").unwrap());

/// Source of transcripts for video entries
#[async_trait]
pub trait TranscriptSource: Send + Sync {
    /// Transcript text for a video, `None` when the video has none
    async fn list_transcripts(&self, video_id: &str) -> Result<Option<String>, EnrichmentError>;
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CaptionTrack {
    base_url: String,
    language_code: String,
    /// `asr` for auto-generated captions
    #[serde(default)]
    kind: Option<String>,
}

/// Scrapes caption tracks from YouTube watch pages
#[derive(Debug, Clone)]
pub struct YoutubeTranscriptClient {
    client: Client,
    languages: Vec<String>,
}

impl YoutubeTranscriptClient {
    pub fn new() -> Result<Self, EnrichmentError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(20))
            .build()
            .map_err(|e| EnrichmentError::InvalidConfig(e.to_string()))?;

        Ok(Self {
            client,
            languages: vec!["en".to_string()],
        })
    }

    /// Preferred caption languages, in order
    pub fn with_languages(mut self, languages: &[&str]) -> Self {
        self.languages = languages.iter().map(|l| l.to_string()).collect();
        self
    }

    async fn get_text(&self, url: &str) -> Result<String, EnrichmentError> {
        let response = self
            .client
            .get(url)
            .header("Accept-Language", "en-US,en;q=0.9")
            .send()
            .await
            .map_err(|e| EnrichmentError::transcript(e.to_string()))?;

        if !response.status().is_success() {
            return Err(EnrichmentError::transcript(format!(
                "status {} for {}",
                response.status().as_u16(),
                url
            )));
        }

        response
            .text()
            .await
            .map_err(|e| EnrichmentError::transcript(e.to_string()))
    }
}

#[async_trait]
impl TranscriptSource for YoutubeTranscriptClient {
    #[instrument(skip(self))]
    async fn list_transcripts(&self, video_id: &str) -> Result<Option<String>, EnrichmentError> {
        let page = self.get_text(&format!("{}{}", WATCH_URL, video_id)).await?;

        let tracks = match extract_caption_tracks(&page)? {
            Some(tracks) => tracks,
            None => {
                debug!("No caption tracks for video {}", video_id);
                return Ok(None);
            }
        };

        let Some(track) = pick_track(&tracks, &self.languages) else {
            debug!("No caption track in {:?} for video {}", self.languages, video_id);
            return Ok(None);
        };

        let xml = self.get_text(&track.base_url).await?;
        let text = transcript_text(&xml);
        if text.is_empty() {
            return Ok(None);
        }
        Ok(Some(text))
    }
}

fn extract_caption_tracks(page: &str) -> Result<Option<Vec<CaptionTrack>>, EnrichmentError> {
    let Some(pos) = page.find(CAPTION_TRACKS_KEY) else {
        return Ok(None);
    };
    let rest = &page[pos + CAPTION_TRACKS_KEY.len()..];

    // Parse one JSON value and ignore the rest of the page
    let mut stream = serde_json::Deserializer::from_str(rest).into_iter::<Vec<CaptionTrack>>();
    match stream.next() {
        Some(Ok(tracks)) => Ok(Some(tracks)),
        Some(Err(e)) => Err(EnrichmentError::transcript(format!(
            "bad caption tracks: {}",
            e
        ))),
        None => Ok(None),
    }
}

/// First preferred language wins; manual captions beat auto-generated ones
fn pick_track<'a>(tracks: &'a [CaptionTrack], languages: &[String]) -> Option<&'a CaptionTrack> {
    languages.iter().find_map(|lang| {
        let matching = |t: &&CaptionTrack| t.language_code.starts_with(lang.as_str());
        tracks
            .iter()
            .filter(matching)
            .find(|t| t.kind.as_deref() != Some("asr"))
            .or_else(|| tracks.iter().find(matching))
    })
}

/// Caption lines joined into one decoded text
fn transcript_text(xml: &str) -> String {
    TEXT_NODE
        .captures_iter(xml)
        .filter_map(|c| c.get(1))
        .map(|m| decode_entities(m.as_str()))
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Timedtext bodies are entity-encoded twice (`&amp;#39;`)
fn decode_entities(text: &str) -> String {
    let once = htmlescape::decode_html(text).unwrap_or_else(|_| text.to_string());
    htmlescape::decode_html(&once).unwrap_or(once)
}
