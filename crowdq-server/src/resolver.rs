//! Title/URL resolution
//!
//! Turns a submission into a display name and canonical URL. URL
//! submissions get their title from yt-dlp; free text is searched on the
//! YouTube Data API and the single best match is taken.

use async_trait::async_trait;
use crowdq_common::{Error, Result};
use serde::Deserialize;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;
use url::Url;

const YOUTUBE_SEARCH_URL: &str = "https://www.googleapis.com/youtube/v3/search";
const YOUTUBE_WATCH_URL: &str = "https://www.youtube.com/watch?v=";

/// Display name + canonical locator for a submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTrack {
    pub display_name: String,
    pub url: String,
}

/// Resolution collaborator
#[async_trait]
pub trait TrackResolver: Send + Sync {
    /// Display name for a well-formed URL
    ///
    /// Fails with [`Error::Resolution`].
    async fn title_for_url(&self, url: &str) -> Result<String>;

    /// Best match for a free-text query
    ///
    /// Fails with [`Error::NoResults`] or [`Error::Search`].
    async fn search(&self, query: &str) -> Result<ResolvedTrack>;
}

/// Whether `input` is an absolute URL with a scheme and a host
pub fn is_valid_url(input: &str) -> bool {
    match Url::parse(input) {
        Ok(url) => !url.scheme().is_empty() && url.host_str().is_some_and(|h| !h.is_empty()),
        Err(_) => false,
    }
}

/// Decode HTML entities in search result titles
///
/// Titles with malformed entities are returned unchanged.
pub fn unescape_html(input: &str) -> String {
    htmlescape::decode_html(input).unwrap_or_else(|e| {
        debug!("Keeping raw title {:?}: {:?}", input, e);
        input.to_string()
    })
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    id: SearchItemId,
    snippet: SearchSnippet,
}

#[derive(Debug, Deserialize)]
struct SearchItemId {
    #[serde(rename = "videoId")]
    video_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchSnippet {
    title: String,
}

/// YouTube search + yt-dlp title lookup
pub struct YoutubeResolver {
    client: reqwest::Client,
    api_key: Option<String>,
    ytdlp: String,
}

impl YoutubeResolver {
    pub fn new(api_key: Option<String>, ytdlp: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            api_key,
            ytdlp: ytdlp.into(),
        })
    }
}

#[async_trait]
impl TrackResolver for YoutubeResolver {
    async fn title_for_url(&self, url: &str) -> Result<String> {
        debug!("Resolving title for {}", url);
        let output = Command::new(&self.ytdlp)
            .args(["--print", "title", url])
            .output()
            .await
            .map_err(|e| Error::Resolution(format!("Failed to run {}: {}", self.ytdlp, e)))?;

        if !output.status.success() {
            return Err(Error::Resolution(format!(
                "{} exited with {}: {}",
                self.ytdlp,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let title = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if title.is_empty() {
            return Err(Error::Resolution(format!("No title reported for {}", url)));
        }
        Ok(title)
    }

    async fn search(&self, query: &str) -> Result<ResolvedTrack> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| Error::Search("API key not set".to_string()))?;

        debug!("Searching YouTube for {:?}", query);
        let response = self
            .client
            .get(YOUTUBE_SEARCH_URL)
            .query(&[
                ("part", "snippet"),
                ("q", query),
                ("type", "video"),
                ("maxResults", "1"),
                ("key", api_key),
            ])
            .send()
            .await
            .map_err(|e| Error::Search(format!("Search request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::Search(format!(
                "Search API returned {}",
                response.status()
            )));
        }

        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| Error::Search(format!("Failed to parse search response: {}", e)))?;

        first_match(body).ok_or_else(|| Error::NoResults(query.to_string()))
    }
}

fn first_match(body: SearchResponse) -> Option<ResolvedTrack> {
    body.items.into_iter().find_map(|item| {
        item.id.video_id.map(|id| ResolvedTrack {
            display_name: unescape_html(&item.snippet.title),
            url: format!("{}{}", YOUTUBE_WATCH_URL, id),
        })
    })
}
