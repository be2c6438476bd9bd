//! RSS/Atom fetching for the feed gatherer.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::info;

use daybrief_common::error::{DaybriefError, Result};

use crate::research::provider_status_error;

// --- FeedFetcher trait ---

#[async_trait]
pub trait FeedFetcher: Send + Sync {
    /// Fetch and parse a feed, returning its most recent entries,
    /// newest first, at most `limit`.
    async fn fetch(&self, feed_url: &str, limit: usize) -> Result<Vec<FeedEntry>>;
}

#[derive(Debug, Clone)]
pub struct FeedEntry {
    pub url: String,
    pub title: String,
    pub summary: String,
    pub published_at: Option<DateTime<Utc>>,
}

// --- HTTP implementation ---

pub struct HttpFeedFetcher {
    client: reqwest::Client,
}

impl HttpFeedFetcher {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .expect("Failed to build feed HTTP client");
        Self { client }
    }
}

impl Default for HttpFeedFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FeedFetcher for HttpFeedFetcher {
    async fn fetch(&self, feed_url: &str, limit: usize) -> Result<Vec<FeedEntry>> {
        let resp = self
            .client
            .get(feed_url)
            .header("User-Agent", "daybrief/0.1")
            .send()
            .await
            .map_err(|e| DaybriefError::ProviderTransient(format!("feed fetch failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(provider_status_error("feed", status.as_u16(), &text));
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| DaybriefError::ProviderTransient(format!("feed body read failed: {e}")))?;

        let entries = parse_entries(&bytes, limit)?;
        info!(feed_url, entries = entries.len(), "Feed parsed");
        Ok(entries)
    }
}

/// Parse a feed document into its most recent entries, newest first.
pub(crate) fn parse_entries(bytes: &[u8], limit: usize) -> Result<Vec<FeedEntry>> {
    let feed = feed_rs::parser::parse(bytes)
        .map_err(|e| DaybriefError::ProviderFatal(format!("feed parse failed: {e}")))?;

    let mut entries: Vec<FeedEntry> = feed
        .entries
        .into_iter()
        .filter_map(|entry| {
            let url = entry
                .links
                .first()
                .map(|l| l.href.clone())
                .or_else(|| entry.id.starts_with("http").then(|| entry.id.clone()))?;

            let title = entry.title.map(|t| t.content).unwrap_or_default();
            let summary = entry.summary.map(|s| s.content).unwrap_or_default();
            let published_at = entry
                .published
                .or(entry.updated)
                .map(|dt| dt.with_timezone(&Utc));

            Some(FeedEntry {
                url,
                title,
                summary,
                published_at,
            })
        })
        .collect();

    entries.sort_by(|a, b| b.published_at.cmp(&a.published_at));
    entries.truncate(limit);
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    const RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Example AI Feed</title>
    <item>
      <title>Older story</title>
      <link>https://example.com/old</link>
      <description>Old description</description>
      <pubDate>Sun, 01 Jun 2025 10:00:00 GMT</pubDate>
    </item>
    <item>
      <title>Newer story</title>
      <link>https://example.com/new</link>
      <description>New description</description>
      <pubDate>Mon, 02 Jun 2025 10:00:00 GMT</pubDate>
    </item>
  </channel>
</rss>"#;

    #[test]
    fn entries_come_back_newest_first() {
        let entries = parse_entries(RSS.as_bytes(), 10).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].url, "https://example.com/new");
        assert_eq!(entries[0].title, "Newer story");
        assert_eq!(entries[0].summary, "New description");
        assert_eq!(entries[1].url, "https://example.com/old");
    }

    #[test]
    fn limit_keeps_only_the_most_recent() {
        let entries = parse_entries(RSS.as_bytes(), 1).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].url, "https://example.com/new");
    }

    #[test]
    fn garbage_is_a_fatal_parse_error() {
        let err = parse_entries(b"not a feed", 10).unwrap_err();
        assert!(matches!(err, DaybriefError::ProviderFatal(_)));
    }
}
