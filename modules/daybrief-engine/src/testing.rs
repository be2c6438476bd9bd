//! Test fakes for the pipeline trait boundaries.
//!
//! - `StaticResearch` / `FailingResearch` (ResearchProvider)
//! - `StaticFeeds` (FeedFetcher)
//! - `StaticTranscripts` / `HangingTranscripts` (TranscriptProvider)
//! - `LineExtractor` (NewsExtractor) — parses `title|summary|score|url`
//!   lines, so fixtures stay readable and extraction stays deterministic
//! - `StaticSummary` / `FailingSummary` (SummaryWriter)
//!
//! No network, no database, no Docker.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;

use daybrief_common::error::{DaybriefError, Result};
use daybrief_common::{CandidateItem, Channel, Feed, NewsItem, SourceType, Topic};

use crate::extractor::{stories_to_candidates, ExtractedStory, NewsExtractor};
use crate::feeds::{FeedEntry, FeedFetcher};
use crate::research::{Citation, ResearchAnswer, ResearchProvider};
use crate::synthesizer::SummaryWriter;
use crate::transcripts::{TranscriptProvider, VideoRef};

// --- Source builders ---

pub fn topic(id: i32, text: &str) -> Topic {
    Topic {
        id,
        topic: text.to_string(),
        keywords: Vec::new(),
        priority: 5,
        active: true,
    }
}

pub fn feed(id: i32, name: &str, url: &str) -> Feed {
    Feed {
        id,
        name: name.to_string(),
        url: url.to_string(),
        active: true,
    }
}

pub fn channel(id: i32, name: &str, external_id: &str) -> Channel {
    Channel {
        id,
        name: name.to_string(),
        url: format!("https://video.example/{external_id}"),
        external_id: external_id.to_string(),
        active: true,
    }
}

// --- Research fakes ---

/// Answers scripted per query; unscripted queries are a provider bug.
#[derive(Default)]
pub struct StaticResearch {
    answers: HashMap<String, ResearchAnswer>,
}

impl StaticResearch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn answer(mut self, query: &str, answer: &str, citations: &[(&str, &str)]) -> Self {
        self.answers.insert(
            query.to_string(),
            ResearchAnswer {
                answer: answer.to_string(),
                citations: citations
                    .iter()
                    .map(|(url, title)| Citation {
                        url: url.to_string(),
                        title: title.to_string(),
                        snippet: String::new(),
                    })
                    .collect(),
            },
        );
        self
    }
}

#[async_trait]
impl ResearchProvider for StaticResearch {
    async fn research(&self, query: &str) -> Result<ResearchAnswer> {
        self.answers
            .get(query)
            .cloned()
            .ok_or_else(|| DaybriefError::ProviderFatal(format!("no scripted answer for {query:?}")))
    }
}

/// Always fails, transiently or fatally.
pub struct FailingResearch {
    pub transient: bool,
}

#[async_trait]
impl ResearchProvider for FailingResearch {
    async fn research(&self, _query: &str) -> Result<ResearchAnswer> {
        if self.transient {
            Err(DaybriefError::ProviderTransient("HTTP 500".to_string()))
        } else {
            Err(DaybriefError::ProviderFatal("HTTP 401".to_string()))
        }
    }
}

// --- Feed fakes ---

#[derive(Default)]
pub struct StaticFeeds {
    feeds: HashMap<String, Vec<FeedEntry>>,
}

impl StaticFeeds {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries as `(url, title, summary)`, already newest-first.
    pub fn feed(mut self, feed_url: &str, entries: &[(&str, &str, &str)]) -> Self {
        self.feeds.insert(
            feed_url.to_string(),
            entries
                .iter()
                .map(|(url, title, summary)| FeedEntry {
                    url: url.to_string(),
                    title: title.to_string(),
                    summary: summary.to_string(),
                    published_at: None,
                })
                .collect(),
        );
        self
    }
}

#[async_trait]
impl FeedFetcher for StaticFeeds {
    async fn fetch(&self, feed_url: &str, limit: usize) -> Result<Vec<FeedEntry>> {
        let entries = self
            .feeds
            .get(feed_url)
            .cloned()
            .ok_or_else(|| DaybriefError::ProviderFatal(format!("no scripted feed {feed_url:?}")))?;
        Ok(entries.into_iter().take(limit).collect())
    }
}

// --- Transcript fakes ---

#[derive(Default)]
pub struct StaticTranscripts {
    videos: HashMap<String, Vec<VideoRef>>,
    transcripts: HashMap<String, String>,
}

impl StaticTranscripts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn video(mut self, channel_external_id: &str, video_id: &str, transcript: Option<&str>) -> Self {
        self.videos
            .entry(channel_external_id.to_string())
            .or_default()
            .push(VideoRef {
                video_id: video_id.to_string(),
                url: format!("https://video.example/watch/{video_id}"),
                title: None,
            });
        if let Some(text) = transcript {
            self.transcripts.insert(video_id.to_string(), text.to_string());
        }
        self
    }
}

#[async_trait]
impl TranscriptProvider for StaticTranscripts {
    async fn recent_videos(&self, channel: &Channel, limit: u32) -> Result<Vec<VideoRef>> {
        let videos = self
            .videos
            .get(&channel.external_id)
            .cloned()
            .ok_or_else(|| {
                DaybriefError::ProviderFatal(format!("no scripted channel {:?}", channel.external_id))
            })?;
        Ok(videos.into_iter().take(limit as usize).collect())
    }

    async fn transcript(&self, video_id: &str) -> Result<Option<String>> {
        Ok(self.transcripts.get(video_id).cloned())
    }
}

/// Never answers inside any sane deadline. For cancellation tests.
pub struct HangingTranscripts;

#[async_trait]
impl TranscriptProvider for HangingTranscripts {
    async fn recent_videos(&self, _channel: &Channel, _limit: u32) -> Result<Vec<VideoRef>> {
        tokio::time::sleep(Duration::from_secs(86_400)).await;
        Ok(Vec::new())
    }

    async fn transcript(&self, _video_id: &str) -> Result<Option<String>> {
        tokio::time::sleep(Duration::from_secs(86_400)).await;
        Ok(None)
    }
}

// --- Extractor fake ---

/// Deterministic extractor: one story per `title|summary|score|url` line.
/// Score and url accept `-` for "absent". Runs the same finalization as
/// the real extractor (junk filter, clamping, overrides).
pub struct LineExtractor;

fn parse_stories(text: &str) -> Vec<ExtractedStory> {
    text.lines()
        .filter_map(|line| {
            let mut parts = line.splitn(4, '|');
            let title = parts.next()?.trim();
            let summary = parts.next()?.trim();
            if title.is_empty() && summary.is_empty() {
                return None;
            }
            let score = parts
                .next()
                .map(str::trim)
                .filter(|s| !s.is_empty() && *s != "-")
                .and_then(|s| s.parse().ok());
            let url = parts
                .next()
                .map(str::trim)
                .filter(|s| !s.is_empty() && *s != "-")
                .map(str::to_string);
            Some(ExtractedStory {
                title: title.to_string(),
                summary: summary.to_string(),
                relevance_score: score,
                article_url: url,
            })
        })
        .collect()
}

#[async_trait]
impl NewsExtractor for LineExtractor {
    async fn extract_research(
        &self,
        _run_date: NaiveDate,
        topic: &Topic,
        answer: &ResearchAnswer,
    ) -> Result<Vec<CandidateItem>> {
        Ok(stories_to_candidates(
            parse_stories(&answer.answer),
            SourceType::Web,
            &topic.topic,
            "",
            None,
            &answer.answer,
        ))
    }

    async fn extract_transcript(
        &self,
        _run_date: NaiveDate,
        channel: &Channel,
        video_url: &str,
        transcript: &str,
    ) -> Result<Vec<CandidateItem>> {
        Ok(stories_to_candidates(
            parse_stories(transcript),
            SourceType::Video,
            &channel.name,
            &channel.url,
            Some(video_url),
            transcript,
        ))
    }
}

// --- Summary fakes ---

pub struct StaticSummary(pub String);

#[async_trait]
impl SummaryWriter for StaticSummary {
    async fn compose(&self, _run_date: NaiveDate, _items: &[NewsItem]) -> anyhow::Result<String> {
        Ok(self.0.clone())
    }
}

pub struct FailingSummary;

#[async_trait]
impl SummaryWriter for FailingSummary {
    async fn compose(&self, _run_date: NaiveDate, _items: &[NewsItem]) -> anyhow::Result<String> {
        anyhow::bail!("summary model unavailable")
    }
}
