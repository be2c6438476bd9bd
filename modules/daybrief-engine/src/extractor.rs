//! Extraction: provider output → candidate news items.
//!
//! The web and video branches go through the LLM with a schema-forced
//! response; feed entries map to candidates directly in code.

use ai_client::Claude;
use async_trait::async_trait;
use chrono::NaiveDate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::warn;

use daybrief_common::error::Result;
use daybrief_common::{CandidateItem, Channel, Feed, SourceType, Topic};

use crate::feeds::FeedEntry;
use crate::research::ResearchAnswer;

pub const DEFAULT_RELEVANCE: i32 = 5;
const MAX_EXTRACT_CHARS: usize = 30_000;

// --- LLM response types ---

/// What the LLM returns for each extracted story.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ExtractedStory {
    /// Headline of the story
    pub title: String,
    /// Two or three sentence summary
    pub summary: String,
    /// Relevance to a daily AI-news audience: 0 (noise) to 10 (major release)
    pub relevance_score: Option<i32>,
    /// URL of the originating article, when one is cited
    pub article_url: Option<String>,
}

/// The full extraction response from the LLM.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ExtractionResponse {
    #[serde(default, deserialize_with = "deserialize_stories")]
    pub stories: Vec<ExtractedStory>,
}

/// Handle the LLM returning stories as either a proper JSON array or a
/// stringified JSON array.
fn deserialize_stories<'de, D>(deserializer: D) -> std::result::Result<Vec<ExtractedStory>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de;
    let value = serde_json::Value::deserialize(deserializer)?;
    match value {
        serde_json::Value::Array(_) => serde_json::from_value(value).map_err(de::Error::custom),
        serde_json::Value::String(ref s) => serde_json::from_str(s).map_err(de::Error::custom),
        serde_json::Value::Null => Ok(Vec::new()),
        _ => Err(de::Error::custom("stories must be an array or JSON string")),
    }
}

// --- NewsExtractor trait ---

#[async_trait]
pub trait NewsExtractor: Send + Sync {
    /// Extract stories from a research answer. Citation URLs become
    /// article URLs where the model can attribute them.
    async fn extract_research(
        &self,
        run_date: NaiveDate,
        topic: &Topic,
        answer: &ResearchAnswer,
    ) -> Result<Vec<CandidateItem>>;

    /// Extract stories from a video transcript. A transcript covering
    /// several distinct stories yields several candidates, all carrying
    /// the video URL.
    async fn extract_transcript(
        &self,
        run_date: NaiveDate,
        channel: &Channel,
        video_url: &str,
        transcript: &str,
    ) -> Result<Vec<CandidateItem>>;
}

// --- Claude-backed implementation ---

pub struct LlmExtractor {
    claude: Claude,
    system_prompt: String,
}

impl LlmExtractor {
    pub fn new(anthropic_api_key: &str, model: &str) -> Self {
        Self {
            claude: Claude::new(anthropic_api_key, model),
            system_prompt: build_system_prompt(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.claude = self.claude.with_base_url(url);
        self
    }
}

fn build_system_prompt() -> String {
    r#"You are a news extractor for a daily AI and machine-learning digest.

Extract every distinct news story from the given text. A story is a concrete, reportable development — a release, a paper, a funding round, a policy move, an incident. Never merge separate stories into one entry, and never invent stories the text does not support.

## For each story

- **title**: a factual headline, no editorializing, no clickbait.
- **summary**: two or three sentences covering what happened, who did it, and why it matters.
- **relevance_score**: 0-10 for a daily AI-news audience:
  - 9-10: major model, product, or capability release
  - 7-8: significant research results, large funding or acquisition, regulatory action
  - 4-6: routine coverage, incremental updates, notable opinions
  - 0-3: marginal mentions, speculation, recycled news
- **article_url**: only when the text cites a concrete source URL for this specific story; otherwise null.

## Skip entirely

- Advertisements, sponsorships, and self-promotion
- Channel or site housekeeping ("like and subscribe", navigation text)
- Stories with nothing to report yet ("X may announce...")

If the text contains no extractable stories, return an empty array."#
        .to_string()
}

#[async_trait]
impl NewsExtractor for LlmExtractor {
    async fn extract_research(
        &self,
        run_date: NaiveDate,
        topic: &Topic,
        answer: &ResearchAnswer,
    ) -> Result<Vec<CandidateItem>> {
        let sources = answer
            .citations
            .iter()
            .map(|c| format!("- {} ({})", c.title, c.url))
            .collect::<Vec<_>>()
            .join("\n");

        let user_prompt = format!(
            "Extract all AI news stories from this research answer.\n\n\
             Topic: {}\nDate: {}\n\n---\n\n{}\n\nCited sources:\n{}",
            topic.topic,
            run_date,
            truncate_chars(&answer.answer, MAX_EXTRACT_CHARS),
            sources,
        );

        let response: ExtractionResponse = self
            .claude
            .extract(&self.system_prompt, &user_prompt)
            .await?;

        Ok(stories_to_candidates(
            response.stories,
            SourceType::Web,
            &topic.topic,
            "",
            None,
            &answer.answer,
        ))
    }

    async fn extract_transcript(
        &self,
        run_date: NaiveDate,
        channel: &Channel,
        video_url: &str,
        transcript: &str,
    ) -> Result<Vec<CandidateItem>> {
        let user_prompt = format!(
            "Extract all AI news stories from this video transcript. A single \
             transcript often covers several distinct stories; return each one \
             separately.\n\nChannel: {}\nVideo: {}\nDate: {}\n\n---\n\n{}",
            channel.name,
            video_url,
            run_date,
            truncate_chars(transcript, MAX_EXTRACT_CHARS),
        );

        let response: ExtractionResponse = self
            .claude
            .extract(&self.system_prompt, &user_prompt)
            .await?;

        Ok(stories_to_candidates(
            response.stories,
            SourceType::Video,
            &channel.name,
            &channel.url,
            Some(video_url),
            transcript,
        ))
    }
}

/// Turn raw LLM stories into candidates: junk filtered, relevance
/// defaulted and clamped, malformed entries dropped.
pub(crate) fn stories_to_candidates(
    stories: Vec<ExtractedStory>,
    source_type: SourceType,
    source_name: &str,
    source_url: &str,
    article_url_override: Option<&str>,
    raw_content: &str,
) -> Vec<CandidateItem> {
    let junk = ["unable to extract", "page not found", "error loading"];

    let mut candidates = Vec::new();
    for story in stories {
        let title_lower = story.title.to_lowercase();
        if junk.iter().any(|j| title_lower.contains(j)) {
            warn!(title = story.title, "Filtered junk story from extraction");
            continue;
        }

        let relevance_score = story
            .relevance_score
            .unwrap_or(DEFAULT_RELEVANCE)
            .clamp(0, 10);

        let article_url = article_url_override
            .map(str::to_string)
            .or(story.article_url)
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty());

        let source_url = if source_url.is_empty() {
            article_url.clone().unwrap_or_default()
        } else {
            source_url.to_string()
        };

        let candidate = CandidateItem {
            title: story.title,
            summary: story.summary,
            source_type,
            source_name: source_name.to_string(),
            source_url,
            article_url,
            raw_content: raw_content.to_string(),
            relevance_score,
        };

        if !candidate.is_well_formed() {
            warn!(title = candidate.title, "Dropping malformed candidate");
            continue;
        }
        candidates.push(candidate);
    }
    candidates
}

/// Feed entries map to candidates directly: one candidate per entry, the
/// entry link as the article URL, default relevance.
pub fn candidates_from_entries(feed: &Feed, entries: &[FeedEntry]) -> Vec<CandidateItem> {
    entries
        .iter()
        .filter_map(|entry| {
            let summary = if entry.summary.trim().is_empty() {
                entry.title.clone()
            } else {
                entry.summary.clone()
            };

            let candidate = CandidateItem {
                title: entry.title.clone(),
                summary,
                source_type: SourceType::Feed,
                source_name: feed.name.clone(),
                source_url: feed.url.clone(),
                article_url: Some(entry.url.clone()),
                raw_content: format!("{}\n\n{}", entry.title, entry.summary),
                relevance_score: DEFAULT_RELEVANCE,
            };
            candidate.is_well_formed().then_some(candidate)
        })
        .collect()
}

/// Truncate to at most `max` bytes, backing up to a char boundary.
fn truncate_chars(content: &str, max: usize) -> &str {
    if content.len() <= max {
        return content;
    }
    let mut end = max;
    while !content.is_char_boundary(end) {
        end -= 1;
    }
    &content[..end]
}
