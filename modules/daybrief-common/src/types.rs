use chrono::{DateTime, NaiveDate, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// --- Source entities (seeded externally, read-only to the pipeline) ---

/// A research topic driving web-research queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Topic {
    pub id: i32,
    pub topic: String,
    pub keywords: Vec<String>,
    /// 1 (lowest) to 10 (highest). Topics are gathered in priority order.
    pub priority: i32,
    pub active: bool,
}

impl Topic {
    /// The research query sent to the web-research provider.
    pub fn query(&self) -> String {
        if self.keywords.is_empty() {
            self.topic.clone()
        } else {
            format!("{} {}", self.topic, self.keywords.join(" "))
        }
    }
}

/// An RSS/Atom feed to pull entries from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feed {
    pub id: i32,
    pub name: String,
    pub url: String,
    pub active: bool,
}

/// A video channel whose recent transcripts are scanned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    pub id: i32,
    pub name: String,
    pub url: String,
    pub external_id: String,
    pub active: bool,
}

/// All active sources, loaded once at run start.
#[derive(Debug, Clone, Default)]
pub struct SourceSet {
    /// Sorted by priority descending.
    pub topics: Vec<Topic>,
    pub feeds: Vec<Feed>,
    pub channels: Vec<Channel>,
}

// --- Run-time entities ---

/// Which gatherer branch produced an item. Set once at extraction,
/// never changed by later merges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Web,
    Feed,
    Video,
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceType::Web => write!(f, "web"),
            SourceType::Feed => write!(f, "feed"),
            SourceType::Video => write!(f, "video"),
        }
    }
}

impl std::str::FromStr for SourceType {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "web" => Ok(Self::Web),
            "feed" => Ok(Self::Feed),
            "video" => Ok(Self::Video),
            other => Err(format!("unknown SourceType: {other}")),
        }
    }
}

/// Identity of a single pipeline run. Immutable; created at workflow entry.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_date: NaiveDate,
    pub run_id: String,
    pub started_at: DateTime<Utc>,
}

impl RunContext {
    pub fn new(run_date: NaiveDate) -> Self {
        Self {
            run_date,
            run_id: Uuid::new_v4().to_string(),
            started_at: Utc::now(),
        }
    }

    /// Today's date in the run's local time zone.
    pub fn today() -> Self {
        Self::new(chrono::Local::now().date_naive())
    }
}

/// A news item proposed by an extractor. Lives only inside a gatherer
/// branch: it is either persisted or dropped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateItem {
    pub title: String,
    pub summary: String,
    pub source_type: SourceType,
    pub source_name: String,
    pub source_url: String,
    /// Stable origin link when the provider supplies one.
    pub article_url: Option<String>,
    pub raw_content: String,
    /// 0–10, defaulting to 5 when the extractor cannot score.
    pub relevance_score: i32,
}

impl CandidateItem {
    /// Extractor output rules: no empty title or summary, score in range.
    pub fn is_well_formed(&self) -> bool {
        !self.title.trim().is_empty()
            && !self.summary.trim().is_empty()
            && (0..=10).contains(&self.relevance_score)
    }

    /// Fingerprint identifying this candidate within a persist invocation.
    /// Retries of the same invocation reproduce the same fingerprint and
    /// are skipped by the store.
    pub fn fingerprint(&self, invocation: &str) -> String {
        let key = format!(
            "{invocation}\n{}\n{}\n{}",
            self.source_type,
            self.title,
            self.article_url.as_deref().unwrap_or("")
        );
        format!("{:016x}", crate::content_hash(&key))
    }
}

/// A persisted, deduplicated news item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsItem {
    pub id: i64,
    pub run_date: NaiveDate,
    pub title: String,
    pub summary: String,
    pub relevance_score: i32,
    /// How many times a duplicate of this item was seen today. Never
    /// below 1, never decremented.
    pub mention_count: i32,
    pub source_type: SourceType,
    pub source_url: String,
    pub source_name: String,
    pub article_url: Option<String>,
    pub raw_content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The final ranked output of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Digest {
    pub items: Vec<NewsItem>,
    pub summary: String,
    pub run_date: NaiveDate,
    pub generated_at: DateTime<Utc>,
}

/// How a run ended, for the bookkeeping row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Completed,
    DeadlineExceeded,
    SynthesizeFailed,
}

impl std::fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunOutcome::Completed => write!(f, "completed"),
            RunOutcome::DeadlineExceeded => write!(f, "deadline_exceeded"),
            RunOutcome::SynthesizeFailed => write!(f, "synthesize_failed"),
        }
    }
}

impl std::str::FromStr for RunOutcome {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "completed" => Ok(Self::Completed),
            "deadline_exceeded" => Ok(Self::DeadlineExceeded),
            "synthesize_failed" => Ok(Self::SynthesizeFailed),
            other => Err(format!("unknown RunOutcome: {other}")),
        }
    }
}

/// Aggregate counters reported when a run finishes.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunTotals {
    pub items_inserted: i32,
    pub mentions_incremented: i32,
    pub sources_failed: i32,
}

/// Bookkeeping row for one pipeline run.
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub run_id: String,
    pub run_date: NaiveDate,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub outcome: Option<RunOutcome>,
    pub totals: RunTotals,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(title: &str, summary: &str, score: i32) -> CandidateItem {
        CandidateItem {
            title: title.to_string(),
            summary: summary.to_string(),
            source_type: SourceType::Web,
            source_name: "test".to_string(),
            source_url: "https://example.com".to_string(),
            article_url: None,
            raw_content: String::new(),
            relevance_score: score,
        }
    }

    #[test]
    fn topic_query_joins_keywords() {
        let topic = Topic {
            id: 1,
            topic: "LLM releases".to_string(),
            keywords: vec!["GPT".to_string(), "Claude".to_string()],
            priority: 8,
            active: true,
        };
        assert_eq!(topic.query(), "LLM releases GPT Claude");
    }

    #[test]
    fn well_formed_rejects_empty_title_and_summary() {
        assert!(candidate("Title", "Summary", 5).is_well_formed());
        assert!(!candidate("", "Summary", 5).is_well_formed());
        assert!(!candidate("   ", "Summary", 5).is_well_formed());
        assert!(!candidate("Title", "", 5).is_well_formed());
        assert!(!candidate("Title", "Summary", 11).is_well_formed());
        assert!(!candidate("Title", "Summary", -1).is_well_formed());
    }

    #[test]
    fn fingerprint_is_stable_per_invocation() {
        let c = candidate("Title", "Summary", 5);
        assert_eq!(c.fingerprint("run:web:0"), c.fingerprint("run:web:0"));
        assert_ne!(c.fingerprint("run:web:0"), c.fingerprint("run:web:1"));
    }

    #[test]
    fn source_type_round_trips() {
        for ty in [SourceType::Web, SourceType::Feed, SourceType::Video] {
            assert_eq!(ty.to_string().parse::<SourceType>(), Ok(ty));
        }
        assert!("rss".parse::<SourceType>().is_err());
    }
}
