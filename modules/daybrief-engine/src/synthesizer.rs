//! Synthesis: read the day's persisted items, collapse duplicates once
//! more, rank deterministically, select the top stories, and compose a
//! digest. The store is authoritative — branch buffers are never read
//! here. Ranking is plain code; only the summary prose comes from the
//! LLM, and a failed summary degrades to a headline list.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use tracing::{info, warn};

use ai_client::Claude;
use daybrief_common::error::{DaybriefError, Result};
use daybrief_common::{dedup, Digest, NewsItem, RunContext};

use crate::retry::{with_retry, RetryPolicy};
use crate::state::PipelineDeps;

const DIGEST_MAX: usize = 10;
const DIGEST_MIN: usize = 5;

pub async fn synthesize(deps: &PipelineDeps, ctx: &RunContext) -> Result<Digest> {
    let policy = RetryPolicy::store(&deps.config);
    let items = with_retry(policy, "synthesize:read", || {
        deps.store.items_for_date(ctx.run_date)
    })
    .await
    .map_err(|e| DaybriefError::SynthesizeFailed(e.to_string()))?;

    info!(run_date = %ctx.run_date, items = items.len(), "Synthesizing digest");

    let distinct = collapse_duplicates(items, deps.config.title_similarity_threshold);
    let ranked = rank(distinct, deps.config.ranking_mention_weight);
    let selected = select_top(ranked);

    if selected.len() < DIGEST_MIN {
        warn!(
            count = selected.len(),
            "Fewer than {DIGEST_MIN} distinct items today, returning all of them"
        );
    }

    let summary = match deps.summary.compose(ctx.run_date, &selected).await {
        Ok(summary) => summary,
        Err(e) => {
            warn!(error = %e, "Summary generation failed, falling back to headlines");
            fallback_summary(ctx.run_date, &selected)
        }
    };

    Ok(Digest {
        items: selected,
        summary,
        run_date: ctx.run_date,
        generated_at: Utc::now(),
    })
}

/// Defensive cross-branch dedup over the read set. When two rows
/// collapse, the one with the higher mention count survives (ties:
/// higher relevance, then earlier created_at).
pub fn collapse_duplicates(items: Vec<NewsItem>, threshold: f64) -> Vec<NewsItem> {
    let mut kept: Vec<NewsItem> = Vec::new();
    for item in items {
        let existing = kept.iter_mut().find(|k| {
            dedup::is_duplicate(
                &k.title,
                k.article_url.as_deref(),
                &item.title,
                item.article_url.as_deref(),
                threshold,
            )
        });
        match existing {
            Some(incumbent) => {
                if prefer(&item, incumbent) {
                    *incumbent = item;
                }
            }
            None => kept.push(item),
        }
    }
    kept
}

fn prefer(challenger: &NewsItem, incumbent: &NewsItem) -> bool {
    let challenger_key = (
        challenger.mention_count,
        challenger.relevance_score,
        std::cmp::Reverse(challenger.created_at),
    );
    let incumbent_key = (
        incumbent.mention_count,
        incumbent.relevance_score,
        std::cmp::Reverse(incumbent.created_at),
    );
    challenger_key > incumbent_key
}

pub fn score(item: &NewsItem, mention_weight: i32) -> i64 {
    item.mention_count as i64 * mention_weight as i64 + item.relevance_score as i64
}

/// Sort by score descending; ties by mention count descending, then
/// created_at ascending.
pub fn rank(mut items: Vec<NewsItem>, mention_weight: i32) -> Vec<NewsItem> {
    items.sort_by(|a, b| {
        score(b, mention_weight)
            .cmp(&score(a, mention_weight))
            .then(b.mention_count.cmp(&a.mention_count))
            .then(a.created_at.cmp(&b.created_at))
    });
    items
}

/// Top K where K = clamp(count, 5, 10): everything when ten or fewer
/// exist, exactly ten otherwise.
pub fn select_top(mut ranked: Vec<NewsItem>) -> Vec<NewsItem> {
    ranked.truncate(DIGEST_MAX);
    ranked
}

fn fallback_summary(run_date: NaiveDate, items: &[NewsItem]) -> String {
    let mut lines = vec![format!("Top AI news for {run_date}:")];
    for (i, item) in items.iter().enumerate() {
        lines.push(format!(
            "{}. {} ({} mention{})",
            i + 1,
            item.title,
            item.mention_count,
            if item.mention_count == 1 { "" } else { "s" }
        ));
    }
    lines.join("\n")
}

// --- SummaryWriter ---

#[async_trait]
pub trait SummaryWriter: Send + Sync {
    /// Compose the digest's human-readable summary for the selected
    /// items.
    async fn compose(&self, run_date: NaiveDate, items: &[NewsItem]) -> anyhow::Result<String>;
}

const SUMMARY_SYSTEM_PROMPT: &str = "\
You write the editorial lead for a daily AI news digest. Given the day's \
selected stories, write one tight paragraph covering them in order of \
importance. Mention every story at least briefly. No preamble, no bullet \
points, no invented facts.";

pub struct LlmSummaryWriter {
    claude: Claude,
}

impl LlmSummaryWriter {
    pub fn new(anthropic_api_key: &str, model: &str) -> Self {
        Self {
            claude: Claude::new(anthropic_api_key, model),
        }
    }
}

#[async_trait]
impl SummaryWriter for LlmSummaryWriter {
    async fn compose(&self, run_date: NaiveDate, items: &[NewsItem]) -> anyhow::Result<String> {
        let listing = items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                format!(
                    "{}. {} — {} (mentions: {}, relevance: {})",
                    i + 1,
                    item.title,
                    item.summary,
                    item.mention_count,
                    item.relevance_score
                )
            })
            .collect::<Vec<_>>()
            .join("\n");

        let prompt = format!("Date: {run_date}\n\nSelected stories:\n{listing}");
        self.claude.chat_completion(SUMMARY_SYSTEM_PROMPT, &prompt).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use daybrief_common::SourceType;

    fn item(id: i64, title: &str, mentions: i32, relevance: i32, created_offset: i64) -> NewsItem {
        let base = NaiveDate::from_ymd_opt(2025, 6, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            .and_utc();
        NewsItem {
            id,
            run_date: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            title: title.to_string(),
            summary: format!("summary of {title}"),
            relevance_score: relevance,
            mention_count: mentions,
            source_type: SourceType::Web,
            source_url: String::new(),
            source_name: String::new(),
            article_url: None,
            raw_content: String::new(),
            created_at: base + TimeDelta::seconds(created_offset),
            updated_at: base + TimeDelta::seconds(created_offset),
        }
    }

    #[test]
    fn ranking_is_by_weighted_score_descending() {
        let items = vec![
            item(1, "Low story about alpha", 1, 3, 0),
            item(2, "High story about beta", 3, 9, 1),
            item(3, "Mid story about gamma", 2, 4, 2),
        ];
        let ranked = rank(items, 2);
        let ids: Vec<i64> = ranked.iter().map(|i| i.id).collect();
        // Scores: 15, 8, 5.
        assert_eq!(ids, vec![2, 3, 1]);
    }

    #[test]
    fn score_ties_break_on_mention_count_then_age() {
        // X: mentions 2, relevance 6 → 10. Y: mentions 1, relevance 8 → 10.
        let x = item(1, "Story x about one thing", 2, 6, 5);
        let y = item(2, "Story y about another thing", 1, 8, 0);
        let ranked = rank(vec![y.clone(), x.clone()], 2);
        assert_eq!(ranked[0].id, 1, "higher mention count wins the tie");

        // Full tie on score and mentions: earlier created_at first.
        let older = item(3, "Older tied story entirely", 1, 8, 0);
        let newer = item(4, "Newer tied story entirely", 1, 8, 9);
        let ranked = rank(vec![newer, older], 2);
        assert_eq!(ranked[0].id, 3);
    }

    #[test]
    fn more_than_ten_items_select_exactly_ten() {
        let items: Vec<NewsItem> = (0..14)
            .map(|i| item(i, &format!("Distinct headline number {i}"), 1, 5, i))
            .collect();
        let selected = select_top(rank(items, 2));
        assert_eq!(selected.len(), 10);
    }

    #[test]
    fn fewer_than_five_items_are_all_returned() {
        let items: Vec<NewsItem> = (0..3)
            .map(|i| item(i, &format!("Distinct headline number {i}"), 1, 5, i))
            .collect();
        let selected = select_top(rank(items, 2));
        assert_eq!(selected.len(), 3);
    }

    #[test]
    fn collapse_keeps_the_row_with_more_mentions() {
        let weak = item(1, "GPT-5 released to the public today", 1, 9, 0);
        let strong = item(2, "GPT-5 released to the public today worldwide", 4, 2, 1);
        let collapsed = collapse_duplicates(vec![weak, strong], 0.70);
        assert_eq!(collapsed.len(), 1);
        assert_eq!(collapsed[0].id, 2);
    }

    #[test]
    fn collapse_is_idempotent() {
        let items = vec![
            item(1, "GPT-5 released to the public today", 2, 5, 0),
            item(2, "GPT-5 released to the public today worldwide", 1, 5, 1),
            item(3, "Completely unrelated robotics story", 1, 5, 2),
        ];
        let once = collapse_duplicates(items, 0.70);
        let twice = collapse_duplicates(once.clone(), 0.70);
        let ids = |v: &[NewsItem]| v.iter().map(|i| i.id).collect::<Vec<_>>();
        assert_eq!(ids(&once), ids(&twice));
        assert_eq!(once.len(), 2);
    }

    #[test]
    fn fallback_summary_names_every_item() {
        let items = vec![
            item(1, "Alpha ships", 2, 5, 0),
            item(2, "Beta lands", 1, 5, 1),
        ];
        let summary = fallback_summary(NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(), &items);
        assert!(summary.contains("Alpha ships"));
        assert!(summary.contains("Beta lands"));
        assert!(summary.contains("2 mentions"));
    }
}
