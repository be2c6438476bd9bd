//! Persistence seam for the daily pipeline.
//!
//! `NewsStore` is the single trait the gatherers and the synthesizer talk
//! to. The Postgres implementation serializes cross-branch dedup; the
//! in-memory implementation mirrors its semantics for tests — no network,
//! no database, no Docker.

pub mod postgres;
pub mod seed;

#[cfg(any(test, feature = "test-support"))]
pub mod memory;

pub use postgres::PgNewsStore;
pub use seed::{Seeder, SourceSeedFile};

use async_trait::async_trait;
use chrono::NaiveDate;
use daybrief_common::error::Result;
use daybrief_common::{
    dedup, CandidateItem, Digest, NewsItem, RunContext, RunOutcome, RunTotals, SourceSet,
};

/// Outcome of persisting one candidate.
#[derive(Debug, Clone)]
pub enum Persisted {
    /// First sighting today: a new row with mention_count = 1.
    Inserted(NewsItem),
    /// Duplicate of an existing row: its mention count was incremented.
    Mentioned(NewsItem),
    /// This invocation already applied the candidate (retry replay).
    AlreadyApplied(NewsItem),
}

impl Persisted {
    pub fn item(&self) -> &NewsItem {
        match self {
            Persisted::Inserted(item)
            | Persisted::Mentioned(item)
            | Persisted::AlreadyApplied(item) => item,
        }
    }

    pub fn into_item(self) -> NewsItem {
        match self {
            Persisted::Inserted(item)
            | Persisted::Mentioned(item)
            | Persisted::AlreadyApplied(item) => item,
        }
    }
}

#[async_trait]
pub trait NewsStore: Send + Sync {
    /// All active sources. Topics come back sorted by priority descending.
    async fn load_sources(&self) -> Result<SourceSet>;

    /// Apply one candidate's dedup-or-insert effect for the run date.
    ///
    /// The dedup decision runs against a serialized view of the day's
    /// rows: when two branches submit duplicates of each other
    /// concurrently, exactly one inserts and the other increments.
    /// `invocation` tags the persist call so a retried invocation skips
    /// candidates it already applied.
    async fn persist_candidate(
        &self,
        run_date: NaiveDate,
        invocation: &str,
        candidate: &CandidateItem,
    ) -> Result<Persisted>;

    /// All items persisted for the run date, oldest first.
    async fn items_for_date(&self, run_date: NaiveDate) -> Result<Vec<NewsItem>>;

    /// Open the bookkeeping row for a run. Best-effort: callers log and
    /// continue on failure rather than aborting the run.
    async fn record_run_started(&self, ctx: &RunContext) -> Result<()>;

    /// Close the bookkeeping row with the run's outcome and totals.
    async fn record_run_finished(
        &self,
        run_id: &str,
        outcome: RunOutcome,
        totals: RunTotals,
    ) -> Result<()>;

    /// Archive a produced digest. Best-effort, same as the run log.
    async fn save_digest(&self, run_id: &str, digest: &Digest) -> Result<()>;

    /// The most recently archived digest for a run date, if any.
    async fn latest_digest(&self, run_date: NaiveDate) -> Result<Option<Digest>>;
}

/// Find a duplicate of `candidate` among the day's existing rows.
pub(crate) fn find_duplicate<'a>(
    existing: &'a [NewsItem],
    candidate: &CandidateItem,
    threshold: f64,
) -> Option<&'a NewsItem> {
    existing.iter().find(|item| {
        dedup::is_duplicate(
            &item.title,
            item.article_url.as_deref(),
            &candidate.title,
            candidate.article_url.as_deref(),
            threshold,
        )
    })
}
