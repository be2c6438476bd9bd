//! Run state and per-branch buffers.
//!
//! Each branch task owns its `BranchOutput` exclusively while it runs and
//! hands it back at the barrier — one writer per buffer, no cross-branch
//! writes. `RunState` reassembles the three outputs after the join.

use std::sync::Arc;

use daybrief_common::{Config, RunContext, RunTotals, SourceSet, SourceType};
use daybrief_store::NewsStore;

use crate::extractor::NewsExtractor;
use crate::feeds::FeedFetcher;
use crate::research::ResearchProvider;
use crate::synthesizer::SummaryWriter;
use crate::transcripts::TranscriptProvider;

/// Immutable dependencies shared by the orchestrator, the branches, and
/// the synthesizer. Branches hold no back-reference to the orchestrator.
pub struct PipelineDeps {
    pub store: Arc<dyn NewsStore>,
    pub research: Arc<dyn ResearchProvider>,
    pub feeds: Arc<dyn FeedFetcher>,
    pub transcripts: Arc<dyn TranscriptProvider>,
    pub extractor: Arc<dyn NewsExtractor>,
    pub summary: Arc<dyn SummaryWriter>,
    pub config: Config,
}

/// How a branch arrived at the barrier. Every branch arrives exactly
/// once, whatever happened inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchOutcome {
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Default, Clone)]
pub struct BranchStats {
    pub sources_scanned: u32,
    pub sources_failed: u32,
    pub candidates_extracted: u32,
    pub candidates_dropped: u32,
    pub items_inserted: u32,
    pub mentions_incremented: u32,
}

/// A branch's append-only output buffer.
#[derive(Debug)]
pub struct BranchOutput {
    pub branch: SourceType,
    /// Ids of the rows this branch persisted or corroborated.
    pub item_ids: Vec<i64>,
    pub stats: BranchStats,
    pub outcome: BranchOutcome,
}

impl BranchOutput {
    pub fn new(branch: SourceType) -> Self {
        Self {
            branch,
            item_ids: Vec::new(),
            stats: BranchStats::default(),
            outcome: BranchOutcome::Completed,
        }
    }

    /// Placeholder for a branch whose task died or never drained: it
    /// still counts as an arrival at the barrier.
    pub fn lost(branch: SourceType, outcome: BranchOutcome) -> Self {
        Self {
            branch,
            item_ids: Vec::new(),
            stats: BranchStats::default(),
            outcome,
        }
    }
}

/// Workflow state for one run, owned by the orchestrator.
pub struct RunState {
    pub ctx: RunContext,
    pub sources: SourceSet,
    pub web: BranchOutput,
    pub feed: BranchOutput,
    pub video: BranchOutput,
}

impl RunState {
    pub fn stats(&self) -> RunStats {
        RunStats {
            web: self.web.stats.clone(),
            feed: self.feed.stats.clone(),
            video: self.video.stats.clone(),
            outcomes: [self.web.outcome, self.feed.outcome, self.video.outcome],
        }
    }
}

/// Aggregated run metrics, printed after the barrier.
#[derive(Debug, Clone)]
pub struct RunStats {
    pub web: BranchStats,
    pub feed: BranchStats,
    pub video: BranchStats,
    pub outcomes: [BranchOutcome; 3],
}

impl RunStats {
    /// Counters for the run's bookkeeping row.
    pub fn run_totals(&self) -> RunTotals {
        let total = self.totals();
        RunTotals {
            items_inserted: total.items_inserted as i32,
            mentions_incremented: total.mentions_incremented as i32,
            sources_failed: total.sources_failed as i32,
        }
    }

    fn totals(&self) -> BranchStats {
        let mut total = BranchStats::default();
        for stats in [&self.web, &self.feed, &self.video] {
            total.sources_scanned += stats.sources_scanned;
            total.sources_failed += stats.sources_failed;
            total.candidates_extracted += stats.candidates_extracted;
            total.candidates_dropped += stats.candidates_dropped;
            total.items_inserted += stats.items_inserted;
            total.mentions_incremented += stats.mentions_incremented;
        }
        total
    }
}

impl std::fmt::Display for RunStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\n=== Daily Run Complete ===")?;
        for (name, stats, outcome) in [
            ("Web", &self.web, self.outcomes[0]),
            ("Feed", &self.feed, self.outcomes[1]),
            ("Video", &self.video, self.outcomes[2]),
        ] {
            writeln!(
                f,
                "{name:6} {outcome:?}: {} sources ({} failed), {} candidates ({} dropped), {} inserted, {} mentions",
                stats.sources_scanned,
                stats.sources_failed,
                stats.candidates_extracted,
                stats.candidates_dropped,
                stats.items_inserted,
                stats.mentions_incremented,
            )?;
        }
        let total = self.totals();
        writeln!(
            f,
            "Total : {} new items, {} mention increments",
            total.items_inserted, total.mentions_incremented
        )?;
        Ok(())
    }
}
