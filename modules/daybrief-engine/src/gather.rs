//! The three gatherer branches. Each is strictly sequential inside:
//! fetch → extract → persist, source by source, candidate by candidate.
//! The branches run concurrently with each other; the store serializes
//! their dedup decisions.
//!
//! Failure policy: a single source failing is skipped with a warning. A
//! fatal provider error on the very first call means the whole provider
//! is down — the branch completes with zero candidates. Nothing a branch
//! does is fatal to the run.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use daybrief_common::error::DaybriefError;
use daybrief_common::{CandidateItem, Channel, Feed, RunContext, SourceType, Topic};
use daybrief_store::Persisted;

use crate::extractor::candidates_from_entries;
use crate::retry::{with_retry, RetryPolicy};
use crate::state::{BranchOutcome, BranchOutput, PipelineDeps};

const VIDEOS_PER_CHANNEL: u32 = 5;

pub async fn run_web_branch(
    deps: Arc<PipelineDeps>,
    ctx: RunContext,
    topics: Vec<Topic>,
    cancel: watch::Receiver<bool>,
) -> BranchOutput {
    let mut out = BranchOutput::new(SourceType::Web);
    let policy = RetryPolicy::provider(&deps.config);

    for (i, topic) in topics.iter().enumerate() {
        if cancelled(&cancel, &mut out) {
            return out;
        }

        let query = topic.query();
        let answer = match with_retry(policy, "research", || deps.research.research(&query)).await
        {
            Ok(answer) => answer,
            Err(e) => {
                out.stats.sources_failed += 1;
                if i == 0 && !e.is_transient() {
                    warn!(error = %e, "Research provider down, web branch yields nothing");
                    return out;
                }
                warn!(topic = %topic.topic, error = %e, "Research failed, skipping topic");
                continue;
            }
        };
        out.stats.sources_scanned += 1;

        let candidates = match with_retry(policy, "extract_research", || {
            deps.extractor.extract_research(ctx.run_date, topic, &answer)
        })
        .await
        {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!(topic = %topic.topic, error = %e, "Extraction failed, skipping topic");
                out.stats.sources_failed += 1;
                continue;
            }
        };
        out.stats.candidates_extracted += candidates.len() as u32;

        let invocation = format!("{}:web:{}", ctx.run_id, topic.id);
        if persist_batch(&deps, &ctx, &invocation, &candidates, &cancel, &mut out).await {
            out.outcome = BranchOutcome::Cancelled;
            return out;
        }
    }

    info!(items = out.item_ids.len(), "Web branch done");
    out
}

pub async fn run_feed_branch(
    deps: Arc<PipelineDeps>,
    ctx: RunContext,
    feeds: Vec<Feed>,
    cancel: watch::Receiver<bool>,
) -> BranchOutput {
    let mut out = BranchOutput::new(SourceType::Feed);
    let policy = RetryPolicy::provider(&deps.config);
    let limit = deps.config.feed_entries_per_feed;

    for (i, feed) in feeds.iter().enumerate() {
        if cancelled(&cancel, &mut out) {
            return out;
        }

        let entries = match with_retry(policy, "feed", || deps.feeds.fetch(&feed.url, limit)).await
        {
            Ok(entries) => entries,
            Err(e) => {
                out.stats.sources_failed += 1;
                if i == 0 && !e.is_transient() {
                    warn!(error = %e, "Feed fetching down, feed branch yields nothing");
                    return out;
                }
                warn!(feed = %feed.url, error = %e, "Feed fetch failed, skipping feed");
                continue;
            }
        };
        out.stats.sources_scanned += 1;

        let candidates = candidates_from_entries(feed, &entries);
        out.stats.candidates_extracted += candidates.len() as u32;

        let invocation = format!("{}:feed:{}", ctx.run_id, feed.id);
        if persist_batch(&deps, &ctx, &invocation, &candidates, &cancel, &mut out).await {
            out.outcome = BranchOutcome::Cancelled;
            return out;
        }
    }

    info!(items = out.item_ids.len(), "Feed branch done");
    out
}

pub async fn run_video_branch(
    deps: Arc<PipelineDeps>,
    ctx: RunContext,
    channels: Vec<Channel>,
    cancel: watch::Receiver<bool>,
) -> BranchOutput {
    let mut out = BranchOutput::new(SourceType::Video);
    let policy = RetryPolicy::provider(&deps.config);

    for (i, channel) in channels.iter().enumerate() {
        if cancelled(&cancel, &mut out) {
            return out;
        }

        let videos = match with_retry(policy, "videos", || {
            deps.transcripts.recent_videos(channel, VIDEOS_PER_CHANNEL)
        })
        .await
        {
            Ok(videos) => videos,
            Err(e) => {
                out.stats.sources_failed += 1;
                if i == 0 && !e.is_transient() {
                    warn!(error = %e, "Transcript provider down, video branch yields nothing");
                    return out;
                }
                warn!(channel = %channel.name, error = %e, "Video listing failed, skipping channel");
                continue;
            }
        };
        out.stats.sources_scanned += 1;

        for video in videos {
            if cancelled(&cancel, &mut out) {
                return out;
            }

            let transcript = match with_retry(policy, "transcript", || {
                deps.transcripts.transcript(&video.video_id)
            })
            .await
            {
                Ok(Some(text)) => text,
                Ok(None) => {
                    debug!(video = %video.url, "No transcript available, skipping video");
                    continue;
                }
                Err(e) => {
                    warn!(video = %video.url, error = %e, "Transcript fetch failed, skipping video");
                    continue;
                }
            };

            let candidates = match with_retry(policy, "extract_transcript", || {
                deps.extractor
                    .extract_transcript(ctx.run_date, channel, &video.url, &transcript)
            })
            .await
            {
                Ok(candidates) => candidates,
                Err(e) => {
                    warn!(video = %video.url, error = %e, "Extraction failed, skipping video");
                    continue;
                }
            };
            out.stats.candidates_extracted += candidates.len() as u32;

            let invocation = format!("{}:video:{}", ctx.run_id, video.video_id);
            if persist_batch(&deps, &ctx, &invocation, &candidates, &cancel, &mut out).await {
                out.outcome = BranchOutcome::Cancelled;
                return out;
            }
        }
    }

    info!(items = out.item_ids.len(), "Video branch done");
    out
}

/// Persist one batch sequentially. Returns true when cancellation was
/// observed mid-batch; already-persisted candidates stay persisted.
async fn persist_batch(
    deps: &PipelineDeps,
    ctx: &RunContext,
    invocation: &str,
    candidates: &[CandidateItem],
    cancel: &watch::Receiver<bool>,
    out: &mut BranchOutput,
) -> bool {
    let policy = RetryPolicy::store(&deps.config);

    for candidate in candidates {
        if *cancel.borrow() {
            return true;
        }

        let persisted = with_retry(policy, "persist", || {
            deps.store
                .persist_candidate(ctx.run_date, invocation, candidate)
        })
        .await;

        match persisted {
            Ok(Persisted::Inserted(item)) => {
                out.stats.items_inserted += 1;
                out.item_ids.push(item.id);
            }
            Ok(Persisted::Mentioned(item)) => {
                out.stats.mentions_incremented += 1;
                out.item_ids.push(item.id);
            }
            Ok(Persisted::AlreadyApplied(item)) => {
                debug!(id = item.id, "Candidate already applied, skipping");
                out.item_ids.push(item.id);
            }
            Err(DaybriefError::ExtractorMalformed(msg)) => {
                warn!(invocation, reason = %msg, "Dropping malformed candidate");
                out.stats.candidates_dropped += 1;
            }
            Err(e) => {
                warn!(invocation, error = %e, "Dropping candidate after persist retries");
                out.stats.candidates_dropped += 1;
            }
        }
    }
    false
}

fn cancelled(cancel: &watch::Receiver<bool>, out: &mut BranchOutput) -> bool {
    if *cancel.borrow() {
        info!(branch = %out.branch, "Branch cancelled");
        out.outcome = BranchOutcome::Cancelled;
        return true;
    }
    false
}
