//! The run orchestrator: load → {web, feed, video} → synthesize.
//!
//! Load happens-before any branch starts; all three branches arrive at
//! the barrier (completed, failed, or cancelled) before synthesis reads
//! the store. A whole-run deadline cancels the branches cooperatively
//! and gives them a short drain window; whatever they persisted stays.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use tokio::sync::watch;
use tracing::{error, info, warn};

use daybrief_common::error::Result;
use daybrief_common::{Digest, RunContext, RunOutcome, SourceType};

use crate::gather::{run_feed_branch, run_video_branch, run_web_branch};
use crate::state::{BranchOutcome, BranchOutput, PipelineDeps, RunState};
use crate::synthesizer;

pub async fn run(deps: Arc<PipelineDeps>, run_date: Option<NaiveDate>) -> Result<Digest> {
    let ctx = match run_date {
        Some(date) => RunContext::new(date),
        None => RunContext::today(),
    };
    info!(run_id = %ctx.run_id, run_date = %ctx.run_date, "Starting daily run");

    let sources = deps.store.load_sources().await?;
    info!(
        topics = sources.topics.len(),
        feeds = sources.feeds.len(),
        channels = sources.channels.len(),
        "Sources loaded"
    );

    // Best-effort bookkeeping: a failed run-log write never aborts a run.
    if let Err(e) = deps.store.record_run_started(&ctx).await {
        warn!(error = %e, "Failed to open run record");
    }

    let (cancel_tx, cancel_rx) = watch::channel(false);

    let web = tokio::spawn(run_web_branch(
        deps.clone(),
        ctx.clone(),
        sources.topics.clone(),
        cancel_rx.clone(),
    ));
    let feed = tokio::spawn(run_feed_branch(
        deps.clone(),
        ctx.clone(),
        sources.feeds.clone(),
        cancel_rx.clone(),
    ));
    let video = tokio::spawn(run_video_branch(
        deps.clone(),
        ctx.clone(),
        sources.channels.clone(),
        cancel_rx,
    ));

    let aborts = [web.abort_handle(), feed.abort_handle(), video.abort_handle()];

    let barrier = futures::future::join3(web, feed, video);
    tokio::pin!(barrier);

    let deadline = Duration::from_secs(deps.config.run_deadline_seconds);
    let drain = Duration::from_secs(deps.config.cancel_drain_seconds);

    // Strict barrier: all three arrivals, not a quorum.
    let mut deadline_fired = false;
    let on_time = tokio::select! {
        outputs = &mut barrier => Some(outputs),
        _ = tokio::time::sleep(deadline) => None,
    };

    let (web_out, feed_out, video_out) = match on_time {
        Some(outputs) => outputs,
        None => {
            deadline_fired = true;
            warn!(deadline_secs = deadline.as_secs(), "Run deadline exceeded, cancelling branches");
            let _ = cancel_tx.send(true);
            match tokio::time::timeout(drain, &mut barrier).await {
                Ok(outputs) => outputs,
                Err(_) => {
                    warn!(drain_secs = drain.as_secs(), "Branches did not drain in time, aborting them");
                    for handle in &aborts {
                        handle.abort();
                    }
                    barrier.await
                }
            }
        }
    };

    let state = RunState {
        ctx: ctx.clone(),
        sources,
        web: settle(web_out, SourceType::Web),
        feed: settle(feed_out, SourceType::Feed),
        video: settle(video_out, SourceType::Video),
    };
    let stats = state.stats();
    info!("{stats}");

    let digest = match synthesizer::synthesize(&deps, &ctx).await {
        Ok(digest) => digest,
        Err(e) => {
            finish(&deps, &ctx, RunOutcome::SynthesizeFailed, &stats).await;
            return Err(e);
        }
    };

    if let Err(e) = deps.store.save_digest(&ctx.run_id, &digest).await {
        warn!(error = %e, "Failed to archive digest");
    }
    let outcome = if deadline_fired {
        RunOutcome::DeadlineExceeded
    } else {
        RunOutcome::Completed
    };
    finish(&deps, &ctx, outcome, &stats).await;

    Ok(digest)
}

/// Re-rank and re-compose the digest from already-persisted items,
/// without gathering.
pub async fn resynthesize(deps: Arc<PipelineDeps>, run_date: Option<NaiveDate>) -> Result<Digest> {
    let ctx = match run_date {
        Some(date) => RunContext::new(date),
        None => RunContext::today(),
    };
    info!(run_id = %ctx.run_id, run_date = %ctx.run_date, "Re-synthesizing digest");

    let digest = synthesizer::synthesize(&deps, &ctx).await?;
    if let Err(e) = deps.store.save_digest(&ctx.run_id, &digest).await {
        warn!(error = %e, "Failed to archive digest");
    }
    Ok(digest)
}

async fn finish(
    deps: &PipelineDeps,
    ctx: &RunContext,
    outcome: RunOutcome,
    stats: &crate::state::RunStats,
) {
    if let Err(e) = deps
        .store
        .record_run_finished(&ctx.run_id, outcome, stats.run_totals())
        .await
    {
        warn!(error = %e, "Failed to close run record");
    }
}

/// Resolve one barrier arrival. A task that panicked or was aborted still
/// arrives — as Failed or Cancelled with an empty buffer.
fn settle(
    result: std::result::Result<BranchOutput, tokio::task::JoinError>,
    branch: SourceType,
) -> BranchOutput {
    match result {
        Ok(output) => output,
        Err(e) if e.is_cancelled() => BranchOutput::lost(branch, BranchOutcome::Cancelled),
        Err(e) => {
            error!(branch = %branch, error = %e, "Branch task failed");
            BranchOutput::lost(branch, BranchOutcome::Failed)
        }
    }
}
