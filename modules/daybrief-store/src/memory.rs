//! In-memory NewsStore for tests. Mirrors the Postgres dedup semantics:
//! the mutex plays the role of the advisory lock, and the ingest map plays
//! the role of the ingest_log table. Timestamps are a logical clock so
//! created_at ordering is deterministic.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{NaiveDate, TimeDelta, Utc};

use daybrief_common::error::{DaybriefError, Result};
use daybrief_common::{
    CandidateItem, Channel, Digest, Feed, NewsItem, RunContext, RunOutcome, RunRecord, RunTotals,
    SourceSet, Topic,
};

use crate::{find_duplicate, NewsStore, Persisted};

pub struct MemoryStore {
    title_similarity_threshold: f64,
    unavailable: AtomicBool,
    persist_failures: AtomicU32,
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    topics: Vec<Topic>,
    feeds: Vec<Feed>,
    channels: Vec<Channel>,
    items: Vec<NewsItem>,
    ingest: HashMap<(NaiveDate, String), i64>,
    next_id: i64,
    runs: Vec<RunRecord>,
    digests: Vec<(String, Digest)>,
}

impl MemoryStore {
    pub fn new(title_similarity_threshold: f64) -> Self {
        Self {
            title_similarity_threshold,
            unavailable: AtomicBool::new(false),
            persist_failures: AtomicU32::new(0),
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn seed_sources(&self, topics: Vec<Topic>, feeds: Vec<Feed>, channels: Vec<Channel>) {
        let mut inner = self.inner.lock().unwrap();
        inner.topics = topics;
        inner.feeds = feeds;
        inner.channels = channels;
    }

    /// Make load_sources fail, as if the store were unreachable.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Fail the next `n` persist calls with a transient error.
    pub fn fail_next_persists(&self, n: u32) {
        self.persist_failures.store(n, Ordering::SeqCst);
    }

    pub fn item_count(&self) -> usize {
        self.inner.lock().unwrap().items.len()
    }

    pub fn runs(&self) -> Vec<RunRecord> {
        self.inner.lock().unwrap().runs.clone()
    }

    pub fn saved_digests(&self) -> Vec<(String, Digest)> {
        self.inner.lock().unwrap().digests.clone()
    }
}

#[async_trait]
impl NewsStore for MemoryStore {
    async fn load_sources(&self) -> Result<SourceSet> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(DaybriefError::SourceUnavailable(
                "memory store marked unavailable".to_string(),
            ));
        }
        let inner = self.inner.lock().unwrap();
        let mut topics: Vec<Topic> = inner.topics.iter().filter(|t| t.active).cloned().collect();
        topics.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.id.cmp(&b.id)));
        Ok(SourceSet {
            topics,
            feeds: inner.feeds.iter().filter(|f| f.active).cloned().collect(),
            channels: inner.channels.iter().filter(|c| c.active).cloned().collect(),
        })
    }

    async fn persist_candidate(
        &self,
        run_date: NaiveDate,
        invocation: &str,
        candidate: &CandidateItem,
    ) -> Result<Persisted> {
        if !candidate.is_well_formed() {
            return Err(DaybriefError::ExtractorMalformed(format!(
                "candidate rejected: title={:?} score={}",
                candidate.title, candidate.relevance_score
            )));
        }

        let failures = self.persist_failures.load(Ordering::SeqCst);
        if failures > 0 {
            self.persist_failures.store(failures - 1, Ordering::SeqCst);
            return Err(DaybriefError::StoreTransient(
                "injected persist failure".to_string(),
            ));
        }

        let fingerprint = candidate.fingerprint(invocation);
        let mut inner = self.inner.lock().unwrap();

        if let Some(id) = inner.ingest.get(&(run_date, fingerprint.clone())).copied() {
            let item = inner
                .items
                .iter()
                .find(|i| i.id == id)
                .cloned()
                .expect("ingest log references missing item");
            return Ok(Persisted::AlreadyApplied(item));
        }

        let todays: Vec<NewsItem> = inner
            .items
            .iter()
            .filter(|i| i.run_date == run_date)
            .cloned()
            .collect();

        let outcome = if let Some(dup) =
            find_duplicate(&todays, candidate, self.title_similarity_threshold)
        {
            let dup_id = dup.id;
            let clock = inner.next_id;
            inner.next_id += 1;
            let item = inner
                .items
                .iter_mut()
                .find(|i| i.id == dup_id)
                .expect("duplicate references missing item");
            item.mention_count += 1;
            item.updated_at = logical_time(run_date, clock);
            Persisted::Mentioned(item.clone())
        } else {
            let id = inner.next_id;
            inner.next_id += 1;
            let now = logical_time(run_date, id);
            let item = NewsItem {
                id,
                run_date,
                title: candidate.title.clone(),
                summary: candidate.summary.clone(),
                relevance_score: candidate.relevance_score,
                mention_count: 1,
                source_type: candidate.source_type,
                source_url: candidate.source_url.clone(),
                source_name: candidate.source_name.clone(),
                article_url: candidate
                    .article_url
                    .as_deref()
                    .map(str::trim)
                    .filter(|u| !u.is_empty())
                    .map(str::to_string),
                raw_content: candidate.raw_content.clone(),
                created_at: now,
                updated_at: now,
            };
            inner.items.push(item.clone());
            Persisted::Inserted(item)
        };

        inner
            .ingest
            .insert((run_date, fingerprint), outcome.item().id);
        Ok(outcome)
    }

    async fn items_for_date(&self, run_date: NaiveDate) -> Result<Vec<NewsItem>> {
        let inner = self.inner.lock().unwrap();
        let mut items: Vec<NewsItem> = inner
            .items
            .iter()
            .filter(|i| i.run_date == run_date)
            .cloned()
            .collect();
        items.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(items)
    }

    async fn record_run_started(&self, ctx: &RunContext) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.runs.push(RunRecord {
            run_id: ctx.run_id.clone(),
            run_date: ctx.run_date,
            started_at: ctx.started_at,
            finished_at: None,
            outcome: None,
            totals: RunTotals::default(),
        });
        Ok(())
    }

    async fn record_run_finished(
        &self,
        run_id: &str,
        outcome: RunOutcome,
        totals: RunTotals,
    ) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(run) = inner.runs.iter_mut().find(|r| r.run_id == run_id) {
            run.finished_at = Some(Utc::now());
            run.outcome = Some(outcome);
            run.totals = totals;
        }
        Ok(())
    }

    async fn save_digest(&self, run_id: &str, digest: &Digest) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.digests.push((run_id.to_string(), digest.clone()));
        Ok(())
    }

    async fn latest_digest(&self, run_date: NaiveDate) -> Result<Option<Digest>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .digests
            .iter()
            .rev()
            .map(|(_, digest)| digest)
            .find(|digest| digest.run_date == run_date)
            .cloned())
    }
}

/// Deterministic per-store clock: run-date midnight plus one second per
/// logical tick.
fn logical_time(run_date: NaiveDate, tick: i64) -> chrono::DateTime<chrono::Utc> {
    run_date
        .and_hms_opt(0, 0, 0)
        .expect("midnight always exists")
        .and_utc()
        + TimeDelta::seconds(tick)
}

#[cfg(test)]
mod tests {
    use super::*;
    use daybrief_common::SourceType;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()
    }

    fn candidate(title: &str, url: Option<&str>, source_type: SourceType) -> CandidateItem {
        CandidateItem {
            title: title.to_string(),
            summary: format!("summary of {title}"),
            source_type,
            source_name: "test source".to_string(),
            source_url: "https://source.example".to_string(),
            article_url: url.map(str::to_string),
            raw_content: String::new(),
            relevance_score: 5,
        }
    }

    #[tokio::test]
    async fn url_duplicate_increments_existing_row() {
        let store = MemoryStore::new(0.70);
        let a = candidate("Alpha", Some("https://x.com/a"), SourceType::Web);
        let b = candidate("Alpha launch", Some("https://x.com/a"), SourceType::Feed);

        let first = store.persist_candidate(date(), "run:web:0", &a).await.unwrap();
        assert!(matches!(first, Persisted::Inserted(_)));

        let second = store.persist_candidate(date(), "run:feed:0", &b).await.unwrap();
        match second {
            Persisted::Mentioned(item) => {
                assert_eq!(item.mention_count, 2);
                // First inserter's source type is preserved.
                assert_eq!(item.source_type, SourceType::Web);
                assert_eq!(item.title, "Alpha");
            }
            other => panic!("expected Mentioned, got {other:?}"),
        }
        assert_eq!(store.item_count(), 1);
    }

    #[tokio::test]
    async fn title_similarity_duplicate_increments() {
        let store = MemoryStore::new(0.70);
        let a = candidate("New GPT-5 model released today", None, SourceType::Web);
        let b = candidate(
            "New GPT-5 model released today by OpenAI",
            None,
            SourceType::Feed,
        );

        store.persist_candidate(date(), "run:web:0", &a).await.unwrap();
        let second = store.persist_candidate(date(), "run:feed:0", &b).await.unwrap();
        assert!(matches!(second, Persisted::Mentioned(ref i) if i.mention_count == 2));
    }

    #[tokio::test]
    async fn similar_titles_on_different_days_do_not_collide() {
        let store = MemoryStore::new(0.70);
        let a = candidate("Alpha", Some("https://x.com/a"), SourceType::Web);
        let other_day = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap();

        store.persist_candidate(date(), "run:web:0", &a).await.unwrap();
        let second = store.persist_candidate(other_day, "run2:web:0", &a).await.unwrap();
        assert!(matches!(second, Persisted::Inserted(_)));
        assert_eq!(store.item_count(), 2);
    }

    #[tokio::test]
    async fn replaying_an_invocation_applies_nothing() {
        let store = MemoryStore::new(0.70);
        let a = candidate("Alpha", Some("https://x.com/a"), SourceType::Web);

        store.persist_candidate(date(), "run:web:0", &a).await.unwrap();
        let replay = store.persist_candidate(date(), "run:web:0", &a).await.unwrap();
        match replay {
            Persisted::AlreadyApplied(item) => assert_eq!(item.mention_count, 1),
            other => panic!("expected AlreadyApplied, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn distinct_invocations_double_mention_counts() {
        let store = MemoryStore::new(0.70);
        let items = vec![
            candidate("Alpha", Some("https://x.com/a"), SourceType::Web),
            candidate("Beta story entirely different", None, SourceType::Web),
        ];

        for c in &items {
            store.persist_candidate(date(), "run:web:0", c).await.unwrap();
        }
        for c in &items {
            store.persist_candidate(date(), "run:web:1", c).await.unwrap();
        }

        let rows = store.items_for_date(date()).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.mention_count == 2));
    }

    #[tokio::test]
    async fn concurrent_branches_produce_one_insert_and_one_increment() {
        use std::sync::Arc;

        let store = Arc::new(MemoryStore::new(0.70));
        let web = candidate("Alpha", Some("https://x.com/a"), SourceType::Web);
        let feed = candidate("Alpha launch", Some("https://x.com/a"), SourceType::Feed);

        let s1 = store.clone();
        let s2 = store.clone();
        let (r1, r2) = tokio::join!(
            async move { s1.persist_candidate(date(), "run:web:0", &web).await },
            async move { s2.persist_candidate(date(), "run:feed:0", &feed).await },
        );

        let outcomes = [r1.unwrap(), r2.unwrap()];
        let inserts = outcomes
            .iter()
            .filter(|o| matches!(o, Persisted::Inserted(_)))
            .count();
        let mentions = outcomes
            .iter()
            .filter(|o| matches!(o, Persisted::Mentioned(_)))
            .count();
        assert_eq!((inserts, mentions), (1, 1));

        let rows = store.items_for_date(date()).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].mention_count, 2);
    }

    #[tokio::test]
    async fn malformed_candidates_are_rejected() {
        let store = MemoryStore::new(0.70);
        let mut bad = candidate("", None, SourceType::Web);
        bad.summary = "has a summary".to_string();

        let err = store
            .persist_candidate(date(), "run:web:0", &bad)
            .await
            .unwrap_err();
        assert!(matches!(err, DaybriefError::ExtractorMalformed(_)));
        assert_eq!(store.item_count(), 0);
    }

    #[tokio::test]
    async fn injected_failures_are_transient() {
        let store = MemoryStore::new(0.70);
        store.fail_next_persists(1);
        let a = candidate("Alpha", None, SourceType::Web);

        let err = store
            .persist_candidate(date(), "run:web:0", &a)
            .await
            .unwrap_err();
        assert!(err.is_transient());

        // The failure consumed itself; the retry lands.
        let ok = store.persist_candidate(date(), "run:web:0", &a).await.unwrap();
        assert!(matches!(ok, Persisted::Inserted(_)));
    }
}
