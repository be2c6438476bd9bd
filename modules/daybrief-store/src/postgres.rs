//! Postgres NewsStore. One transaction per candidate: the dedup
//! read-compare-write runs under a per-run-date advisory lock, with the
//! unique `(run_date, article_url)` index as a conflict backstop.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{debug, warn};

use async_trait::async_trait;
use daybrief_common::error::{DaybriefError, Result};
use daybrief_common::{
    content_hash, CandidateItem, Channel, Digest, Feed, NewsItem, RunContext, RunOutcome,
    RunTotals, SourceSet, Topic,
};

use crate::{find_duplicate, NewsStore, Persisted};

pub struct PgNewsStore {
    pool: PgPool,
    title_similarity_threshold: f64,
}

impl PgNewsStore {
    pub fn new(pool: PgPool, title_similarity_threshold: f64) -> Self {
        Self {
            pool,
            title_similarity_threshold,
        }
    }

    pub async fn connect(database_url: &str, title_similarity_threshold: f64) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(8)
            .connect(database_url)
            .await
            .map_err(|e| DaybriefError::SourceUnavailable(e.to_string()))?;
        Ok(Self::new(pool, title_similarity_threshold))
    }

    pub fn pool(&self) -> PgPool {
        self.pool.clone()
    }

    /// Run the embedded SQL migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| DaybriefError::StoreTransient(e.to_string()))?;
        Ok(())
    }

    async fn fetch_item(tx: &mut Transaction<'_, Postgres>, id: i64) -> Result<NewsItem> {
        let row = sqlx::query_as::<_, NewsItemRow>("SELECT * FROM news_items WHERE id = $1")
            .bind(id)
            .fetch_one(&mut **tx)
            .await
            .map_err(transient)?;
        row.into_item()
    }
}

#[async_trait]
impl NewsStore for PgNewsStore {
    async fn load_sources(&self) -> Result<SourceSet> {
        let topics = sqlx::query_as::<_, TopicRow>(
            r#"
            SELECT id, topic, keywords, priority, active
            FROM topics
            WHERE active
            ORDER BY priority DESC, id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(unavailable)?
        .into_iter()
        .map(TopicRow::into_topic)
        .collect();

        let feeds = sqlx::query_as::<_, FeedRow>(
            "SELECT id, name, url, active FROM feeds WHERE active ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(unavailable)?
        .into_iter()
        .map(FeedRow::into_feed)
        .collect();

        let channels = sqlx::query_as::<_, ChannelRow>(
            "SELECT id, name, url, external_id, active FROM channels WHERE active ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(unavailable)?
        .into_iter()
        .map(ChannelRow::into_channel)
        .collect();

        Ok(SourceSet {
            topics,
            feeds,
            channels,
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

        let fingerprint = candidate.fingerprint(invocation);
        let article_url = candidate
            .article_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty());

        let mut tx = self.pool.begin().await.map_err(transient)?;

        // One dedup decision per run_date at a time: the read below and the
        // write that follows must see a serialized view of the day's rows.
        let lock_key = content_hash(&run_date.to_string()) as i64;
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(lock_key)
            .execute(&mut *tx)
            .await
            .map_err(transient)?;

        // Retry replay: skip candidates this invocation already applied.
        let applied: Option<i64> = sqlx::query_scalar(
            "SELECT news_item_id FROM ingest_log WHERE run_date = $1 AND fingerprint = $2",
        )
        .bind(run_date)
        .bind(&fingerprint)
        .fetch_optional(&mut *tx)
        .await
        .map_err(transient)?;

        if let Some(id) = applied {
            debug!(fingerprint, id, "Candidate already applied by this invocation");
            let item = Self::fetch_item(&mut tx, id).await?;
            tx.commit().await.map_err(transient)?;
            return Ok(Persisted::AlreadyApplied(item));
        }

        let existing: Vec<NewsItem> =
            sqlx::query_as::<_, NewsItemRow>("SELECT * FROM news_items WHERE run_date = $1")
                .bind(run_date)
                .fetch_all(&mut *tx)
                .await
                .map_err(transient)?
                .into_iter()
                .map(NewsItemRow::into_item)
                .collect::<Result<_>>()?;

        let outcome = if let Some(dup) = find_duplicate(&existing, candidate, self.title_similarity_threshold)
        {
            let row = sqlx::query_as::<_, NewsItemRow>(
                r#"
                UPDATE news_items
                SET mention_count = mention_count + 1, updated_at = now()
                WHERE id = $1
                RETURNING *
                "#,
            )
            .bind(dup.id)
            .fetch_one(&mut *tx)
            .await
            .map_err(transient)?;
            Persisted::Mentioned(row.into_item()?)
        } else {
            let inserted = sqlx::query_as::<_, NewsItemRow>(
                r#"
                INSERT INTO news_items
                    (run_date, title, summary, relevance_score, mention_count,
                     source_type, source_url, source_name, article_url, raw_content)
                VALUES ($1, $2, $3, $4, 1, $5, $6, $7, $8, $9)
                RETURNING *
                "#,
            )
            .bind(run_date)
            .bind(&candidate.title)
            .bind(&candidate.summary)
            .bind(candidate.relevance_score)
            .bind(candidate.source_type.to_string())
            .bind(&candidate.source_url)
            .bind(&candidate.source_name)
            .bind(article_url)
            .bind(&candidate.raw_content)
            .fetch_one(&mut *tx)
            .await;

            match inserted {
                Ok(row) => Persisted::Inserted(row.into_item()?),
                Err(e) if is_unique_violation(&e) => {
                    // Another writer landed the same URL first; take the
                    // increment path against its row.
                    warn!(
                        url = article_url.unwrap_or(""),
                        "Insert conflict on article_url, incrementing existing row"
                    );
                    let row = sqlx::query_as::<_, NewsItemRow>(
                        r#"
                        UPDATE news_items
                        SET mention_count = mention_count + 1, updated_at = now()
                        WHERE run_date = $1 AND article_url = $2
                        RETURNING *
                        "#,
                    )
                    .bind(run_date)
                    .bind(article_url)
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(transient)?
                    .ok_or_else(|| {
                        DaybriefError::StoreConflict(format!(
                            "conflicting row vanished for {}",
                            article_url.unwrap_or("")
                        ))
                    })?;
                    Persisted::Mentioned(row.into_item()?)
                }
                Err(e) => return Err(transient(e)),
            }
        };

        sqlx::query(
            "INSERT INTO ingest_log (run_date, fingerprint, news_item_id) VALUES ($1, $2, $3)",
        )
        .bind(run_date)
        .bind(&fingerprint)
        .bind(outcome.item().id)
        .execute(&mut *tx)
        .await
        .map_err(transient)?;

        tx.commit().await.map_err(transient)?;
        Ok(outcome)
    }

    async fn items_for_date(&self, run_date: NaiveDate) -> Result<Vec<NewsItem>> {
        sqlx::query_as::<_, NewsItemRow>(
            "SELECT * FROM news_items WHERE run_date = $1 ORDER BY created_at, id",
        )
        .bind(run_date)
        .fetch_all(&self.pool)
        .await
        .map_err(transient)?
        .into_iter()
        .map(NewsItemRow::into_item)
        .collect()
    }

    async fn record_run_started(&self, ctx: &RunContext) -> Result<()> {
        sqlx::query(
            "INSERT INTO runs (run_id, run_date, started_at) VALUES ($1, $2, $3)",
        )
        .bind(&ctx.run_id)
        .bind(ctx.run_date)
        .bind(ctx.started_at)
        .execute(&self.pool)
        .await
        .map_err(transient)?;
        Ok(())
    }

    async fn record_run_finished(
        &self,
        run_id: &str,
        outcome: RunOutcome,
        totals: RunTotals,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE runs
            SET finished_at = now(),
                outcome = $2,
                items_inserted = $3,
                mentions_incremented = $4,
                sources_failed = $5
            WHERE run_id = $1
            "#,
        )
        .bind(run_id)
        .bind(outcome.to_string())
        .bind(totals.items_inserted)
        .bind(totals.mentions_incremented)
        .bind(totals.sources_failed)
        .execute(&self.pool)
        .await
        .map_err(transient)?;
        Ok(())
    }

    async fn save_digest(&self, run_id: &str, digest: &Digest) -> Result<()> {
        let items = serde_json::to_value(&digest.items)
            .map_err(|e| DaybriefError::StoreTransient(e.to_string()))?;
        sqlx::query(
            r#"
            INSERT INTO digests (run_id, run_date, summary, items, generated_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(run_id)
        .bind(digest.run_date)
        .bind(&digest.summary)
        .bind(items)
        .bind(digest.generated_at)
        .execute(&self.pool)
        .await
        .map_err(transient)?;
        Ok(())
    }

    async fn latest_digest(&self, run_date: NaiveDate) -> Result<Option<Digest>> {
        let row = sqlx::query_as::<_, DigestRow>(
            r#"
            SELECT run_date, summary, items, generated_at
            FROM digests
            WHERE run_date = $1
            ORDER BY generated_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(run_date)
        .fetch_optional(&self.pool)
        .await
        .map_err(transient)?;

        row.map(DigestRow::into_digest).transpose()
    }
}

// --- Row types ---

#[derive(Debug, sqlx::FromRow)]
struct NewsItemRow {
    id: i64,
    run_date: NaiveDate,
    title: String,
    summary: String,
    relevance_score: i32,
    mention_count: i32,
    source_type: String,
    source_url: String,
    source_name: String,
    article_url: Option<String>,
    raw_content: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl NewsItemRow {
    fn into_item(self) -> Result<NewsItem> {
        let source_type = self
            .source_type
            .parse()
            .map_err(DaybriefError::StoreTransient)?;
        Ok(NewsItem {
            id: self.id,
            run_date: self.run_date,
            title: self.title,
            summary: self.summary,
            relevance_score: self.relevance_score,
            mention_count: self.mention_count,
            source_type,
            source_url: self.source_url,
            source_name: self.source_name,
            article_url: self.article_url,
            raw_content: self.raw_content,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct DigestRow {
    run_date: NaiveDate,
    summary: String,
    items: serde_json::Value,
    generated_at: DateTime<Utc>,
}

impl DigestRow {
    fn into_digest(self) -> Result<Digest> {
        let items = serde_json::from_value(self.items)
            .map_err(|e| DaybriefError::StoreTransient(e.to_string()))?;
        Ok(Digest {
            items,
            summary: self.summary,
            run_date: self.run_date,
            generated_at: self.generated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct TopicRow {
    id: i32,
    topic: String,
    keywords: Vec<String>,
    priority: i32,
    active: bool,
}

impl TopicRow {
    fn into_topic(self) -> Topic {
        Topic {
            id: self.id,
            topic: self.topic,
            keywords: self.keywords,
            priority: self.priority,
            active: self.active,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct FeedRow {
    id: i32,
    name: String,
    url: String,
    active: bool,
}

impl FeedRow {
    fn into_feed(self) -> Feed {
        Feed {
            id: self.id,
            name: self.name,
            url: self.url,
            active: self.active,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ChannelRow {
    id: i32,
    name: String,
    url: String,
    external_id: String,
    active: bool,
}

impl ChannelRow {
    fn into_channel(self) -> Channel {
        Channel {
            id: self.id,
            name: self.name,
            url: self.url,
            external_id: self.external_id,
            active: self.active,
        }
    }
}

fn transient(e: sqlx::Error) -> DaybriefError {
    DaybriefError::StoreTransient(e.to_string())
}

fn unavailable(e: sqlx::Error) -> DaybriefError {
    DaybriefError::SourceUnavailable(e.to_string())
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(
        e,
        sqlx::Error::Database(db) if db.code().as_deref() == Some("23505")
    )
}
