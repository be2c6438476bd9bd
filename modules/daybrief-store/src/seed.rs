//! Seeder: write-only interface for loading curated sources into
//! Postgres. The pipeline itself never writes sources; this is the
//! external seeding path, fed from a JSON file.

use serde::Deserialize;
use sqlx::PgPool;
use tracing::info;

use daybrief_common::error::{DaybriefError, Result};

/// On-disk shape of a source seed file.
///
/// ```json
/// {
///   "topics": [{"topic": "LLM releases", "keywords": ["GPT"], "priority": 8}],
///   "feeds": [{"name": "Example", "url": "https://example.com/rss"}],
///   "channels": [{"name": "AI Channel", "url": "https://...", "external_id": "UC123"}]
/// }
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SourceSeedFile {
    #[serde(default)]
    pub topics: Vec<TopicSeed>,
    #[serde(default)]
    pub feeds: Vec<FeedSeed>,
    #[serde(default)]
    pub channels: Vec<ChannelSeed>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TopicSeed {
    pub topic: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default = "default_priority")]
    pub priority: i32,
}

fn default_priority() -> i32 {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedSeed {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChannelSeed {
    pub name: String,
    pub url: String,
    pub external_id: String,
}

/// Write-only interface for seeding sources into Postgres.
pub struct Seeder {
    pool: PgPool,
}

impl Seeder {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply a whole seed file. Existing rows (same topic text or same
    /// URL) are left untouched; new rows are inserted active.
    pub async fn apply(&self, file: &SourceSeedFile) -> Result<SeedReport> {
        let mut report = SeedReport::default();
        for topic in &file.topics {
            report.topics += self.upsert_topic(topic).await?;
        }
        for feed in &file.feeds {
            report.feeds += self.upsert_feed(feed).await?;
        }
        for channel in &file.channels {
            report.channels += self.upsert_channel(channel).await?;
        }
        info!(
            topics = report.topics,
            feeds = report.feeds,
            channels = report.channels,
            "Seed applied"
        );
        Ok(report)
    }

    async fn upsert_topic(&self, topic: &TopicSeed) -> Result<u32> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO topics (topic, keywords, priority)
            SELECT $1, $2, $3
            WHERE NOT EXISTS (SELECT 1 FROM topics WHERE topic = $1)
            "#,
        )
        .bind(&topic.topic)
        .bind(&topic.keywords)
        .bind(topic.priority)
        .execute(&self.pool)
        .await
        .map_err(transient)?;
        Ok(inserted.rows_affected() as u32)
    }

    async fn upsert_feed(&self, feed: &FeedSeed) -> Result<u32> {
        let inserted = sqlx::query(
            "INSERT INTO feeds (name, url) VALUES ($1, $2) ON CONFLICT (url) DO NOTHING",
        )
        .bind(&feed.name)
        .bind(&feed.url)
        .execute(&self.pool)
        .await
        .map_err(transient)?;
        Ok(inserted.rows_affected() as u32)
    }

    async fn upsert_channel(&self, channel: &ChannelSeed) -> Result<u32> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO channels (name, url, external_id)
            VALUES ($1, $2, $3)
            ON CONFLICT (url) DO NOTHING
            "#,
        )
        .bind(&channel.name)
        .bind(&channel.url)
        .bind(&channel.external_id)
        .execute(&self.pool)
        .await
        .map_err(transient)?;
        Ok(inserted.rows_affected() as u32)
    }
}

/// How many rows each section of a seed file actually inserted.
#[derive(Debug, Default, Clone, Copy)]
pub struct SeedReport {
    pub topics: u32,
    pub feeds: u32,
    pub channels: u32,
}

fn transient(e: sqlx::Error) -> DaybriefError {
    DaybriefError::StoreTransient(e.to_string())
}
