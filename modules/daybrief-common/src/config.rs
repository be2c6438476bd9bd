use std::env;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Postgres
    pub database_url: String,

    // AI provider (extraction + digest summary)
    pub anthropic_api_key: String,
    pub extractor_model: String,

    // Content providers
    pub research_api_key: String,
    pub transcript_api_key: String,

    // Run control
    /// Whole-run deadline in seconds.
    pub run_deadline_seconds: u64,
    /// Grace period for branches to drain after cancellation.
    pub cancel_drain_seconds: u64,
    pub provider_call_timeout_seconds: u64,
    pub store_operation_timeout_seconds: u64,
    pub max_retries: u32,

    // Gathering
    pub feed_entries_per_feed: usize,

    // Dedup and ranking
    pub title_similarity_threshold: f64,
    pub ranking_mention_weight: i32,
}

impl Config {
    /// Load configuration from environment variables.
    /// Panics with a clear message if required vars are missing.
    pub fn from_env() -> Self {
        Self {
            database_url: required_env("DATABASE_URL"),
            anthropic_api_key: required_env("ANTHROPIC_API_KEY"),
            extractor_model: env::var("EXTRACTOR_MODEL")
                .unwrap_or_else(|_| "claude-haiku-4-5-20251001".to_string()),
            research_api_key: required_env("RESEARCH_API_KEY"),
            transcript_api_key: env::var("TRANSCRIPT_API_KEY").unwrap_or_default(),
            run_deadline_seconds: env_or("RUN_DEADLINE_SECONDS", 1800),
            cancel_drain_seconds: env_or("CANCEL_DRAIN_SECONDS", 30),
            provider_call_timeout_seconds: env_or("PROVIDER_CALL_TIMEOUT_SECONDS", 60),
            store_operation_timeout_seconds: env_or("STORE_OPERATION_TIMEOUT_SECONDS", 10),
            max_retries: env_or("MAX_RETRIES", 3),
            feed_entries_per_feed: env_or("FEED_ENTRIES_PER_FEED", 10),
            title_similarity_threshold: env_or("TITLE_SIMILARITY_THRESHOLD", 0.70),
            ranking_mention_weight: env_or("RANKING_MENTION_WEIGHT", 2),
        }
    }

    /// Log config with secrets redacted to presence + length.
    pub fn log_redacted(&self) {
        let secrets = [
            ("DATABASE_URL", &self.database_url),
            ("ANTHROPIC_API_KEY", &self.anthropic_api_key),
            ("RESEARCH_API_KEY", &self.research_api_key),
            ("TRANSCRIPT_API_KEY", &self.transcript_api_key),
        ];
        for (name, value) in secrets {
            if value.is_empty() {
                tracing::info!("{name} = (empty)");
            } else {
                tracing::info!("{name} = ({} chars)", value.len());
            }
        }
        tracing::info!(
            extractor_model = %self.extractor_model,
            run_deadline_seconds = self.run_deadline_seconds,
            provider_call_timeout_seconds = self.provider_call_timeout_seconds,
            store_operation_timeout_seconds = self.store_operation_timeout_seconds,
            max_retries = self.max_retries,
            feed_entries_per_feed = self.feed_entries_per_feed,
            title_similarity_threshold = self.title_similarity_threshold,
            ranking_mention_weight = self.ranking_mention_weight,
            "Run configuration"
        );
    }
}

impl Default for Config {
    /// Defaults with empty credentials. Used by tests that never touch
    /// the network or a real database.
    fn default() -> Self {
        Self {
            database_url: String::new(),
            anthropic_api_key: String::new(),
            extractor_model: "claude-haiku-4-5-20251001".to_string(),
            research_api_key: String::new(),
            transcript_api_key: String::new(),
            run_deadline_seconds: 1800,
            cancel_drain_seconds: 30,
            provider_call_timeout_seconds: 60,
            store_operation_timeout_seconds: 10,
            max_retries: 3,
            feed_entries_per_feed: 10,
            title_similarity_threshold: 0.70,
            ranking_mention_weight: 2,
        }
    }
}

fn required_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} environment variable is required"))
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}
