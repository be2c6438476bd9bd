use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use daybrief_common::{Config, Digest};
use daybrief_engine::extractor::LlmExtractor;
use daybrief_engine::feeds::HttpFeedFetcher;
use daybrief_engine::research::TavilyResearcher;
use daybrief_engine::state::PipelineDeps;
use daybrief_engine::synthesizer::LlmSummaryWriter;
use daybrief_engine::transcripts::ApiTranscriptProvider;
use daybrief_store::{NewsStore, PgNewsStore, Seeder, SourceSeedFile};
use transcript_client::TranscriptClient;

#[derive(Parser, Debug)]
#[command(name = "daybrief", about = "Daily AI news digest pipeline")]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Gather from all sources and produce the day's digest.
    Run {
        /// Run date (YYYY-MM-DD). Defaults to today in local time.
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Re-rank and re-compose the digest from already-persisted items.
    Synthesize {
        /// Run date (YYYY-MM-DD). Defaults to today in local time.
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Print the most recently archived digest for a date.
    Show {
        /// Run date (YYYY-MM-DD). Defaults to today in local time.
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Load curated sources from a JSON seed file.
    Seed {
        /// Path to the seed file.
        #[arg(long)]
        file: PathBuf,
    },
    /// Run database migrations and exit.
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Daybrief starting...");

    let args = Args::parse();
    let config = Config::from_env();
    config.log_redacted();

    // Connect to Postgres and run migrations
    let store =
        PgNewsStore::connect(&config.database_url, config.title_similarity_threshold).await?;
    store.migrate().await?;

    let command = args.command.unwrap_or(Command::Run { date: None });
    match &command {
        Command::Migrate => {
            info!("Migrations applied");
            return Ok(());
        }
        Command::Seed { file } => {
            let raw = std::fs::read_to_string(file)?;
            let seed_file: SourceSeedFile = serde_json::from_str(&raw)?;
            let report = Seeder::new(store.pool()).apply(&seed_file).await?;
            println!(
                "Seeded {} topics, {} feeds, {} channels",
                report.topics, report.feeds, report.channels
            );
            return Ok(());
        }
        Command::Show { date } => {
            let run_date = (*date).unwrap_or_else(|| chrono::Local::now().date_naive());
            match store.latest_digest(run_date).await? {
                Some(digest) => print_digest(&digest),
                None => println!("No digest archived for {run_date}"),
            }
            return Ok(());
        }
        Command::Run { .. } | Command::Synthesize { .. } => {}
    }

    let deps = Arc::new(PipelineDeps {
        store: Arc::new(store),
        research: Arc::new(TavilyResearcher::new(&config.research_api_key)),
        feeds: Arc::new(HttpFeedFetcher::new()),
        transcripts: Arc::new(ApiTranscriptProvider::new(TranscriptClient::new(
            config.transcript_api_key.clone(),
        ))),
        extractor: Arc::new(LlmExtractor::new(
            &config.anthropic_api_key,
            &config.extractor_model,
        )),
        summary: Arc::new(LlmSummaryWriter::new(
            &config.anthropic_api_key,
            &config.extractor_model,
        )),
        config: config.clone(),
    });

    let digest = match command {
        Command::Run { date } => daybrief_engine::run(deps, date).await?,
        Command::Synthesize { date } => daybrief_engine::resynthesize(deps, date).await?,
        _ => unreachable!("handled above"),
    };

    print_digest(&digest);
    Ok(())
}

fn print_digest(digest: &Digest) {
    println!("\n=== Digest for {} ===", digest.run_date);
    for (i, item) in digest.items.iter().enumerate() {
        println!(
            "{:2}. {} — {} mention(s), relevance {}, via {}",
            i + 1,
            item.title,
            item.mention_count,
            item.relevance_score,
            item.source_type,
        );
    }
    println!("\n{}", digest.summary);
}
