//! # slack-qa CLI (`sqa`)
//!
//! Command-line interface for ingesting Slack channels into a vector index
//! and asking questions against them.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `sqa channels` | List channels visible to the bot |
//! | `sqa ingest <channel>` | Run one ingestion pass (incremental when a cursor exists) |
//! | `sqa ask <channel> "<question>"` | Answer a question from the channel's index |
//! | `sqa stats <channel>` | Show the persisted ingestion cursor |
//! | `sqa serve` | Start the HTTP API |
//!
//! ## Examples
//!
//! ```bash
//! # First-time (full) ingestion
//! sqa ingest general
//!
//! # Re-ingest everything, ignoring the cursor
//! sqa ingest general --full
//!
//! # Refresh, then answer
//! sqa ask general "what did we decide about the deploy?" --refresh
//! ```
//!
//! Credentials come from the environment (`SLACK_BOT_TOKEN`,
//! `OPENAI_API_KEY`); a `.env` file next to the working directory is loaded
//! automatically. Everything else is read from the TOML file given by
//! `--config` (default `./sqa.toml`; missing file means built-in defaults).

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use slack_qa::config;
use slack_qa::cursor::CursorStore;
use slack_qa::ingest::run_ingest;
use slack_qa::qa::answer_question;
use slack_qa::server::run_server;
use slack_qa::slack::SlackClient;

#[derive(Parser)]
#[command(
    name = "sqa",
    about = "Slack channel Q&A — incremental ingestion and retrieval-augmented answers",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./sqa.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List Slack channels visible to the bot.
    Channels {
        /// Only list public channels.
        #[arg(long)]
        public_only: bool,
    },

    /// Ingest new messages from a channel into the vector index.
    ///
    /// Incremental by default: only messages newer than the stored cursor
    /// are fetched. The cursor advances only after the documents are
    /// durably written to the index.
    Ingest {
        /// Channel name (also the vector collection name).
        channel: String,

        /// Ignore the stored cursor and re-ingest the whole history.
        #[arg(long)]
        full: bool,
    },

    /// Ask a question against a channel's indexed history.
    Ask {
        /// Channel name.
        channel: String,

        /// The question to answer.
        question: String,

        /// Number of context documents to retrieve (1-20).
        #[arg(long, default_value_t = 5)]
        top_k: usize,

        /// Ingest new messages before answering.
        #[arg(long)]
        refresh: bool,

        /// With --refresh, re-ingest the entire channel.
        #[arg(long)]
        full_refresh: bool,
    },

    /// Show the persisted ingestion cursor for a channel.
    Stats {
        /// Channel name.
        channel: String,
    },

    /// Start the HTTP API server.
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Channels { public_only } => {
            let client = SlackClient::new(&config.slack)?;
            let channels = client.list_channels(!public_only).await?;
            for channel in &channels {
                println!("{}  {}", channel.id, channel.name);
            }
            println!("{} channels", channels.len());
        }

        Commands::Ingest { channel, full } => {
            let outcome = run_ingest(&config, &channel, full).await?;
            println!("ingest {}", outcome.channel);
            println!("  mode: {}", outcome.mode);
            println!("  fetched: {} messages", outcome.fetched);
            println!("  filtered out: {}", outcome.filtered);
            println!("  indexed documents: {}", outcome.committed);
            println!("ok");
        }

        Commands::Ask {
            channel,
            question,
            top_k,
            refresh,
            full_refresh,
        } => {
            if !(1..=20).contains(&top_k) {
                anyhow::bail!("--top-k must be between 1 and 20");
            }
            if refresh {
                let outcome = run_ingest(&config, &channel, full_refresh).await?;
                println!(
                    "refreshed {} ({} new documents)",
                    outcome.channel, outcome.committed
                );
            }
            let result = answer_question(&config, &channel, &question, top_k).await?;
            println!("{}", result.answer);
            if !result.sources.is_empty() {
                println!();
                println!("sources:");
                for (i, doc) in result.sources.iter().enumerate() {
                    println!("  [{}] {} — {}", i + 1, doc.metadata.ts, doc.content);
                }
            }
        }

        Commands::Stats { channel } => {
            let cursors = CursorStore::load(&config.cursor.path);
            match cursors.get(&channel) {
                Some(cursor) => {
                    println!("stats {}", channel);
                    println!("  last timestamp: {}", cursor.last_timestamp);
                    println!("  total messages: {}", cursor.total_messages);
                    println!("  last updated: {}", cursor.last_updated);
                }
                None => {
                    println!("stats {}", channel);
                    println!("  no ingestion recorded");
                }
            }
        }

        Commands::Serve => {
            run_server(&config).await?;
        }
    }

    Ok(())
}
