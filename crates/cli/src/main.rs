//! Query-side driver for the chat search index.
//!
//! Opens the stores built by the indexing bot and answers searches against
//! them. Commands that need the live messaging transport go through the
//! bot process instead.

mod logging;

use anyhow::Context as _;
use chatdex_core::{Config, record_key};
use clap::{Parser, Subcommand};
use indexer::client::UnavailableClient;
use indexer::{AppContext, Indexer};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "chatdex", about = "Multimodal search index over a chat feed")]
struct Cli {
  /// Path to the JSON configuration file
  #[arg(long, default_value = "./config.json")]
  config: PathBuf,

  /// Directory holding the record store and vector index
  #[arg(long, default_value = "./data")]
  data_dir: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Semantic search with a text query
  Search {
    query: String,
    #[arg(short = 'k', long, default_value_t = 10)]
    top_k: usize,
  },
  /// Semantic search with an image file as the query
  SearchImage {
    path: PathBuf,
    #[arg(short = 'k', long, default_value_t = 10)]
    top_k: usize,
  },
  /// Substring scan over the indexed text
  Scan {
    query: String,
    #[arg(long, default_value_t = 10)]
    limit: usize,
  },
  /// Print the indexed record of one message
  Info { message_id: i64 },
  /// Store and index statistics
  Stats,
  /// Backfill image files on records indexed by older versions
  Upgrade,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  logging::init();
  let cli = Cli::parse();

  let config = Config::load(&cli.config).context("failed to load configuration")?;
  let ctx = Arc::new(
    AppContext::initialize(config, &cli.data_dir, Arc::new(UnavailableClient)).context("failed to open stores")?,
  );
  ctx.start_snapshot_timer();
  let indexer = Indexer::new(ctx.clone());

  match cli.command {
    Command::Search { query, top_k } => {
      for hit in indexer.search(&query, top_k).await? {
        println!("{:>10.4}  {}", hit.score, hit.record);
      }
    }
    Command::SearchImage { path, top_k } => {
      for hit in indexer.search_image(&path.to_string_lossy(), top_k).await? {
        println!("{:>10.4}  {}", hit.score, hit.record);
      }
    }
    Command::Scan { query, limit } => {
      for record in indexer.scan_substring(&query, limit) {
        println!("{record}");
      }
    }
    Command::Info { message_id } => match ctx.store.get(&record_key(message_id)) {
      Some(record) => println!("{record}"),
      None => println!("no record for message {message_id}"),
    },
    Command::Stats => {
      let vectors = ctx.vector_index.as_ref().map_or(0, |index| index.len());
      println!("{} records, {} vectors", ctx.store.len(), vectors);
    }
    Command::Upgrade => {
      let upgraded = indexer.upgrade_database().await?;
      println!("upgraded {upgraded} records");
    }
  }

  // Clean shutdown persists the vector index.
  ctx.snapshot_vector_index();
  Ok(())
}
