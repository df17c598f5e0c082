//! vigil command-line binary.
//!
//! Reads `config.toml` (or the path specified with `--config`), opens the
//! SQLite store, and runs one pipeline operation: sync a scraped batch,
//! sweep expired deadlines, archive a single listing, or report.

use std::{
  fs,
  io::Read as _,
  path::{Path, PathBuf},
};

use anyhow::Context as _;
use clap::{Parser, Subcommand, ValueEnum};
use serde::Deserialize;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use vigil_core::{
  listing::{CloseReason, ScrapedListing, SearchScope},
  loader::BatchLoader,
  reference::ReferenceKind,
  store::ListingStore,
};
use vigil_store_sqlite::SqliteStore;

#[derive(Parser)]
#[command(author, version, about = "Vigil listing sync and archive engine")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Reconcile a complete scrape batch against the store, then save the
  /// new listings.
  ///
  /// The batch must be the FULL result of one successful scrape pass for
  /// the scope; listings missing from it are archived as closed.
  Sync {
    /// Source site the batch came from.
    #[arg(long)]
    source:   String,
    /// Search query the pass covered.
    #[arg(long, default_value = "")]
    query:    String,
    /// Search location the pass covered.
    #[arg(long, default_value = "")]
    location: String,
    /// JSON array of scraped listings; `-` reads stdin.
    batch:    PathBuf,
  },

  /// Archive every active listing whose deadline has passed.
  Expire,

  /// Archive one listing by id.
  Archive {
    id: i64,
    #[arg(long, value_enum, default_value_t = ReasonArg::Closed)]
    reason: ReasonArg,
  },

  /// Print store statistics as JSON.
  Stats,

  /// Print the most-observed reference entities of one kind.
  Top {
    #[arg(value_enum)]
    kind:  KindArg,
    #[arg(long, default_value_t = 20)]
    limit: usize,
  },
}

#[derive(Clone, Copy, ValueEnum)]
enum KindArg {
  Company,
  Skill,
  Requirement,
  Benefit,
}

impl From<KindArg> for ReferenceKind {
  fn from(kind: KindArg) -> Self {
    match kind {
      KindArg::Company => Self::Company,
      KindArg::Skill => Self::Skill,
      KindArg::Requirement => Self::Requirement,
      KindArg::Benefit => Self::Benefit,
    }
  }
}

#[derive(Clone, Copy, ValueEnum)]
enum ReasonArg {
  Expired,
  Closed,
  NotFound,
  Duplicate,
}

impl From<ReasonArg> for CloseReason {
  fn from(reason: ReasonArg) -> Self {
    match reason {
      ReasonArg::Expired => Self::Expired,
      ReasonArg::Closed => Self::Closed,
      ReasonArg::NotFound => Self::NotFound,
      ReasonArg::Duplicate => Self::Duplicate,
    }
  }
}

#[derive(Clone, Deserialize)]
struct Settings {
  #[serde(default = "default_store_path")]
  store_path: PathBuf,
}

fn default_store_path() -> PathBuf { PathBuf::from("vigil.db") }

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Initialise tracing.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  // Load configuration.
  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::with_prefix("VIGIL"))
    .build()
    .context("failed to read config file")?;
  let settings: Settings = settings
    .try_deserialize()
    .context("failed to deserialise settings")?;

  let store_path = expand_tilde(&settings.store_path);
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  match cli.command {
    Command::Sync { source, query, location, batch } => {
      let scope = SearchScope::new(query, location);
      let listings = read_batch(&batch)?;

      let outcome = store
        .sync_batch(&source, &scope, &listings)
        .await
        .context("sync failed")?;
      let saved = BatchLoader::new(&store, source.as_str(), scope)
        .save_batch(&outcome.new)
        .await
        .context("failed to save new listings")?;

      println!(
        "synced {}: {} new ({} saved, {} skipped), {} existing, {} closed",
        source,
        outcome.new.len(),
        saved.saved,
        saved.skipped,
        outcome.existing,
        outcome.closed,
      );
    }

    Command::Expire => {
      let archived = store.expire_by_deadline().await.context("expire sweep failed")?;
      println!("archived {archived} expired listing(s)");
    }

    Command::Archive { id, reason } => {
      let archived = store
        .archive_listing(id, reason.into())
        .await
        .with_context(|| format!("failed to archive listing {id}"))?;
      if archived {
        println!("archived listing {id}");
      } else {
        println!("listing {id} not found in the active table");
      }
    }

    Command::Stats => {
      let stats = store.stats().await.context("failed to read stats")?;
      println!("{}", serde_json::to_string_pretty(&stats)?);
    }

    Command::Top { kind, limit } => {
      let entities = store
        .top_references(kind.into(), limit)
        .await
        .context("failed to query references")?;
      for entity in entities {
        match &entity.category {
          Some(category) => {
            println!("{:>6}  {}  [{}]", entity.count, entity.name, category)
          }
          None => println!("{:>6}  {}", entity.count, entity.name),
        }
      }
    }
  }

  Ok(())
}

/// Read a scraped batch from a JSON file, or stdin when the path is `-`.
fn read_batch(path: &Path) -> anyhow::Result<Vec<ScrapedListing>> {
  let raw = if path == Path::new("-") {
    let mut buffer = String::new();
    std::io::stdin().read_to_string(&mut buffer)?;
    buffer
  } else {
    fs::read_to_string(path)
      .with_context(|| format!("failed to read batch file {path:?}"))?
  };
  serde_json::from_str(&raw).context("batch is not a JSON array of listings")
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
