use chrono::Utc;
use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use std::sync::Arc;

use flu_radar::api::types::Transaction;
use flu_radar::app::App;
use flu_radar::cache::{NoopStore, SnapshotStore, SqliteStore};
use flu_radar::config::{CacheConfig, Config};
use flu_radar::{logging, panels};

#[derive(Parser, Debug)]
#[command(name = "flu-radar")]
#[command(about = "Watch pharmacy-signal outbreak data from the terminal")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/flu-radar/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Backend base url, overriding config and FLU_RADAR_API_URL
  #[arg(long, global = true)]
  api_url: Option<String>,

  /// Don't read or write the snapshot cache
  #[arg(long, global = true)]
  no_cache: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Poll dashboard resources and print each change until Ctrl-C
  Watch {
    /// Pincode for the trends and outbreak status panels
    #[arg(short, long)]
    pincode: Option<String>,

    /// Comma-separated panels to watch (default: all)
    #[arg(long, value_delimiter = ',')]
    only: Vec<String>,
  },
  /// Show the outbreak status of one pincode
  Status { pincode: String },
  /// Submit one pharmacy transaction for anomaly scoring
  Submit {
    #[arg(long)]
    pincode: String,
    #[arg(long)]
    medicine: String,
    #[arg(long)]
    category: String,
    #[arg(long, default_value_t = 1)]
    quantity: u32,
    #[arg(long)]
    age: Option<u32>,
  },
  /// Run the simulated live transaction feed
  Feed {
    /// Stop after this many submitted transactions
    #[arg(short = 'n', long)]
    count: Option<usize>,
  },
  /// Check that the backend is reachable
  Health,
  /// Delete all persisted snapshots
  ClearCache,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let mut config = Config::load(args.config.as_deref())?;
  if let Some(url) = args.api_url {
    config.backend.url = url;
  }

  let _guard = logging::init(&config.log)?;

  if let Command::ClearCache = args.command {
    let store = SqliteStore::open(config.cache.path.as_deref())?;
    let removed = store.clear()?;
    println!("Removed {} cached snapshots", removed);
    return Ok(());
  }

  let store = open_store(&config.cache, args.no_cache);
  let app = App::new(config, Some(store))?;

  match args.command {
    Command::Watch { pincode, only } => {
      let panels = panels::select(&only).map_err(|e| eyre!(e))?;
      app.watch(pincode.as_deref(), &panels).await
    }
    Command::Status { pincode } => app.status(&pincode).await,
    Command::Submit {
      pincode,
      medicine,
      category,
      quantity,
      age,
    } => {
      app
        .submit(Transaction {
          timestamp: Utc::now(),
          pincode,
          medicine_name: medicine,
          category,
          quantity,
          customer_age: age,
        })
        .await
    }
    Command::Feed { count } => app.feed(count).await,
    Command::Health => app.health().await,
    Command::ClearCache => Ok(()),
  }
}

/// Snapshot store for this run. Falls back to no persistence if the
/// database can't be opened.
fn open_store(config: &CacheConfig, no_cache: bool) -> Arc<dyn SnapshotStore> {
  if no_cache || !config.persist {
    return Arc::new(NoopStore);
  }
  match SqliteStore::open(config.path.as_deref()) {
    Ok(store) => Arc::new(store),
    Err(e) => {
      tracing::warn!(error = %e, "Snapshot cache unavailable, continuing without it");
      Arc::new(NoopStore)
    }
  }
}
