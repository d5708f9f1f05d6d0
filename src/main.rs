mod cache;
mod config;
mod error;
mod glue;
mod http;
mod logging;
mod network;
mod worker;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use std::io::Write;
use std::path::PathBuf;
use tracing::info;

use crate::cache::{CacheStorage, SqliteStorage};
use crate::config::Config;
use crate::http::Request;
use crate::network::HttpNetwork;
use crate::worker::{Interceptor, SweepReport, WorkerHost, WorkerState};

#[derive(Parser, Debug)]
#[command(name = "pantry")]
#[command(about = "Cache-first offline shim for the recipe site")]
#[command(version)]
struct Args {
  /// Path to config file (default: ./pantry.yaml or $XDG_CONFIG_HOME/pantry/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Cache version tag, overriding the config file and PANTRY_CACHE_VERSION
  #[arg(long, global = true)]
  cache_version: Option<String>,

  /// Cache database path
  #[arg(long, global = true)]
  db: Option<PathBuf>,

  /// Write logs to this file instead of stderr
  #[arg(long, global = true)]
  log_file: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Open the current cache and store every seed resource (all or nothing)
  Install,
  /// Delete every cache bucket except the current one
  Activate,
  /// Fetch a path cache-first and write the body to stdout
  Fetch {
    /// Site path or absolute URL
    path: String,
    #[arg(short = 'X', long, default_value = "GET")]
    method: String,
  },
  /// List cache buckets
  Buckets,
  /// Print the template snippet that registers the worker
  Snippet,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _log_guard = logging::init(args.log_file.as_deref())?;

  let mut config = Config::load(args.config.as_deref())?.with_cache_version(args.cache_version)?;
  if let Some(db) = args.db {
    config.database = Some(db);
  }

  match args.command {
    Command::Snippet => {
      print!("{}", glue::render(&config));
    }
    Command::Install => {
      let mut host = WorkerHost::new(interceptor(&config)?);
      let report = host.install().await?;
      println!("Seeded {} entries into {}", report.seeded, report.bucket);
    }
    Command::Activate => {
      let mut host = WorkerHost::attach(interceptor(&config)?)?;
      let report = if host.state() == WorkerState::Activated {
        // Buckets whose deletion failed last time get another attempt
        info!("Worker already active, sweeping leftover caches");
        host.interceptor().on_activate().await?
      } else {
        host.activate().await?
      };
      print_sweep(&report);
    }
    Command::Fetch { path, method } => {
      let host = WorkerHost::attach(interceptor(&config)?)?;
      let url = host.interceptor().network().resolve(&path)?;
      let fetched = host.fetch(Request::new(&method, url)).await?;
      info!(
        status = fetched.response.status,
        source = ?fetched.source,
        "Fetched {}",
        path
      );
      std::io::stdout().write_all(&fetched.response.body)?;
    }
    Command::Buckets => {
      let current = config.cache_name();
      let storage = SqliteStorage::open(&config.database_path()?)?;
      for bucket in storage.buckets()? {
        let marker = if bucket.name == current { " (current)" } else { "" };
        let activated = match bucket.activated_at {
          Some(at) => format!("\tactivated {}", at.format("%Y-%m-%d %H:%M:%S")),
          None => String::new(),
        };
        println!(
          "{}\t{} entries\tcreated {}{}{}",
          bucket.name,
          bucket.entries,
          bucket.created_at.format("%Y-%m-%d %H:%M:%S"),
          activated,
          marker
        );
      }
    }
  }

  Ok(())
}

/// Interceptor over the configured database and origin.
fn interceptor(config: &Config) -> Result<Interceptor<SqliteStorage, HttpNetwork>> {
  let storage = SqliteStorage::open(&config.database_path()?)?;
  let network = HttpNetwork::new(config.origin_url()?, config.request_timeout())?;
  Ok(Interceptor::new(storage, network, config.cache_settings()?))
}

fn print_sweep(report: &SweepReport) {
  for name in &report.deleted {
    println!("deleted\t{}", name);
  }
  for failure in &report.failed {
    println!("failed\t{}\t{}", failure.bucket, failure.reason);
  }
  for name in &report.kept {
    println!("kept\t{}", name);
  }
}
