//! # sitesearch CLI
//!
//! ## Usage
//!
//! ```bash
//! sitesearch --config ./sitesearch.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `sitesearch serve` | Serve the site with capture, search and periodic crawl |
//! | `sitesearch scan` | Crawl `site.root` once into the index |
//! | `sitesearch index <file>...` | Index specific files under `site.root` |
//! | `sitesearch search "<query>"` | Search the index |
//! | `sitesearch get <path>` | Print one indexed document |
//! | `sitesearch stats` | Document count and index location |
//!
//! ## Examples
//!
//! ```bash
//! sitesearch scan
//! sitesearch search "deployment guide" --json
//! sitesearch get /docs/index.html
//! sitesearch serve
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use sitesearch::config::{self, Config};
use sitesearch::crawler::{self, logical_path, wait_settled};
use sitesearch::server::{self, Site};
use sitesearch::{get, logging, search, stats};
use tracing::warn;

/// How long one-shot commands wait for piped records to be persisted.
const SETTLE_TIMEOUT: Duration = Duration::from_secs(300);

/// Full-text search for a static site.
#[derive(Parser)]
#[command(name = "sitesearch", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./sitesearch.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve `site.root` over HTTP with capture and search.
    ///
    /// Crawls the site at startup and every `expire_secs` when `crawl` is
    /// enabled. Stops on Ctrl-C.
    Serve,

    /// Crawl `site.root` once and wait until every file is processed.
    Scan,

    /// Index the given files. Each must live under `site.root`.
    Index {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Search the index.
    Search {
        query: String,

        /// Print a JSON array instead of text.
        #[arg(long)]
        json: bool,
    },

    /// Print the indexed document stored under a logical path.
    Get {
        /// Logical path, e.g. `/docs/index.html`.
        path: String,

        #[arg(long)]
        json: bool,
    },

    /// Show document count and index location.
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;
    logging::init_logging(&cfg.log.level);

    match cli.command {
        Commands::Serve => server::run_server(&cfg).await?,
        Commands::Scan => run_scan(&cfg).await?,
        Commands::Index { files } => run_index(&cfg, &files).await?,
        Commands::Search { query, json } => {
            let site = Site::open(&cfg)?;
            let results = search::run_query(&site.indexer, &query).await;
            search::print_results(&results, json)?;
        }
        Commands::Get { path, json } => {
            let site = Site::open(&cfg)?;
            get::run_get(&site.indexer, &path, json).await?;
        }
        Commands::Stats => {
            let site = Site::open(&cfg)?;
            stats::run_stats(&cfg, &site.indexer).await?;
        }
    }

    Ok(())
}

async fn run_scan(cfg: &Config) -> Result<()> {
    let site = Site::open(cfg)?;
    let report = crawler::scan(&cfg.site.root, &cfg.path_policy(), &site.pipeline).await?;
    let settled = wait_settled(&report.receipts, SETTLE_TIMEOUT).await;
    site.pipeline.shutdown().await;
    if !settled {
        bail!("timed out waiting for the scan to finish");
    }

    println!(
        "Scanned {}: {} piped, {} empty, {} unreadable. {} documents indexed.",
        cfg.site.root.display(),
        report.piped,
        report.empty,
        report.failed,
        site.indexer.count().await
    );
    Ok(())
}

async fn run_index(cfg: &Config, files: &[PathBuf]) -> Result<()> {
    let root = cfg
        .site
        .root
        .canonicalize()
        .with_context(|| format!("Failed to resolve site root: {}", cfg.site.root.display()))?;
    let site = Site::open(cfg)?;

    let mut receipts = Vec::new();
    for file in files {
        let Some((path, full_path)) = resolve_file(&root, file) else {
            warn!(file = %file.display(), "not a file under the site root, skipping");
            continue;
        };
        let mut record = site.indexer.record(path);
        record.set_full_path(full_path);
        receipts.push(record.track());
        site.pipeline.pipe(record).await;
    }

    let settled = wait_settled(&receipts, SETTLE_TIMEOUT).await;
    site.pipeline.shutdown().await;
    if !settled {
        bail!("timed out waiting for indexing to finish");
    }
    println!(
        "Submitted {} of {} files. {} documents indexed.",
        receipts.len(),
        files.len(),
        site.indexer.count().await
    );
    Ok(())
}

/// Logical path and absolute path of `file`, if it is a file under `root`.
fn resolve_file(root: &Path, file: &Path) -> Option<(String, PathBuf)> {
    let full_path = file.canonicalize().ok()?;
    if !full_path.is_file() {
        return None;
    }
    let path = logical_path(root, &full_path)?;
    Some((path, full_path))
}
