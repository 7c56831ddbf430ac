//! Filesystem crawl of the site root.
//!
//! Walks `site.root` recursively and pipes every indexable regular file.
//! The logical path of a file is its root-relative path with `/`
//! separators and a leading `/`. Entries whose name starts with `.` are
//! skipped; hidden directories are pruned whole. The path policy is applied
//! before reading, so excluded files are never opened.
//!
//! [`spawn_rescan`] scans once at startup and again every `expire_secs`,
//! but only when the last record of the previous scan has settled. Ticks
//! that fire while a scan is still in flight are dropped.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use sitesearch_core::{PathPolicy, Receipt};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

use crate::pipeline::Pipeline;

/// A file found by the walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanEntry {
    /// Logical path, e.g. `/docs/index.html`.
    pub path: String,
    pub full_path: PathBuf,
}

/// Counts from one crawl.
#[derive(Debug, Default)]
pub struct ScanReport {
    /// Files piped with content.
    pub piped: usize,
    /// Empty files, piped already ignored.
    pub empty: usize,
    /// Files that could not be read.
    pub failed: usize,
    /// One receipt per piped record, in pipe order.
    pub receipts: Vec<Receipt>,
}

impl ScanReport {
    /// Receipt of the last record piped, if any.
    pub fn last(&self) -> Option<&Receipt> {
        self.receipts.last()
    }

    /// Whether every piped record has been released.
    pub fn settled(&self) -> bool {
        self.receipts.iter().all(Receipt::is_settled)
    }
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .map(|name| name.starts_with('.'))
            .unwrap_or(false)
}

/// `/`-joined root-relative path with a leading `/`.
pub fn logical_path(root: &Path, full_path: &Path) -> Option<String> {
    let relative = full_path.strip_prefix(root).ok()?;
    let mut out = String::new();
    for component in relative.components() {
        out.push('/');
        out.push_str(&component.as_os_str().to_string_lossy());
    }
    if out.is_empty() {
        None
    } else {
        Some(out)
    }
}

/// Lists the indexable files under `root`, sorted by logical path.
pub fn discover(root: &Path, policy: &PathPolicy) -> Result<Vec<ScanEntry>> {
    if !root.is_dir() {
        bail!("site root is not a directory: {}", root.display());
    }

    let mut entries = Vec::new();
    let walker = WalkDir::new(root).into_iter().filter_entry(|e| !is_hidden(e));
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                debug!(error = %e, "skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(path) = logical_path(root, entry.path()) else {
            continue;
        };
        if !policy.is_indexable(&path) {
            continue;
        }
        entries.push(ScanEntry {
            path,
            full_path: entry.into_path(),
        });
    }

    entries.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(entries)
}

/// Crawls `root` once and pipes every indexable file.
pub async fn scan(root: &Path, policy: &PathPolicy, pipeline: &Pipeline) -> Result<ScanReport> {
    let walk_root = root.to_path_buf();
    let walk_policy = policy.clone();
    let entries = tokio::task::spawn_blocking(move || discover(&walk_root, &walk_policy))
        .await
        .context("directory walk panicked")??;

    let indexer = pipeline.indexer();
    let mut report = ScanReport::default();
    for entry in entries {
        let (bytes, modified) = match read_entry(&entry.full_path).await {
            Ok(read) => read,
            Err(e) => {
                debug!(path = %entry.path, error = %e, "skipping unreadable file");
                report.failed += 1;
                continue;
            }
        };

        let mut record = indexer.record(entry.path);
        record.set_full_path(entry.full_path);
        record.set_modified(modified);
        if bytes.is_empty() {
            record.ignore();
            report.empty += 1;
        } else {
            record.write(&bytes);
            report.piped += 1;
        }
        report.receipts.push(record.track());
        pipeline.pipe(record).await;
    }

    debug!(
        root = %root.display(),
        piped = report.piped,
        empty = report.empty,
        failed = report.failed,
        "scan complete"
    );
    Ok(report)
}

async fn read_entry(path: &Path) -> std::io::Result<(Vec<u8>, DateTime<Utc>)> {
    let bytes = tokio::fs::read(path).await?;
    let modified = tokio::fs::metadata(path)
        .await?
        .modified()
        .map(DateTime::<Utc>::from)
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
    Ok((bytes, modified))
}

/// Waits until every receipt settles or `timeout` passes. Returns whether
/// they all settled.
pub async fn wait_settled(receipts: &[Receipt], timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while !receipts.iter().all(Receipt::is_settled) {
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    true
}

/// Scans now and then every `every`, until `cancel` fires.
pub fn spawn_rescan(
    root: PathBuf,
    policy: PathPolicy,
    pipeline: Arc<Pipeline>,
    every: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last: Option<Receipt> = None;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            if last.as_ref().is_some_and(|r| !r.is_settled()) {
                debug!("previous scan still in flight, skipping tick");
                continue;
            }

            match scan(&root, &policy, &pipeline).await {
                Ok(mut report) => {
                    info!(piped = report.piped, empty = report.empty, "site scanned");
                    if let Some(receipt) = report.receipts.pop() {
                        last = Some(receipt);
                    }
                }
                Err(e) => warn!(error = %e, "scan failed"),
            }
        }
        debug!("rescan stopped");
    })
}
