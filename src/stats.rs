//! Index statistics for `sitesearch stats`.

use std::path::{Path, PathBuf};

use anyhow::Result;
use walkdir::WalkDir;

use crate::config::Config;
use crate::indexer::Indexer;

/// What `stats` reports.
#[derive(Debug)]
pub struct IndexStats {
    pub documents: u64,
    /// `None` for the in-memory engine.
    pub location: Option<PathBuf>,
    pub size_bytes: u64,
}

pub async fn collect_stats(config: &Config, indexer: &Indexer) -> IndexStats {
    let location = (config.search.engine != "memory").then(|| config.index_path());
    let size_bytes = location.as_deref().map(dir_size).unwrap_or(0);
    IndexStats {
        documents: indexer.count().await,
        location,
        size_bytes,
    }
}

/// Total size of the regular files under `dir`.
fn dir_size(dir: &Path) -> u64 {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum()
}

pub async fn run_stats(config: &Config, indexer: &Indexer) -> Result<()> {
    let stats = collect_stats(config, indexer).await;

    println!("sitesearch index stats");
    println!("======================");
    println!();
    println!("  Host:        {}", config.site.host);
    match &stats.location {
        Some(path) => {
            println!("  Index:       {}", path.display());
            println!("  Size:        {}", format_bytes(stats.size_bytes));
        }
        None => println!("  Index:       (memory)"),
    }
    println!("  Documents:   {}", stats.documents);
    println!();
    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MB");
    }

    #[test]
    fn dir_size_sums_files() {
        let tmp = tempfile::TempDir::new().unwrap();
        std::fs::write(tmp.path().join("a"), [0u8; 10]).unwrap();
        std::fs::create_dir(tmp.path().join("sub")).unwrap();
        std::fs::write(tmp.path().join("sub/b"), [0u8; 5]).unwrap();
        assert_eq!(dir_size(tmp.path()), 15);
    }
}
