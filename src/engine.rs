//! Engine selection by name.
//!
//! | Name | Engine |
//! |------|--------|
//! | `tantivy` | on-disk [`TantivyEngine`] under [`Config::index_path`] |
//! | `memory` | [`InMemoryEngine`], lost on exit |
//!
//! Any other name falls back to `tantivy`.

use std::sync::Arc;

use anyhow::Result;
use sitesearch_core::engine::memory::InMemoryEngine;
use sitesearch_core::Engine;
use tracing::{info, warn};

use crate::config::Config;
use crate::tantivy_engine::TantivyEngine;

pub const DEFAULT_ENGINE: &str = "tantivy";

/// Opens the engine named by `search.engine`.
pub fn open_engine(config: &Config) -> Result<Arc<dyn Engine>> {
    match config.search.engine.as_str() {
        "memory" => {
            info!("using in-memory engine");
            Ok(Arc::new(InMemoryEngine::new()))
        }
        name => {
            if name != DEFAULT_ENGINE {
                warn!(engine = name, "unknown engine, using {}", DEFAULT_ENGINE);
            }
            let path = config.index_path();
            info!(path = %path.display(), "opening tantivy index");
            Ok(Arc::new(TantivyEngine::open_or_create(&path)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn unknown_name_falls_back_to_tantivy() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::minimal(tmp.path());
        config.search.index_dir = tmp.path().join("index");
        config.search.engine = "bleve".to_string();

        let engine = open_engine(&config).unwrap();
        assert_eq!(engine.count().await.unwrap(), 0);
        assert!(config.index_path().join("meta.json").exists());
    }

    #[tokio::test]
    async fn memory_engine_touches_no_disk() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::minimal(tmp.path());
        config.search.index_dir = tmp.path().join("index");
        config.search.engine = "memory".to_string();

        open_engine(&config).unwrap();
        assert!(!config.search.index_dir.exists());
    }
}
