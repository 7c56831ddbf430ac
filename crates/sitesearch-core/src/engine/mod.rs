//! Full-text engine abstraction.
//!
//! The [`Engine`] trait is the only seam between the indexing pipeline and
//! the backend that stores and queries documents. Documents are keyed by
//! their logical path; indexing an existing key replaces it.
//!
//! Implementations must be `Send + Sync` so one engine can be shared by the
//! pipeline worker and concurrent search requests.
//!
//! | Backend | Where |
//! |---------|-------|
//! | [`InMemoryEngine`](memory::InMemoryEngine) | this crate, tests and ephemeral runs |
//! | tantivy | `sitesearch::tantivy_engine` |

pub mod memory;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::models::IndexDocument;

/// A single ranked match.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Hit {
    /// Logical document key.
    pub key: String,
    pub score: f32,
    /// Highlighted body excerpt as HTML: matches in `<mark>`, other text
    /// escaped.
    pub fragment: Option<String>,
}

#[derive(Debug, Error)]
pub enum EngineError {
    /// The query string could not be parsed.
    #[error("invalid query: {0}")]
    Query(String),

    /// The backing store failed.
    #[error("{subsystem} error: {source}")]
    Storage {
        subsystem: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl EngineError {
    pub fn storage(
        subsystem: &'static str,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::Storage {
            subsystem,
            source: source.into(),
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Abstract full-text backend.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | `index` | Upsert a document under its key |
/// | `document` | Fetch the stored fields for a key |
/// | `search` | Ranked query, best first, at most `limit` hits |
/// | `count` | Number of stored documents |
#[async_trait]
pub trait Engine: Send + Sync {
    async fn index(&self, key: &str, doc: &IndexDocument) -> EngineResult<()>;

    /// `Ok(None)` when nothing is stored under `key`.
    async fn document(&self, key: &str) -> EngineResult<Option<IndexDocument>>;

    async fn search(&self, query: &str, limit: usize) -> EngineResult<Vec<Hit>>;

    async fn count(&self) -> EngineResult<u64>;
}
