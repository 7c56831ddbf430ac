//! The indexer: sole owner of the engine handle and the record pool.
//!
//! | Operation | Behavior |
//! |-----------|----------|
//! | [`record`](Indexer::record) | clean record bound to a path; never fails |
//! | [`load`](Indexer::load) | merge the persisted version into a record |
//! | [`search`](Indexer::search) | ranked, loaded records; empty on any engine error |
//! | [`pipe`](Indexer::pipe) | queue a record for persistence |
//! | [`kill`](Indexer::kill) | return a record to the pool |
//!
//! Persistence runs on a single background worker fed by a bounded queue.
//! The worker stamps `indexed`, upserts the projection, and always releases
//! the record, whether the write succeeded or not. A failed write is logged
//! and not retried; the next scan resubmits the path.

use std::ops::Deref;
use std::sync::Arc;

use chrono::Utc;
use sitesearch_core::{Engine, EngineError, Record, RecordPool};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::config::SearchConfig;

/// Construction parameters for [`Indexer`].
#[derive(Debug, Clone)]
pub struct IndexerOptions {
    pub pool_capacity: usize,
    pub result_limit: usize,
    pub queue_capacity: usize,
}

impl Default for IndexerOptions {
    fn default() -> Self {
        Self {
            pool_capacity: sitesearch_core::pool::DEFAULT_POOL_CAPACITY,
            result_limit: 50,
            queue_capacity: 1,
        }
    }
}

impl From<&SearchConfig> for IndexerOptions {
    fn from(search: &SearchConfig) -> Self {
        Self {
            pool_capacity: search.pool_capacity,
            result_limit: search.result_limit,
            queue_capacity: search.queue_capacity,
        }
    }
}

struct Shared {
    engine: Arc<dyn Engine>,
    pool: RecordPool,
}

impl Shared {
    async fn persist(&self, record: Record) {
        if !record.ignored() && record.body_len() > 0 && record.mark_indexed(Utc::now()) {
            let doc = record.to_document();
            match self.engine.index(record.path(), &doc).await {
                Ok(()) => debug!(path = record.path(), "indexed"),
                Err(e) => warn!(path = record.path(), error = %e, "failed to index document"),
            }
        } else {
            trace!(path = record.path(), "nothing to persist");
        }
        self.pool.release(record);
    }
}

/// A loaded search result.
///
/// When `highlighted` is set the body holds the engine's fragment, which is
/// HTML with matches wrapped in `<mark>` and everything else escaped.
/// Otherwise the body is the stored plain text.
#[derive(Debug)]
pub struct SearchHit {
    pub record: Record,
    pub highlighted: bool,
}

impl Deref for SearchHit {
    type Target = Record;

    fn deref(&self) -> &Record {
        &self.record
    }
}

pub struct Indexer {
    shared: Arc<Shared>,
    queue: mpsc::Sender<Record>,
    result_limit: usize,
}

impl Indexer {
    /// Builds the indexer and spawns its persistence worker.
    ///
    /// Must be called from within a tokio runtime. The worker exits once
    /// the indexer is dropped and the queue is drained.
    pub fn new(engine: Arc<dyn Engine>, options: IndexerOptions) -> Arc<Self> {
        let shared = Arc::new(Shared {
            engine,
            pool: RecordPool::new(options.pool_capacity),
        });
        let (queue, mut rx) = mpsc::channel::<Record>(options.queue_capacity.max(1));

        let worker = shared.clone();
        tokio::spawn(async move {
            while let Some(record) = rx.recv().await {
                worker.persist(record).await;
            }
            trace!("index worker stopped");
        });

        Arc::new(Self {
            shared,
            queue,
            result_limit: options.result_limit.max(1),
        })
    }

    pub fn engine(&self) -> &Arc<dyn Engine> {
        &self.shared.engine
    }

    pub fn record(&self, path: impl Into<String>) -> Record {
        self.shared.pool.acquire(path)
    }

    /// Releases `record`; it must not be used afterwards.
    pub fn kill(&self, record: Record) {
        self.shared.pool.release(record);
    }

    /// Queues `record` for persistence, waiting only for queue space.
    pub async fn pipe(&self, record: Record) {
        if let Err(mpsc::error::SendError(record)) = self.queue.send(record).await {
            debug!(path = record.path(), "index worker gone, dropping record");
            self.kill(record);
        }
    }

    /// Merges the persisted document keyed by the record's path.
    ///
    /// Returns `false` when nothing is stored or the lookup failed; either
    /// way the record is marked loaded.
    pub async fn load(&self, record: &Record) -> bool {
        match self.shared.engine.document(record.path()).await {
            Ok(doc) => record.merge_persisted(doc.as_ref()),
            Err(e) => {
                debug!(path = record.path(), error = %e, "load failed");
                record.merge_persisted(None)
            }
        }
    }

    /// Runs `query` and returns the loaded hits, best first.
    ///
    /// When the engine produced a highlighted fragment it replaces the body.
    /// Hits that fail to load are dropped. Callers own the returned records
    /// and should [`kill`](Self::kill) them when done.
    pub async fn search(&self, query: &str) -> Vec<SearchHit> {
        let hits = match self.shared.engine.search(query, self.result_limit).await {
            Ok(hits) => hits,
            Err(EngineError::Query(reason)) => {
                debug!(query, reason = %reason, "rejected query");
                return Vec::new();
            }
            Err(e) => {
                warn!(query, error = %e, "search failed");
                return Vec::new();
            }
        };

        let mut results = Vec::with_capacity(hits.len());
        for hit in hits {
            let record = self.record(hit.key);
            if !self.load(&record).await {
                trace!(path = record.path(), "dropping unloadable hit");
                self.kill(record);
                continue;
            }
            let highlighted = match hit.fragment {
                Some(fragment) => {
                    record.set_body(fragment);
                    true
                }
                None => false,
            };
            results.push(SearchHit {
                record,
                highlighted,
            });
        }
        results
    }

    /// Number of persisted documents, `0` if the engine cannot say.
    pub async fn count(&self) -> u64 {
        match self.shared.engine.count().await {
            Ok(n) => n,
            Err(e) => {
                warn!(error = %e, "count failed");
                0
            }
        }
    }

    /// Number of idle records parked in the pool.
    pub fn idle_records(&self) -> usize {
        self.shared.pool.idle()
    }
}
