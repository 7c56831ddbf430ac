//! The four standard stages.
//!
//! Every stage passes ignored records straight through, so the drain can
//! reclaim them. None of them fails: problems are recorded by ignoring the
//! record.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sitesearch_core::{PathPolicy, Record};
use tracing::{debug, trace};

use super::{Stage, Step};
use crate::extract::{classify, Extracted};
use crate::indexer::Indexer;

/// Resubmissions allowed per record before it is given up on.
pub const MAX_RESUBMITS: u8 = 1;

/// Fills an empty body from `full_path`.
pub struct Read;

#[async_trait]
impl Stage for Read {
    fn name(&self) -> &'static str {
        "read"
    }

    async fn run(&self, record: Record) -> Step {
        if record.ignored() || record.body_len() > 0 {
            return Step::Continue(record);
        }
        let Some(full_path) = record.full_path().map(|p| p.to_path_buf()) else {
            return Step::Continue(record);
        };

        match tokio::fs::read(&full_path).await {
            Ok(bytes) => {
                record.write(&bytes);
                if record.modified() == DateTime::<Utc>::UNIX_EPOCH {
                    if let Ok(modified) = tokio::fs::metadata(&full_path)
                        .await
                        .and_then(|m| m.modified())
                    {
                        record.set_modified(DateTime::<Utc>::from(modified));
                    }
                }
                trace!(path = record.path(), bytes = bytes.len(), "read");
            }
            Err(e) => {
                debug!(
                    path = record.path(),
                    full_path = %full_path.display(),
                    error = %e,
                    "read failed, ignoring"
                );
                record.ignore();
            }
        }
        Step::Continue(record)
    }
}

/// Applies the include/exclude policy.
pub struct Validate {
    policy: PathPolicy,
}

impl Validate {
    pub fn new(policy: PathPolicy) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl Stage for Validate {
    fn name(&self) -> &'static str {
        "validate"
    }

    async fn run(&self, record: Record) -> Step {
        if !record.ignored() && !self.policy.is_indexable(record.path()) {
            trace!(path = record.path(), "excluded");
            record.ignore();
        }
        Step::Continue(record)
    }
}

/// Resubmits `record` while it has retries left, otherwise ignores it.
fn retry_or_ignore(record: Record, reason: &'static str) -> Step {
    if record.resubmits() < MAX_RESUBMITS {
        record.note_resubmit();
        debug!(path = record.path(), reason, "resubmitting");
        Step::Resubmit(record)
    } else {
        debug!(path = record.path(), reason, "giving up");
        record.ignore();
        Step::Continue(record)
    }
}

/// Classifies the content and sets title and body.
///
/// A record that was never loaded is merged with its persisted version
/// first. If that leaves the body empty (a capture still in progress, or an
/// empty source) the record is resubmitted once. If the body came entirely
/// from the index there is nothing new to write and the record is dropped
/// as ignored, keeping the stored document as is.
pub struct Parse {
    indexer: Arc<Indexer>,
}

impl Parse {
    pub fn new(indexer: Arc<Indexer>) -> Self {
        Self { indexer }
    }
}

#[async_trait]
impl Stage for Parse {
    fn name(&self) -> &'static str {
        "parse"
    }

    async fn run(&self, record: Record) -> Step {
        if record.ignored() {
            return Step::Continue(record);
        }

        if !record.loaded() {
            let had_body = record.body_len() > 0;
            let found = self.indexer.load(&record).await;
            if !had_body {
                if found && record.body_len() > 0 {
                    trace!(path = record.path(), "unchanged, keeping stored copy");
                    record.ignore();
                    return Step::Continue(record);
                }
                return retry_or_ignore(record, "empty body");
            }
        } else if record.body_len() == 0 {
            return retry_or_ignore(record, "empty body");
        }

        match classify(record.path(), &record.body()) {
            Extracted::Text { title } => record.set_title(title),
            Extracted::Html { title, body } => {
                record.set_title(title);
                record.set_body(body);
            }
            Extracted::Unindexable => {
                trace!(path = record.path(), "not indexable");
                record.ignore();
            }
        }
        Step::Continue(record)
    }
}

/// Hands live records to the indexer.
pub struct Index {
    indexer: Arc<Indexer>,
}

impl Index {
    pub fn new(indexer: Arc<Indexer>) -> Self {
        Self { indexer }
    }
}

#[async_trait]
impl Stage for Index {
    fn name(&self) -> &'static str {
        "index"
    }

    async fn run(&self, record: Record) -> Step {
        if record.ignored() {
            return Step::Continue(record);
        }
        if !record.loaded() {
            self.indexer.load(&record).await;
        }
        if record.body_len() == 0 {
            return retry_or_ignore(record, "empty body at index");
        }
        self.indexer.pipe(record).await;
        Step::Drop
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indexer::IndexerOptions;
    use sitesearch_core::engine::memory::InMemoryEngine;
    use sitesearch_core::{Engine, IndexDocument};

    fn indexer() -> (Arc<InMemoryEngine>, Arc<Indexer>) {
        let engine = Arc::new(InMemoryEngine::new());
        let indexer = Indexer::new(engine.clone(), IndexerOptions::default());
        (engine, indexer)
    }

    fn unwrap_continue(step: Step) -> Record {
        match step {
            Step::Continue(record) => record,
            other => panic!("expected Continue, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn read_fills_body_and_mtime() {
        let tmp = tempfile::TempDir::new().unwrap();
        let file = tmp.path().join("a.md");
        std::fs::write(&file, "hello").unwrap();
        let (_, indexer) = indexer();

        let mut record = indexer.record("/a.md");
        record.set_full_path(&file);
        let record = unwrap_continue(Read.run(record).await);
        assert_eq!(record.body_text(), "hello");
        assert!(record.modified() > DateTime::<Utc>::UNIX_EPOCH);
    }

    #[tokio::test]
    async fn read_failure_ignores() {
        let (_, indexer) = indexer();
        let mut record = indexer.record("/gone.md");
        record.set_full_path("/definitely/not/here.md");
        let record = unwrap_continue(Read.run(record).await);
        assert!(record.ignored());
    }

    #[tokio::test]
    async fn validate_ignores_excluded_paths() {
        let (_, indexer) = indexer();
        let stage = Validate::new(PathPolicy::compile(&["^/"], &["^/private/"]));
        let record = unwrap_continue(stage.run(indexer.record("/private/a.html")).await);
        assert!(record.ignored());
        let record = unwrap_continue(stage.run(indexer.record("/public/a.html")).await);
        assert!(!record.ignored());
    }

    #[tokio::test]
    async fn parse_sets_html_title_and_clean_body() {
        let (_, indexer) = indexer();
        let stage = Parse::new(indexer.clone());
        let record = indexer.record("/index.html");
        record.write(b"<html><head><title>Example</title></head><body>hi</body></html>");
        let record = unwrap_continue(stage.run(record).await);
        assert_eq!(record.title(), "Example");
        assert_eq!(record.body_text(), "hi");
        assert!(!record.ignored());
    }

    #[tokio::test]
    async fn parse_passes_text_through() {
        let (_, indexer) = indexer();
        let stage = Parse::new(indexer.clone());
        let record = indexer.record("/notes.md");
        record.write(b"hello");
        let record = unwrap_continue(stage.run(record).await);
        assert_eq!(record.title(), "notes.md");
        assert_eq!(record.body_text(), "hello");
    }

    #[tokio::test]
    async fn parse_ignores_non_html() {
        let (_, indexer) = indexer();
        let stage = Parse::new(indexer.clone());
        let record = indexer.record("/image.png");
        record.write(&[0x89, b'P', b'N', b'G']);
        let record = unwrap_continue(stage.run(record).await);
        assert!(record.ignored());
    }

    #[tokio::test]
    async fn parse_resubmits_empty_body_once() {
        let (_, indexer) = indexer();
        let stage = Parse::new(indexer.clone());
        let record = indexer.record("/pending.html");

        let record = match stage.run(record).await {
            Step::Resubmit(record) => record,
            other => panic!("expected Resubmit, got {:?}", other),
        };
        assert_eq!(record.resubmits(), 1);

        let record = unwrap_continue(stage.run(record).await);
        assert!(record.ignored());
    }

    #[tokio::test]
    async fn parse_keeps_stored_copy_for_empty_capture() {
        let (engine, indexer) = indexer();
        engine
            .index(
                "/kept.md",
                &IndexDocument {
                    path: "/kept.md".to_string(),
                    title: "kept.md".to_string(),
                    body: "stored".to_string(),
                    modified: "1".to_string(),
                    indexed: "2".to_string(),
                },
            )
            .await
            .unwrap();
        let stage = Parse::new(indexer.clone());
        let record = unwrap_continue(stage.run(indexer.record("/kept.md")).await);
        assert!(record.ignored());
        assert_eq!(engine.document("/kept.md").await.unwrap().unwrap().body, "stored");
    }

    #[tokio::test]
    async fn ignored_record_is_left_alone_by_every_stage() {
        let (_, indexer) = indexer();
        let record = indexer.record("/index.html");
        record.write(b"<title>T</title>body");
        record.ignore();

        let record = unwrap_continue(Read.run(record).await);
        let record = unwrap_continue(
            Validate::new(PathPolicy::match_all()).run(record).await,
        );
        let record = unwrap_continue(Parse::new(indexer.clone()).run(record).await);
        let record = unwrap_continue(Index::new(indexer.clone()).run(record).await);

        assert_eq!(record.title(), "");
        assert_eq!(record.body_text(), "<title>T</title>body");
        assert!(record.indexed().is_none());
        assert!(!record.loaded());
    }
}
