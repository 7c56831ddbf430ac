//! tantivy-backed [`Engine`].
//!
//! # Schema
//!
//! | Field | Options | Purpose |
//! |-------|---------|---------|
//! | `Path` | `STRING \| STORED` | exact-match key, used for upsert and lookup |
//! | `Title` | `TEXT \| STORED` | tokenized, searchable |
//! | `Body` | `TEXT \| STORED` | tokenized, searchable, snippet source |
//! | `Modified` | `STRING \| STORED` | decimal seconds since the epoch |
//! | `Indexed` | `STRING \| STORED` | decimal seconds since the epoch |
//!
//! Upsert is `delete_term(Path)` followed by `add_document` and a commit.
//! The reader uses a manual reload policy and is reloaded after every
//! commit, so a document is searchable as soon as `index` returns.
//!
//! tantivy is synchronous; every call runs on the blocking pool. The writer
//! is created on first write, so read-only commands never take the index
//! lock.

use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Context, Result};
use async_trait::async_trait;
use sitesearch_core::engine::{EngineError, EngineResult};
use sitesearch_core::models::{
    FIELD_BODY, FIELD_INDEXED, FIELD_MODIFIED, FIELD_PATH, FIELD_TITLE,
};
use sitesearch_core::{Engine, Hit, IndexDocument};
use tantivy::collector::TopDocs;
use tantivy::directory::MmapDirectory;
use tantivy::query::{Query, QueryParser, TermQuery};
use tantivy::schema::{Field, IndexRecordOption, Schema, Value, STORED, STRING, TEXT};
use tantivy::snippet::SnippetGenerator;
use tantivy::{Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, Term};
use tracing::debug;

const WRITER_HEAP_BYTES: usize = 50_000_000;
const SNIPPET_MAX_CHARS: usize = 200;

#[derive(Debug, Clone, Copy)]
struct Fields {
    path: Field,
    title: Field,
    body: Field,
    modified: Field,
    indexed: Field,
}

fn build_schema() -> (Schema, Fields) {
    let mut builder = Schema::builder();
    let fields = Fields {
        path: builder.add_text_field(FIELD_PATH, STRING | STORED),
        title: builder.add_text_field(FIELD_TITLE, TEXT | STORED),
        body: builder.add_text_field(FIELD_BODY, TEXT | STORED),
        modified: builder.add_text_field(FIELD_MODIFIED, STRING | STORED),
        indexed: builder.add_text_field(FIELD_INDEXED, STRING | STORED),
    };
    (builder.build(), fields)
}

fn storage(e: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> EngineError {
    EngineError::storage("tantivy", e)
}

struct Inner {
    index: Index,
    reader: IndexReader,
    writer: Mutex<Option<IndexWriter>>,
    fields: Fields,
}

/// Full-text engine over a tantivy index.
#[derive(Clone)]
pub struct TantivyEngine {
    inner: Arc<Inner>,
}

impl TantivyEngine {
    /// Opens the index in `dir`, creating the directory and index if needed.
    pub fn open_or_create(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create index directory: {}", dir.display()))?;
        let (schema, fields) = build_schema();
        let directory = MmapDirectory::open(dir)
            .with_context(|| format!("Failed to open index directory: {}", dir.display()))?;
        let index = Index::open_or_create(directory, schema)
            .with_context(|| format!("Failed to open index at {}", dir.display()))?;
        Self::from_index(index, fields)
    }

    /// A throwaway index held entirely in memory.
    pub fn in_ram() -> Result<Self> {
        let (schema, fields) = build_schema();
        Self::from_index(Index::create_in_ram(schema), fields)
    }

    fn from_index(index: Index, fields: Fields) -> Result<Self> {
        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()
            .context("Failed to create index reader")?;
        Ok(Self {
            inner: Arc::new(Inner {
                index,
                reader,
                writer: Mutex::new(None),
                fields,
            }),
        })
    }

    async fn blocking<T, F>(&self, f: F) -> EngineResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Inner) -> EngineResult<T> + Send + 'static,
    {
        let inner = self.inner.clone();
        tokio::task::spawn_blocking(move || f(&inner))
            .await
            .map_err(storage)?
    }
}

impl Inner {
    fn to_tantivy_doc(&self, doc: &IndexDocument) -> TantivyDocument {
        let mut out = TantivyDocument::new();
        out.add_text(self.fields.path, &doc.path);
        out.add_text(self.fields.title, &doc.title);
        out.add_text(self.fields.body, &doc.body);
        out.add_text(self.fields.modified, &doc.modified);
        out.add_text(self.fields.indexed, &doc.indexed);
        out
    }

    fn text(&self, doc: &TantivyDocument, field: Field) -> Option<String> {
        doc.get_first(field)
            .and_then(|v| v.as_str())
            .map(str::to_string)
    }

    /// `None` when the stored document has no key.
    fn from_tantivy_doc(&self, doc: &TantivyDocument) -> Option<IndexDocument> {
        Some(IndexDocument {
            path: self.text(doc, self.fields.path)?,
            title: self.text(doc, self.fields.title).unwrap_or_default(),
            body: self.text(doc, self.fields.body).unwrap_or_default(),
            modified: self.text(doc, self.fields.modified).unwrap_or_default(),
            indexed: self.text(doc, self.fields.indexed).unwrap_or_default(),
        })
    }

    fn index(&self, key: &str, doc: &IndexDocument) -> EngineResult<()> {
        let mut guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        if guard.is_none() {
            let writer: IndexWriter = self
                .index
                .writer_with_num_threads(1, WRITER_HEAP_BYTES)
                .map_err(storage)?;
            *guard = Some(writer);
        }
        let Some(writer) = guard.as_mut() else {
            return Err(storage("index writer unavailable"));
        };

        writer.delete_term(Term::from_field_text(self.fields.path, key));
        let mut stored = doc.clone();
        stored.path = key.to_string();
        writer
            .add_document(self.to_tantivy_doc(&stored))
            .map_err(storage)?;
        writer.commit().map_err(storage)?;
        drop(guard);

        self.reader.reload().map_err(storage)
    }

    fn document(&self, key: &str) -> EngineResult<Option<IndexDocument>> {
        let searcher = self.reader.searcher();
        let query = TermQuery::new(
            Term::from_field_text(self.fields.path, key),
            IndexRecordOption::Basic,
        );
        let top = searcher
            .search(&query, &TopDocs::with_limit(1))
            .map_err(storage)?;
        let Some((_, address)) = top.into_iter().next() else {
            return Ok(None);
        };
        let doc: TantivyDocument = searcher.doc(address).map_err(storage)?;
        Ok(self.from_tantivy_doc(&doc))
    }

    fn search(&self, query: &str, limit: usize) -> EngineResult<Vec<Hit>> {
        if query.trim().is_empty() {
            return Err(EngineError::Query("empty query".to_string()));
        }
        let parser = QueryParser::for_index(&self.index, vec![self.fields.title, self.fields.body]);
        let parsed: Box<dyn Query> = parser
            .parse_query(query)
            .map_err(|e| EngineError::Query(e.to_string()))?;

        let searcher = self.reader.searcher();
        let top = searcher
            .search(&*parsed, &TopDocs::with_limit(limit.max(1)))
            .map_err(storage)?;

        let snippets = match SnippetGenerator::create(&searcher, &*parsed, self.fields.body) {
            Ok(mut generator) => {
                generator.set_max_num_chars(SNIPPET_MAX_CHARS);
                Some(generator)
            }
            Err(e) => {
                debug!(error = %e, "snippet generator unavailable");
                None
            }
        };

        let mut hits = Vec::with_capacity(top.len());
        for (score, address) in top {
            let doc: TantivyDocument = searcher.doc(address).map_err(storage)?;
            let Some(key) = self.text(&doc, self.fields.path) else {
                continue;
            };
            let fragment = snippets.as_ref().and_then(|generator| {
                let mut snippet = generator.snippet_from_doc(&doc);
                snippet.set_snippet_prefix_postfix("<mark>", "</mark>");
                let html = snippet.to_html();
                if html.is_empty() {
                    None
                } else {
                    Some(html)
                }
            });
            hits.push(Hit {
                key,
                score,
                fragment,
            });
        }
        Ok(hits)
    }
}

#[async_trait]
impl Engine for TantivyEngine {
    async fn index(&self, key: &str, doc: &IndexDocument) -> EngineResult<()> {
        let key = key.to_string();
        let doc = doc.clone();
        self.blocking(move |inner| inner.index(&key, &doc)).await
    }

    async fn document(&self, key: &str) -> EngineResult<Option<IndexDocument>> {
        let key = key.to_string();
        self.blocking(move |inner| inner.document(&key)).await
    }

    async fn search(&self, query: &str, limit: usize) -> EngineResult<Vec<Hit>> {
        let query = query.to_string();
        self.blocking(move |inner| inner.search(&query, limit)).await
    }

    async fn count(&self) -> EngineResult<u64> {
        self.blocking(|inner| Ok(inner.reader.searcher().num_docs()))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(path: &str, title: &str, body: &str, indexed: &str) -> IndexDocument {
        IndexDocument {
            path: path.to_string(),
            title: title.to_string(),
            body: body.to_string(),
            modified: "1600000000".to_string(),
            indexed: indexed.to_string(),
        }
    }

    #[tokio::test]
    async fn upsert_keeps_one_document_per_key() {
        let engine = TantivyEngine::in_ram().unwrap();
        engine
            .index("/a.html", &doc("/a.html", "A", "first penguin", "1"))
            .await
            .unwrap();
        engine
            .index("/a.html", &doc("/a.html", "A", "second penguin", "2"))
            .await
            .unwrap();

        assert_eq!(engine.count().await.unwrap(), 1);
        let stored = engine.document("/a.html").await.unwrap().unwrap();
        assert_eq!(stored.body, "second penguin");
        assert_eq!(stored.indexed, "2");

        let hits = engine.search("penguin", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].key, "/a.html");
    }

    #[tokio::test]
    async fn search_returns_highlighted_fragment() {
        let engine = TantivyEngine::in_ram().unwrap();
        engine
            .index("/b", &doc("/b", "B", "the quick brown fox", "1"))
            .await
            .unwrap();
        let hits = engine.search("fox", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        let fragment = hits[0].fragment.as_deref().unwrap();
        assert!(fragment.contains("<mark>fox</mark>"), "{}", fragment);
    }

    #[tokio::test]
    async fn missing_key_is_none() {
        let engine = TantivyEngine::in_ram().unwrap();
        assert!(engine.document("/missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn empty_and_malformed_queries_are_query_errors() {
        let engine = TantivyEngine::in_ram().unwrap();
        assert!(matches!(
            engine.search("   ", 10).await,
            Err(EngineError::Query(_))
        ));
        assert!(matches!(
            engine.search("nosuchfield:penguin", 10).await,
            Err(EngineError::Query(_))
        ));
    }

    #[tokio::test]
    async fn reopens_on_disk_index() {
        let tmp = tempfile::TempDir::new().unwrap();
        {
            let engine = TantivyEngine::open_or_create(tmp.path()).unwrap();
            engine
                .index("/c", &doc("/c", "C", "persistent", "1"))
                .await
                .unwrap();
        }
        let engine = TantivyEngine::open_or_create(tmp.path()).unwrap();
        assert_eq!(engine.count().await.unwrap(), 1);
        assert_eq!(engine.document("/c").await.unwrap().unwrap().title, "C");
    }
}
