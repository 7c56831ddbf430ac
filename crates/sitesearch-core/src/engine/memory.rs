//! In-memory [`Engine`] implementation for tests and throwaway runs.
//!
//! Documents live in a `HashMap` behind `std::sync::RwLock`. Search is a
//! brute-force term match over title and body: every query term must
//! appear, and the score is the total number of occurrences with title
//! hits weighted double.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;

use crate::models::IndexDocument;

use super::{Engine, EngineError, EngineResult, Hit};

const FRAGMENT_RADIUS: usize = 80;

/// In-memory engine for testing.
#[derive(Debug, Default)]
pub struct InMemoryEngine {
    docs: RwLock<HashMap<String, IndexDocument>>,
}

impl InMemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }
}

fn terms(query: &str) -> Vec<String> {
    query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Byte range of the first case-insensitive match of the lowercase `term`.
/// Both ends are char boundaries of `body`.
fn find_folded(body: &str, term: &str) -> Option<(usize, usize)> {
    body.char_indices().find_map(|(start, _)| {
        let mut folded = String::new();
        for (offset, c) in body[start..].char_indices() {
            folded.extend(c.to_lowercase());
            if !term.starts_with(folded.as_str()) {
                return None;
            }
            if folded.len() == term.len() {
                return Some((start, start + offset + c.len_utf8()));
            }
        }
        None
    })
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// HTML fragment around the first occurrence of `term` in `body`, with the
/// match wrapped in `<mark>` and the rest escaped.
fn fragment(body: &str, term: &str) -> Option<String> {
    let (at, end) = find_folded(body, term)?;
    let mut start = at.saturating_sub(FRAGMENT_RADIUS);
    while !body.is_char_boundary(start) {
        start -= 1;
    }
    let mut stop = (end + FRAGMENT_RADIUS).min(body.len());
    while !body.is_char_boundary(stop) {
        stop += 1;
    }
    Some(format!(
        "{}<mark>{}</mark>{}",
        escape_html(&body[start..at]),
        escape_html(&body[at..end]),
        escape_html(&body[end..stop])
    ))
}

#[async_trait]
impl Engine for InMemoryEngine {
    async fn index(&self, key: &str, doc: &IndexDocument) -> EngineResult<()> {
        self.docs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), doc.clone());
        Ok(())
    }

    async fn document(&self, key: &str) -> EngineResult<Option<IndexDocument>> {
        Ok(self
            .docs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned())
    }

    async fn search(&self, query: &str, limit: usize) -> EngineResult<Vec<Hit>> {
        let terms = terms(query);
        if terms.is_empty() {
            return Err(EngineError::Query(format!("no terms in {:?}", query)));
        }

        let docs = self.docs.read().unwrap_or_else(PoisonError::into_inner);
        let mut hits: Vec<Hit> = docs
            .iter()
            .filter_map(|(key, doc)| {
                let title = doc.title.to_lowercase();
                let body = doc.body.to_lowercase();
                let mut score = 0usize;
                for term in &terms {
                    let n = title.matches(term.as_str()).count() * 2
                        + body.matches(term.as_str()).count();
                    if n == 0 {
                        return None;
                    }
                    score += n;
                }
                Some(Hit {
                    key: key.clone(),
                    score: score as f32,
                    fragment: fragment(&doc.body, &terms[0]),
                })
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.key.cmp(&b.key))
        });
        hits.truncate(limit);
        Ok(hits)
    }

    async fn count(&self) -> EngineResult<u64> {
        Ok(self.docs.read().unwrap_or_else(PoisonError::into_inner).len() as u64)
    }
}
