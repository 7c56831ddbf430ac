//! The per-document unit of work.
//!
//! A [`Record`] is created by the indexer for one logical path, filled by a
//! writer (the HTTP capture shim or the crawler), and then moved through the
//! pipeline exactly once. The mutable fields sit behind a single
//! per-record `RwLock`; nothing here is shared across records.
//!
//! Once [`ignore`](Record::ignore) is called the record is terminal: the
//! title, body, and indexed setters become no-ops.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};

use crate::models::{encode_timestamp, IndexDocument};

/// Observes whether a record reached a terminal state.
///
/// A receipt settles when its record is released back to the pool, which
/// only happens after the record was persisted or dropped as ignored. A
/// record discarded without release (e.g. abandoned at shutdown) settles
/// its receipt too.
#[derive(Debug, Clone, Default)]
pub struct Receipt(Arc<AtomicBool>);

impl Receipt {
    pub fn is_settled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub(crate) fn settle(&self) {
        self.0.store(true, Ordering::Release);
    }
}

#[derive(Debug)]
struct RecordState {
    title: String,
    body: Vec<u8>,
    modified: DateTime<Utc>,
    indexed: Option<DateTime<Utc>>,
    ignored: bool,
    loaded: bool,
    resubmits: u8,
    receipt: Option<Receipt>,
}

impl Default for RecordState {
    fn default() -> Self {
        Self {
            title: String::new(),
            body: Vec::new(),
            modified: DateTime::<Utc>::UNIX_EPOCH,
            indexed: None,
            ignored: false,
            loaded: false,
            resubmits: 0,
            receipt: None,
        }
    }
}

/// A mutable document in flight between a producer and the index.
#[derive(Debug)]
pub struct Record {
    path: String,
    full_path: Option<PathBuf>,
    state: RwLock<RecordState>,
}

impl Record {
    pub(crate) fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            full_path: None,
            state: RwLock::new(RecordState::default()),
        }
    }

    /// Clears every field and binds the record to a new path.
    pub(crate) fn rebind(&mut self, path: impl Into<String>) {
        self.path = path.into();
        self.full_path = None;
        *self.state.get_mut().unwrap_or_else(PoisonError::into_inner) = RecordState::default();
    }

    /// Drops all content and hands back the receipt, unsettled.
    pub(crate) fn recycle(&mut self) -> Option<Receipt> {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        let receipt = state.receipt.take();
        *state = RecordState::default();
        self.path.clear();
        self.full_path = None;
        receipt
    }

    fn read(&self) -> RwLockReadGuard<'_, RecordState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, RecordState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Logical document key, e.g. `/docs/index.html`.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Absolute source location, used when the body must be read from disk.
    pub fn full_path(&self) -> Option<&Path> {
        self.full_path.as_deref()
    }

    pub fn set_full_path(&mut self, full_path: impl Into<PathBuf>) {
        self.full_path = Some(full_path.into());
    }

    /// Appends to the body. Never fails; returns the number of bytes taken.
    pub fn write(&self, bytes: &[u8]) -> usize {
        self.write_state().body.extend_from_slice(bytes);
        bytes.len()
    }

    /// A copy of the current body.
    pub fn body(&self) -> Vec<u8> {
        self.read().body.clone()
    }

    /// The current body decoded as UTF-8, replacing invalid sequences.
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.read().body).into_owned()
    }

    pub fn body_len(&self) -> usize {
        self.read().body.len()
    }

    /// Replaces the body wholesale. No-op once ignored.
    pub fn set_body(&self, body: impl Into<Vec<u8>>) {
        let mut state = self.write_state();
        if !state.ignored {
            state.body = body.into();
        }
    }

    pub fn title(&self) -> String {
        self.read().title.clone()
    }

    /// No-op once ignored.
    pub fn set_title(&self, title: impl Into<String>) {
        let mut state = self.write_state();
        if !state.ignored {
            state.title = title.into();
        }
    }

    pub fn modified(&self) -> DateTime<Utc> {
        self.read().modified
    }

    pub fn set_modified(&self, modified: DateTime<Utc>) {
        self.write_state().modified = modified;
    }

    /// When the record was last persisted, `None` if never.
    pub fn indexed(&self) -> Option<DateTime<Utc>> {
        self.read().indexed
    }

    /// Stamps the indexing time. Refused (returns `false`) once ignored.
    pub fn mark_indexed(&self, at: DateTime<Utc>) -> bool {
        let mut state = self.write_state();
        if state.ignored {
            return false;
        }
        state.indexed = Some(at);
        true
    }

    /// Marks the record terminal. There is no way back.
    pub fn ignore(&self) {
        self.write_state().ignored = true;
    }

    pub fn ignored(&self) -> bool {
        self.read().ignored
    }

    /// Whether a load from the index was attempted.
    pub fn loaded(&self) -> bool {
        self.read().loaded
    }

    /// How many times the pipeline sent this record back to its front.
    pub fn resubmits(&self) -> u8 {
        self.read().resubmits
    }

    /// Counts one more resubmission and returns the new total.
    pub fn note_resubmit(&self) -> u8 {
        let mut state = self.write_state();
        state.resubmits = state.resubmits.saturating_add(1);
        state.resubmits
    }

    /// Returns a receipt that settles when this record is released.
    pub fn track(&self) -> Receipt {
        self.write_state()
            .receipt
            .get_or_insert_with(Receipt::default)
            .clone()
    }

    /// Merges a previously persisted version into this record.
    ///
    /// `None` means the document was never indexed (or failed to decode):
    /// the record is marked loaded and `false` is returned. On a hit the
    /// title and indexed time are taken from the stored version; the
    /// modification time and body only if the record has none of its own.
    pub fn merge_persisted(&self, persisted: Option<&IndexDocument>) -> bool {
        let mut state = self.write_state();
        state.loaded = true;
        let Some(doc) = persisted else {
            return false;
        };

        state.title = doc.title.clone();
        if state.modified == DateTime::<Utc>::UNIX_EPOCH {
            state.modified = doc.modified_at();
        }
        state.indexed = Some(doc.indexed_at());
        if state.body.is_empty() && !doc.body.is_empty() {
            state.body = doc.body.as_bytes().to_vec();
        }
        true
    }

    /// Builds the persisted projection from the current snapshot.
    pub fn to_document(&self) -> IndexDocument {
        let state = self.read();
        IndexDocument {
            path: self.path.clone(),
            title: state.title.clone(),
            body: String::from_utf8_lossy(&state.body).into_owned(),
            modified: encode_timestamp(state.modified),
            indexed: encode_timestamp(state.indexed.unwrap_or(DateTime::<Utc>::UNIX_EPOCH)),
        }
    }
}

impl Drop for Record {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(receipt) = state.receipt.take() {
            receipt.settle();
        }
    }
}
