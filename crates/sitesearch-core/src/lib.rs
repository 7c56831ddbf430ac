//! # sitesearch core
//!
//! Engine-agnostic building blocks for on-the-fly site search: the
//! per-document [`Record`](record::Record), the [`RecordPool`](pool::RecordPool)
//! that recycles them, the include/exclude [`PathPolicy`](policy::PathPolicy),
//! and the [`Engine`](engine::Engine) trait that a full-text backend implements.
//!
//! This crate contains no tokio, HTTP, or filesystem I/O. The runtime pieces
//! (pipeline, crawler, capture middleware, tantivy engine) live in the
//! `sitesearch` crate.

pub mod engine;
pub mod models;
pub mod policy;
pub mod pool;
pub mod record;

pub use engine::{Engine, EngineError, Hit};
pub use models::IndexDocument;
pub use policy::PathPolicy;
pub use pool::RecordPool;
pub use record::{Receipt, Record};
