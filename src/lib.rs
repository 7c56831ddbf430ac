//! # sitesearch
//!
//! Full-text search for a static site, fed by the pages it serves.
//!
//! Every page served from `site.root` is mirrored into a record and sent
//! through a staged pipeline that classifies it (HTML or plain text),
//! extracts a title and clean body, and upserts it into a tantivy index
//! keyed by path. A periodic crawl of the same directory keeps the index
//! complete for pages nobody has requested yet.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐
//! │ HTTP capture │──┐
//! └──────────────┘  │   ┌───────────────────────────────┐   ┌─────────┐   ┌─────────┐
//!                   ├──▶│ read▶validate▶parse▶index     │──▶│ Indexer │──▶│ tantivy │
//! ┌──────────────┐  │   └───────────────────────────────┘   └────┬────┘   └─────────┘
//! │   Crawler    │──┘                                            │
//! └──────────────┘                                    ┌──────────┴─────────┐
//!                                                     ▼                    ▼
//!                                              ┌────────────┐       ┌────────────┐
//!                                              │ GET /search│       │    CLI     │
//!                                              └────────────┘       └────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`logging`] | tracing subscriber setup |
//! | [`engine`] | engine selection by name |
//! | [`tantivy_engine`] | on-disk/in-RAM tantivy engine |
//! | [`indexer`] | record pool, persistence worker, search |
//! | [`extract`] | HTML/text classification and sanitization |
//! | [`pipeline`] | staged record pipeline |
//! | [`crawler`] | directory scan and periodic re-scan |
//! | [`capture`] | HTTP response capture middleware |
//! | [`search`] | result projection and rendering |
//! | [`server`] | axum HTTP server |
//! | [`get`] | single document lookup |
//! | [`stats`] | index statistics |

pub mod capture;
pub mod config;
pub mod crawler;
pub mod engine;
pub mod extract;
pub mod get;
pub mod indexer;
pub mod logging;
pub mod pipeline;
pub mod search;
pub mod server;
pub mod stats;
pub mod tantivy_engine;
