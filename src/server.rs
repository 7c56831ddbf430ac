//! HTTP server.
//!
//! Serves `site.root` with every response captured into the pipeline, and
//! answers queries on the configured search endpoint.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `{endpoint}?q=...` | Search; JSON array or rendered HTML by `Accept` |
//! | `GET`  | `/health` | Health check (returns version) |
//! | any    | everything else | Static file from `site.root`, captured |
//!
//! An empty or unparseable query is not an error: it yields `[]` (or the
//! bare search form). Only a template render failure produces an error
//! body:
//!
//! ```json
//! { "error": { "code": "internal", "message": "..." } }
//! ```
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::{rejection::QueryRejection, Query, State},
    http::{header, HeaderMap, StatusCode},
    middleware,
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sitesearch_core::Engine;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tracing::{info, warn};

use crate::capture::capture;
use crate::config::Config;
use crate::crawler::spawn_rescan;
use crate::engine::open_engine;
use crate::indexer::{Indexer, IndexerOptions};
use crate::pipeline::Pipeline;
use crate::search::{run_query, ResultPage};

/// The indexer and pipeline for one site.
pub struct Site {
    pub indexer: Arc<Indexer>,
    pub pipeline: Arc<Pipeline>,
}

impl Site {
    /// Opens the configured engine and starts the indexer and pipeline.
    pub fn open(config: &Config) -> Result<Self> {
        Ok(Self::with_engine(open_engine(config)?, config))
    }

    pub fn with_engine(engine: Arc<dyn Engine>, config: &Config) -> Self {
        let indexer = Indexer::new(engine, IndexerOptions::from(&config.search));
        let pipeline = Pipeline::new(
            indexer.clone(),
            config.path_policy(),
            config.search.queue_capacity,
        );
        Self { indexer, pipeline }
    }
}

#[derive(Clone)]
struct AppState {
    indexer: Arc<Indexer>,
    page: Arc<ResultPage>,
    endpoint: Arc<str>,
    host: Arc<str>,
}

/// Builds the full router. Exposed for in-process tests.
pub fn build_router(config: &Config, pipeline: Arc<Pipeline>, page: ResultPage) -> Router {
    let state = AppState {
        indexer: pipeline.indexer().clone(),
        page: Arc::new(page),
        endpoint: Arc::from(config.search.endpoint.as_str()),
        host: Arc::from(config.site.host.as_str()),
    };

    let site = Router::new()
        .fallback_service(ServeDir::new(&config.site.root))
        .layer(middleware::from_fn_with_state(pipeline, capture));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route(&config.search.endpoint, get(handle_search))
        .route("/health", get(handle_health))
        .with_state(state)
        .fallback_service(site)
        .layer(cors)
}

/// Serves until Ctrl-C, then stops the crawler and the pipeline.
pub async fn run_server(config: &Config) -> Result<()> {
    let page = ResultPage::from_config(config)?;
    let site = Site::open(config)?;
    let cancel = CancellationToken::new();

    let rescan = if config.search.crawl {
        Some(spawn_rescan(
            config.site.root.clone(),
            config.path_policy(),
            site.pipeline.clone(),
            config.expire_interval(),
            cancel.clone(),
        ))
    } else {
        None
    };

    let app = build_router(config, site.pipeline.clone(), page);
    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind))?;
    info!(
        bind = %config.server.bind,
        endpoint = %config.search.endpoint,
        root = %config.site.root.display(),
        "listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    cancel.cancel();
    if let Some(rescan) = rescan {
        let _ = rescan.await;
    }
    site.pipeline.shutdown().await;
    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal",
        message: message.into(),
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

// ============ GET {endpoint} ============

#[derive(Debug, Deserialize)]
struct SearchParams {
    #[serde(default)]
    q: Option<String>,
}

fn wants_json(headers: &HeaderMap) -> bool {
    headers
        .get_all(header::ACCEPT)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .any(|v| v.contains("application/json"))
}

async fn handle_search(
    State(state): State<AppState>,
    headers: HeaderMap,
    params: Result<Query<SearchParams>, QueryRejection>,
) -> Result<Response, AppError> {
    let raw = params.ok().and_then(|Query(p)| p.q).unwrap_or_default();
    let query = raw.trim();
    let results = if query.is_empty() {
        Vec::new()
    } else {
        run_query(&state.indexer, query).await
    };

    if wants_json(&headers) {
        return Ok(Json(results).into_response());
    }

    let html = state
        .page
        .render(query, &results, &state.endpoint, &state.host)
        .map_err(|e| {
            warn!(error = %e, "failed to render results");
            internal(format!("{:#}", e))
        })?;
    Ok(Html(html).into_response())
}
