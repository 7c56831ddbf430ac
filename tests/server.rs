use std::fs;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use axum::routing::get;
use axum::{middleware, Router};
use sitesearch::capture::capture;
use sitesearch::config::Config;
use sitesearch::indexer::{Indexer, IndexerOptions};
use sitesearch::pipeline::Pipeline;
use sitesearch::search::ResultPage;
use sitesearch::server::build_router;
use sitesearch_core::engine::memory::InMemoryEngine;
use sitesearch_core::{Engine, PathPolicy};
use tempfile::TempDir;

struct TestServer {
    _tmp: TempDir,
    addr: SocketAddr,
    engine: Arc<InMemoryEngine>,
    pipeline: Arc<Pipeline>,
}

impl TestServer {
    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

fn site_dir() -> TempDir {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();
    fs::create_dir_all(root.join("docs")).unwrap();
    fs::create_dir_all(root.join("private")).unwrap();
    fs::write(
        root.join("docs/walrus.html"),
        "<html><head><title>Walrus Facts</title></head>\
         <body><p>The walrus is a large marine mammal.</p></body></html>",
    )
    .unwrap();
    fs::write(root.join("notes.md"), "walrus notes in markdown").unwrap();
    fs::write(root.join("private/walrus.html"), "<title>Secret</title>walrus").unwrap();
    tmp
}

async fn serve(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn start() -> TestServer {
    let tmp = site_dir();
    let mut config = Config::minimal(tmp.path());
    config.site.host = "test.local".to_string();
    config.search.exclude = vec!["^/private/".to_string()];

    let engine = Arc::new(InMemoryEngine::new());
    let indexer = Indexer::new(engine.clone(), IndexerOptions::from(&config.search));
    let pipeline = Pipeline::new(indexer, config.path_policy(), 1);
    let app = build_router(&config, pipeline.clone(), ResultPage::new(None).unwrap());
    let addr = serve(app).await;

    TestServer {
        _tmp: tmp,
        addr,
        engine,
        pipeline,
    }
}

/// Polls until `path` is stored or a few seconds pass.
async fn wait_for_document(engine: &InMemoryEngine, path: &str) -> bool {
    for _ in 0..200 {
        if engine.document(path).await.unwrap().is_some() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    false
}

/// Gives in-flight captures time to reach the engine.
async fn quiesce(pipeline: &Pipeline) {
    for _ in 0..40 {
        tokio::time::sleep(Duration::from_millis(25)).await;
        if pipeline.indexer().idle_records() > 0 {
            break;
        }
    }
    tokio::time::sleep(Duration::from_millis(100)).await;
}

async fn search_json(server: &TestServer, query: &str) -> Vec<serde_json::Value> {
    reqwest::Client::new()
        .get(server.url("/search"))
        .query(&[("q", query)])
        .header("Accept", "application/json")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

#[tokio::test]
async fn served_pages_are_captured_and_searchable() {
    let server = start().await;

    let resp = reqwest::get(server.url("/docs/walrus.html")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.text().await.unwrap().contains("marine mammal"));

    assert!(wait_for_document(&server.engine, "/docs/walrus.html").await);
    let doc = server.engine.document("/docs/walrus.html").await.unwrap().unwrap();
    assert_eq!(doc.title, "Walrus Facts");
    assert!(!doc.body.contains("<p>"));

    let hits = search_json(&server, "mammal").await;
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0]["Path"], "/docs/walrus.html");
    assert_eq!(hits[0]["Title"], "Walrus Facts");
    assert!(hits[0]["Modified"].is_string());
    assert!(hits[0]["Indexed"].is_string());
}

#[tokio::test]
async fn last_modified_header_sets_modified() {
    let server = start().await;
    let mtime = fs::metadata(server._tmp.path().join("notes.md"))
        .unwrap()
        .modified()
        .unwrap();
    let mtime = chrono::DateTime::<chrono::Utc>::from(mtime).timestamp();

    let resp = reqwest::get(server.url("/notes.md")).await.unwrap();
    assert!(resp.headers().contains_key("last-modified"));
    resp.bytes().await.unwrap();

    assert!(wait_for_document(&server.engine, "/notes.md").await);
    let doc = server.engine.document("/notes.md").await.unwrap().unwrap();
    assert_eq!(doc.modified_at().timestamp(), mtime);
    assert_eq!(doc.title, "notes.md");
}

#[tokio::test]
async fn excluded_and_missing_pages_are_not_indexed() {
    let server = start().await;

    let resp = reqwest::get(server.url("/private/walrus.html")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    resp.bytes().await.unwrap();

    let resp = reqwest::get(server.url("/docs/missing.html")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    resp.bytes().await.unwrap();

    quiesce(&server.pipeline).await;
    assert_eq!(server.engine.count().await.unwrap(), 0);
}

#[tokio::test]
async fn non_ok_status_is_never_captured() {
    let engine = Arc::new(InMemoryEngine::new());
    let indexer = Indexer::new(engine.clone(), IndexerOptions::default());
    let pipeline = Pipeline::new(indexer, PathPolicy::match_all(), 1);

    let app = Router::new()
        .route(
            "/boom.html",
            get(|| async {
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "<html><head><title>Boom</title></head><body>failure page</body></html>",
                )
            }),
        )
        .route(
            "/gone.html",
            get(|| async { (StatusCode::GONE, "<title>Gone</title>") }),
        )
        .route(
            "/ok.html",
            get(|| async { "<html><head><title>Fine</title></head><body>ok</body></html>" }),
        )
        .layer(middleware::from_fn_with_state(pipeline.clone(), capture));
    let addr = serve(app).await;

    for path in ["/boom.html", "/gone.html"] {
        let resp = reqwest::get(format!("http://{}{}", addr, path)).await.unwrap();
        assert!(!resp.status().is_success());
        resp.bytes().await.unwrap();
    }
    let resp = reqwest::get(format!("http://{}/ok.html", addr)).await.unwrap();
    resp.bytes().await.unwrap();

    assert!(wait_for_document(&engine, "/ok.html").await);
    assert!(engine.document("/boom.html").await.unwrap().is_none());
    assert!(engine.document("/gone.html").await.unwrap().is_none());
}

#[tokio::test]
async fn non_get_requests_are_not_captured() {
    let server = start().await;
    let resp = reqwest::Client::new()
        .head(server.url("/docs/walrus.html"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    quiesce(&server.pipeline).await;
    assert_eq!(server.engine.count().await.unwrap(), 0);
}

#[tokio::test]
async fn empty_query_returns_empty_array() {
    let server = start().await;
    assert!(search_json(&server, "").await.is_empty());
    assert!(search_json(&server, "   ").await.is_empty());

    let body = reqwest::Client::new()
        .get(server.url("/search"))
        .header("Accept", "application/json")
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(body, "[]");
}

#[tokio::test]
async fn html_results_without_json_accept() {
    let server = start().await;
    reqwest::get(server.url("/docs/walrus.html"))
        .await
        .unwrap()
        .bytes()
        .await
        .unwrap();
    assert!(wait_for_document(&server.engine, "/docs/walrus.html").await);

    let resp = reqwest::get(server.url("/search?q=walrus")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .starts_with("text/html"));
    let html = resp.text().await.unwrap();
    assert!(html.contains("Walrus Facts"));
    assert!(html.contains("test.local"));
    assert!(html.contains("<mark>walrus</mark>"), "{}", html);
    assert!(!html.contains("&lt;mark&gt;"));
}

#[tokio::test]
async fn health_reports_version() {
    let server = start().await;
    let body: serde_json::Value = reqwest::get(server.url("/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}
