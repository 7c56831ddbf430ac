//! HTTP capture shim.
//!
//! An axum middleware that mirrors every `GET` response body into a
//! [`Record`] keyed by the request path and query, then submits the record
//! to the pipeline once the body has been sent.
//!
//! - Any status other than `200 OK` marks the record ignored up front. The
//!   body is still mirrored (writes never fail) but nothing is indexed.
//! - A `Last-Modified` header, if parseable, becomes the record's
//!   modification time.
//! - A body dropped before its end (client went away) is ignored too, so a
//!   truncated page never replaces a complete one.
//! - Submission happens on a spawned task; a full pipeline never holds up
//!   the response.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::{Body, Bytes};
use axum::extract::{Request, State};
use axum::http::{header, Method, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use chrono::{DateTime, Utc};
use http_body::{Frame, SizeHint};
use sitesearch_core::Record;
use tracing::trace;

use crate::pipeline::Pipeline;

/// Middleware entry point; use with `axum::middleware::from_fn_with_state`.
pub async fn capture(
    State(pipeline): State<Arc<Pipeline>>,
    request: Request,
    next: Next,
) -> Response {
    if request.method() != Method::GET {
        return next.run(request).await;
    }

    let uri = request.uri();
    let path = uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| uri.path().to_string());
    let record = pipeline.indexer().record(path);

    let response = next.run(request).await;

    if response.status() != StatusCode::OK {
        trace!(path = record.path(), status = %response.status(), "capture ignored");
        record.ignore();
    }
    if let Some(modified) = response
        .headers()
        .get(header::LAST_MODIFIED)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_http_date)
    {
        record.set_modified(modified);
    }

    let (parts, body) = response.into_parts();
    Response::from_parts(parts, Body::new(CaptureBody::new(body, record, pipeline)))
}

/// Parses an HTTP date (IMF-fixdate, RFC 2822 compatible).
pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// The in-flight capture; submits on drop, exactly once.
struct Capture {
    record: Option<Record>,
    pipeline: Arc<Pipeline>,
    complete: bool,
}

impl Capture {
    fn write(&self, data: &[u8]) {
        if let Some(record) = &self.record {
            record.write(data);
        }
    }

    fn finish(&mut self) {
        let Some(record) = self.record.take() else {
            return;
        };
        if !self.complete {
            trace!(path = record.path(), "body dropped before end, ignoring");
            record.ignore();
        }
        let pipeline = self.pipeline.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move { pipeline.pipe(record).await });
            }
            Err(_) => pipeline.indexer().kill(record),
        }
    }
}

impl Drop for Capture {
    fn drop(&mut self) {
        self.finish();
    }
}

/// Response body that tees data frames into a [`Record`].
pub struct CaptureBody {
    inner: Body,
    capture: Capture,
}

impl CaptureBody {
    fn new(inner: Body, record: Record, pipeline: Arc<Pipeline>) -> Self {
        let mut body = Self {
            inner,
            capture: Capture {
                record: Some(record),
                pipeline,
                complete: false,
            },
        };
        body.check_end();
        body
    }

    fn check_end(&mut self) {
        if http_body::Body::is_end_stream(&self.inner) {
            self.capture.complete = true;
            self.capture.finish();
        }
    }
}

impl http_body::Body for CaptureBody {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        let polled = Pin::new(&mut this.inner).poll_frame(cx);
        match &polled {
            Poll::Ready(Some(Ok(frame))) => {
                if let Some(data) = frame.data_ref() {
                    this.capture.write(data);
                }
                this.check_end();
            }
            Poll::Ready(None) => {
                this.capture.complete = true;
                this.capture.finish();
            }
            Poll::Ready(Some(Err(_))) => this.capture.finish(),
            Poll::Pending => {}
        }
        polled
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}
