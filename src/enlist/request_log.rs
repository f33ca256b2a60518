//! Request/response logging middleware.
//!
//! For each request the middleware buffers the request body, hands the handler a
//! fresh body with the same bytes, and wraps the response body in [`MirrorBody`],
//! which forwards every frame untouched while keeping a copy. Once the response body
//! is finished (or dropped by the connection) one [`RequestTrace`] is handed to the
//! [`TraceSink`].
//!
//! Request bodies larger than the configured limit are never buffered: the request
//! is answered with `413 Payload Too Large` without reaching the handler.

use axum::{
    body::{Body, Bytes},
    extract::{ConnectInfo, Request, State},
    http::StatusCode,
    middleware::{from_fn_with_state, Next},
    response::{IntoResponse, Response},
    Json, Router,
};
use http_body::{Body as HttpBody, Frame, SizeHint};
use http_body_util::{BodyExt, LengthLimitError, Limited};
use serde_json::json;
use std::{
    net::SocketAddr,
    pin::Pin,
    sync::Arc,
    task::{ready, Context, Poll},
    time::{Duration, Instant},
};
use tracing::{error, info, warn};

/// Same as axum's `DefaultBodyLimit`.
pub const DEFAULT_BODY_LIMIT: usize = 2 * 1024 * 1024;

/// Everything observed about one request. Built once, handed to the sink, dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestTrace {
    pub method: String,
    pub url: String,
    pub remote_addr: String,
    pub status_code: u16,
    pub latency: Duration,
    pub request_body: String,
    pub response_body: String,
}

pub trait TraceSink: Send + Sync {
    fn record(&self, trace: RequestTrace);
}

/// Default sink: one structured `INFO` event per request.
#[derive(Clone, Debug)]
pub struct LogSink;

impl TraceSink for LogSink {
    fn record(&self, trace: RequestTrace) {
        info!(
            method = %trace.method,
            url = %trace.url,
            remote_addr = %trace.remote_addr,
            status_code = trace.status_code,
            latency = ?trace.latency,
            request_body = %trace.request_body,
            response_body = %trace.response_body,
            "HTTP request"
        );
    }
}

/// Middleware state: where traces go and how much request body may be buffered.
#[derive(Clone)]
pub struct RequestLog {
    sink: Arc<dyn TraceSink>,
    body_limit: usize,
}

impl RequestLog {
    #[must_use]
    pub fn new(sink: Arc<dyn TraceSink>) -> Self {
        Self {
            sink,
            body_limit: DEFAULT_BODY_LIMIT,
        }
    }

    #[must_use]
    pub fn with_body_limit(mut self, body_limit: usize) -> Self {
        self.body_limit = body_limit;
        self
    }
}

/// Wrap `router` so every request it serves is traced.
pub fn wrap<S>(router: Router<S>, log: RequestLog) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router.layer(from_fn_with_state(log, log_requests))
}

pub async fn log_requests(
    State(log): State<RequestLog>,
    request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();

    let (parts, body) = request.into_parts();
    let remote_addr = parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map_or_else(|| "-".to_string(), |ConnectInfo(addr)| addr.to_string());

    let mut pending = PendingTrace {
        sink: log.sink,
        start,
        method: parts.method.to_string(),
        url: parts.uri.to_string(),
        remote_addr,
        status_code: 0,
        request_body: Bytes::new(),
    };

    let response = match Limited::new(body, log.body_limit).collect().await {
        Ok(collected) => {
            let request_body = collected.to_bytes();
            pending.request_body = request_body.clone();
            next.run(Request::from_parts(parts, Body::from(request_body)))
                .await
        }
        Err(err) if err.is::<LengthLimitError>() => {
            warn!(limit = log.body_limit, "Request body exceeds limit");
            payload_too_large()
        }
        Err(err) => {
            error!(error = %err, "Failed to read request body");
            next.run(Request::from_parts(parts, Body::empty())).await
        }
    };

    let (parts, body) = response.into_parts();
    pending.status_code = parts.status.as_u16();

    Response::from_parts(parts, Body::new(MirrorBody::new(body, pending)))
}

fn payload_too_large() -> Response {
    (
        StatusCode::PAYLOAD_TOO_LARGE,
        Json(json!({ "error": "request body too large" })),
    )
        .into_response()
}

/// Request-side half of a trace, completed when the response body ends.
struct PendingTrace {
    sink: Arc<dyn TraceSink>,
    start: Instant,
    method: String,
    url: String,
    remote_addr: String,
    status_code: u16,
    request_body: Bytes,
}

impl PendingTrace {
    fn finish(self, response_body: &[u8]) {
        let trace = RequestTrace {
            method: self.method,
            url: self.url,
            remote_addr: self.remote_addr,
            status_code: self.status_code,
            latency: self.start.elapsed(),
            request_body: String::from_utf8_lossy(&self.request_body).into_owned(),
            response_body: String::from_utf8_lossy(response_body).into_owned(),
        };
        self.sink.record(trace);
    }
}

/// Pass-through response body that copies every data frame it forwards.
pub struct MirrorBody {
    inner: Body,
    captured: Vec<u8>,
    pending: Option<PendingTrace>,
}

impl MirrorBody {
    fn new(inner: Body, pending: PendingTrace) -> Self {
        Self {
            inner,
            captured: Vec::new(),
            pending: Some(pending),
        }
    }

    fn finish(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.finish(&self.captured);
        }
    }
}

impl HttpBody for MirrorBody {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        match ready!(Pin::new(&mut this.inner).poll_frame(cx)) {
            Some(Ok(frame)) => {
                if let Some(data) = frame.data_ref() {
                    this.captured.extend_from_slice(data);
                }
                Poll::Ready(Some(Ok(frame)))
            }
            Some(Err(err)) => {
                error!(error = %err, "Failed to read response body");
                this.finish();
                Poll::Ready(Some(Err(err)))
            }
            None => {
                this.finish();
                Poll::Ready(None)
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

// The connection may stop polling once the body reports end-of-stream.
impl Drop for MirrorBody {
    fn drop(&mut self) {
        self.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{anyhow, Result};
    use axum::{
        body::to_bytes,
        http::{self, Method, StatusCode},
        routing::{get, post},
    };
    use std::sync::Mutex;
    use tower::ServiceExt;

    #[derive(Default)]
    struct CollectingSink {
        traces: Mutex<Vec<RequestTrace>>,
    }

    impl CollectingSink {
        fn take(&self) -> Vec<RequestTrace> {
            self.traces
                .lock()
                .map(|mut traces| std::mem::take(&mut *traces))
                .unwrap_or_default()
        }
    }

    impl TraceSink for CollectingSink {
        fn record(&self, trace: RequestTrace) {
            if let Ok(mut traces) = self.traces.lock() {
                traces.push(trace);
            }
        }
    }

    async fn echo(body: Bytes) -> Bytes {
        body
    }

    async fn teapot() -> (StatusCode, &'static str) {
        (StatusCode::IM_A_TEAPOT, "short and stout")
    }

    fn app_with_limit(sink: Arc<CollectingSink>, body_limit: usize) -> Router {
        let router = Router::new()
            .route("/echo", post(echo))
            .route("/teapot", get(teapot))
            .route("/empty", get(|| async { StatusCode::NO_CONTENT }));
        wrap(router, RequestLog::new(sink).with_body_limit(body_limit))
    }

    fn app(sink: Arc<CollectingSink>) -> Router {
        app_with_limit(sink, DEFAULT_BODY_LIMIT)
    }

    fn single(sink: &CollectingSink) -> Result<RequestTrace> {
        let mut traces = sink.take();
        if traces.len() != 1 {
            return Err(anyhow!("expected one trace, got {}", traces.len()));
        }
        traces.pop().ok_or_else(|| anyhow!("no trace"))
    }

    #[tokio::test]
    async fn handler_sees_identical_request_body() -> Result<()> {
        let sink = Arc::new(CollectingSink::default());
        let payload = r#"{"email":"a@b.com","password":"longenough1"}"#;

        let response = app(sink.clone())
            .oneshot(
                http::Request::builder()
                    .method(Method::POST)
                    .uri("/echo?source=test")
                    .body(Body::from(payload))?,
            )
            .await?;
        assert_eq!(response.status(), StatusCode::OK);
        let sent = to_bytes(response.into_body(), usize::MAX).await?;
        assert_eq!(sent, payload.as_bytes());

        let trace = single(&sink)?;
        assert_eq!(trace.method, "POST");
        assert_eq!(trace.url, "/echo?source=test");
        assert_eq!(trace.status_code, 200);
        assert_eq!(trace.request_body, payload);
        assert_eq!(trace.response_body.as_bytes(), sent.as_ref());
        Ok(())
    }

    #[tokio::test]
    async fn binary_request_body_passes_through() -> Result<()> {
        let sink = Arc::new(CollectingSink::default());
        let payload: Vec<u8> = (0..=255u8).collect();

        let response = app(sink.clone())
            .oneshot(
                http::Request::builder()
                    .method(Method::POST)
                    .uri("/echo")
                    .body(Body::from(payload.clone()))?,
            )
            .await?;
        let sent = to_bytes(response.into_body(), usize::MAX).await?;
        assert_eq!(sent.as_ref(), payload.as_slice());
        assert_eq!(single(&sink)?.status_code, 200);
        Ok(())
    }

    #[tokio::test]
    async fn records_final_status_and_response_body() -> Result<()> {
        let sink = Arc::new(CollectingSink::default());

        let response = app(sink.clone())
            .oneshot(http::Request::builder().uri("/teapot").body(Body::empty())?)
            .await?;
        let status = response.status();
        let sent = to_bytes(response.into_body(), usize::MAX).await?;

        let trace = single(&sink)?;
        assert_eq!(trace.status_code, status.as_u16());
        assert_eq!(trace.status_code, 418);
        assert_eq!(trace.response_body.as_bytes(), sent.as_ref());
        assert_eq!(trace.request_body, "");
        Ok(())
    }

    #[tokio::test]
    async fn empty_response_is_traced() -> Result<()> {
        let sink = Arc::new(CollectingSink::default());

        let response = app(sink.clone())
            .oneshot(http::Request::builder().uri("/empty").body(Body::empty())?)
            .await?;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        drop(response);

        let trace = single(&sink)?;
        assert_eq!(trace.status_code, 204);
        assert_eq!(trace.response_body, "");
        Ok(())
    }

    #[tokio::test]
    async fn unread_response_is_traced_once_on_drop() -> Result<()> {
        let sink = Arc::new(CollectingSink::default());

        let response = app(sink.clone())
            .oneshot(http::Request::builder().uri("/teapot").body(Body::empty())?)
            .await?;
        assert!(sink.take().is_empty());
        drop(response);

        let trace = single(&sink)?;
        assert_eq!(trace.status_code, 418);
        Ok(())
    }

    #[tokio::test]
    async fn remote_addr_from_connect_info() -> Result<()> {
        let sink = Arc::new(CollectingSink::default());
        let addr: SocketAddr = "192.0.2.10:54321".parse()?;

        let mut request = http::Request::builder().uri("/teapot").body(Body::empty())?;
        request.extensions_mut().insert(ConnectInfo(addr));

        let response = app(sink.clone()).oneshot(request).await?;
        to_bytes(response.into_body(), usize::MAX).await?;

        assert_eq!(single(&sink)?.remote_addr, "192.0.2.10:54321");
        Ok(())
    }

    #[tokio::test]
    async fn unmatched_route_is_traced() -> Result<()> {
        let sink = Arc::new(CollectingSink::default());

        let response = app(sink.clone())
            .oneshot(http::Request::builder().uri("/nowhere").body(Body::empty())?)
            .await?;
        to_bytes(response.into_body(), usize::MAX).await?;

        let trace = single(&sink)?;
        assert_eq!(trace.status_code, 404);
        assert_eq!(trace.remote_addr, "-");
        Ok(())
    }

    #[tokio::test]
    async fn concurrent_requests_do_not_share_buffers() -> Result<()> {
        let sink = Arc::new(CollectingSink::default());
        let app = app(sink.clone());

        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let app = app.clone();
                tokio::spawn(async move {
                    let request = http::Request::builder()
                        .method(Method::POST)
                        .uri("/echo")
                        .body(Body::from(format!("body-{i}")))?;
                    let response = app.oneshot(request).await?;
                    to_bytes(response.into_body(), usize::MAX).await?;
                    Ok::<_, anyhow::Error>(())
                })
            })
            .collect();
        for task in tasks {
            task.await??;
        }

        let traces = sink.take();
        assert_eq!(traces.len(), 16);
        for trace in traces {
            assert!(trace.request_body.starts_with("body-"));
            assert_eq!(trace.request_body, trace.response_body);
        }
        Ok(())
    }

    #[tokio::test]
    async fn oversized_request_body_is_rejected() -> Result<()> {
        let sink = Arc::new(CollectingSink::default());

        let response = app_with_limit(sink.clone(), 16)
            .oneshot(
                http::Request::builder()
                    .method(Method::POST)
                    .uri("/echo")
                    .body(Body::from(vec![b'x'; 64]))?,
            )
            .await?;
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        let sent = to_bytes(response.into_body(), usize::MAX).await?;

        let trace = single(&sink)?;
        assert_eq!(trace.status_code, 413);
        assert_eq!(trace.request_body, "");
        assert_eq!(trace.response_body.as_bytes(), sent.as_ref());
        Ok(())
    }

    #[tokio::test]
    async fn body_at_limit_is_accepted() -> Result<()> {
        let sink = Arc::new(CollectingSink::default());
        let payload = "x".repeat(16);

        let response = app_with_limit(sink.clone(), 16)
            .oneshot(
                http::Request::builder()
                    .method(Method::POST)
                    .uri("/echo")
                    .body(Body::from(payload.clone()))?,
            )
            .await?;
        assert_eq!(response.status(), StatusCode::OK);
        to_bytes(response.into_body(), usize::MAX).await?;

        assert_eq!(single(&sink)?.request_body, payload);
        Ok(())
    }
}
