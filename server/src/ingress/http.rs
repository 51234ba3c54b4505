//! HTTP OTLP receiver
//!
//! Exposes the three OTLP/HTTP export endpoints on axum. A content type
//! containing `json` selects the OTLP/JSON parser (unknown fields ignored);
//! everything else, including a missing content type, falls back to protobuf
//! per the OTLP spec. Responses are always JSON.

use std::net::SocketAddr;

use anyhow::Result;
use axum::Router;
use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{HeaderMap, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use prost::Message;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::watch;

use opentelemetry_proto::tonic::collector::{
    logs::v1::ExportLogsServiceRequest, metrics::v1::ExportMetricsServiceRequest,
    trace::v1::ExportTraceServiceRequest,
};

use super::receiver::SignalPipeline;

/// Error returned when a request body cannot be decoded
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("protobuf decode error: {0}")]
    Protobuf(String),
    #[error("JSON decode error: {0}")]
    Json(String),
}

/// Decode an OTLP request body based on the content type header
fn decode_request<T>(headers: &HeaderMap, body: &Bytes) -> Result<T, DecodeError>
where
    T: Message + Default + DeserializeOwned,
{
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if content_type.contains("json") {
        serde_json::from_slice(body.as_ref()).map_err(|e| DecodeError::Json(e.to_string()))
    } else {
        T::decode(body.as_ref()).map_err(|e| DecodeError::Protobuf(e.to_string()))
    }
}

fn json_response(status: StatusCode, body: String) -> Response {
    (
        status,
        [(header::CONTENT_TYPE, "application/json")],
        body,
    )
        .into_response()
}

fn error_response(status: StatusCode, message: &str) -> Response {
    json_response(
        status,
        serde_json::json!({ "error": message }).to_string(),
    )
}

#[derive(Clone)]
struct HttpState {
    traces: SignalPipeline,
    metrics: SignalPipeline,
    logs: SignalPipeline,
}

/// Build the OTLP/HTTP router. Known paths are matched by prefix; unknown
/// paths get a 404 with the offending URI, non-POST methods on known paths
/// get the router's 405.
pub fn router(
    traces: SignalPipeline,
    metrics: SignalPipeline,
    logs: SignalPipeline,
    body_limit: usize,
) -> Router {
    let state = HttpState {
        traces,
        metrics,
        logs,
    };

    Router::new()
        .route("/v1/traces", post(export_traces))
        .route("/v1/traces/{*rest}", post(export_traces))
        .route("/v1/metrics", post(export_metrics))
        .route("/v1/metrics/{*rest}", post(export_metrics))
        .route("/v1/logs", post(export_logs))
        .route("/v1/logs/{*rest}", post(export_logs))
        .fallback(unknown_endpoint)
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

async fn export_traces(
    State(state): State<HttpState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    handle_export::<ExportTraceServiceRequest>(&state.traces, &headers, &body)
}

async fn export_metrics(
    State(state): State<HttpState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    handle_export::<ExportMetricsServiceRequest>(&state.metrics, &headers, &body)
}

async fn export_logs(State(state): State<HttpState>, headers: HeaderMap, body: Bytes) -> Response {
    handle_export::<ExportLogsServiceRequest>(&state.logs, &headers, &body)
}

fn handle_export<T>(pipeline: &SignalPipeline, headers: &HeaderMap, body: &Bytes) -> Response
where
    T: Message + Default + DeserializeOwned + Serialize,
{
    let request: T = match decode_request(headers, body) {
        Ok(request) => request,
        Err(e) => {
            tracing::warn!(signal = %pipeline.signal(), error = %e, "failed to decode OTLP request");
            return error_response(StatusCode::BAD_REQUEST, &e.to_string());
        }
    };

    match pipeline.accept(&request) {
        Ok(true) => json_response(StatusCode::OK, "{}".to_string()),
        Ok(false) => error_response(StatusCode::SERVICE_UNAVAILABLE, "Queue full"),
        Err(e) => error_response(StatusCode::BAD_REQUEST, &e.to_string()),
    }
}

async fn unknown_endpoint(uri: Uri) -> Response {
    error_response(
        StatusCode::NOT_FOUND,
        &format!("Unknown endpoint: {}", uri),
    )
}

pub struct OtlpHttpServer {
    listener: TcpListener,
    router: Router,
}

impl OtlpHttpServer {
    /// Bind the listener eagerly so a port conflict fails at start
    pub async fn bind(
        addr: SocketAddr,
        traces: SignalPipeline,
        metrics: SignalPipeline,
        logs: SignalPipeline,
        body_limit: usize,
    ) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            router: router(traces, metrics, logs, body_limit),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub async fn start(self, mut shutdown_rx: watch::Receiver<bool>) -> Result<()> {
        axum::serve(self.listener, self.router.into_make_service())
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.wait_for(|&v| v).await;
                tracing::debug!("OTLP HTTP server shutting down");
            })
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingress::SignalKind;
    use crate::ingress::codec::{MessageFormat, PayloadCodec};
    use crate::ingress::metrics::IngressMetrics;
    use crate::ingress::queue::{QueueConsumers, queue_set};
    use axum::body::Body;
    use axum::http::Request;
    use std::sync::Arc;
    use tower::ServiceExt;

    const BODY_LIMIT: usize = 1024 * 1024;

    fn test_router(capacity: usize) -> (Router, Arc<IngressMetrics>, QueueConsumers) {
        let metrics = Arc::new(IngressMetrics::new("http-test"));
        let (queues, consumers) = queue_set(capacity);
        let codec = PayloadCodec::new(MessageFormat::Json);
        let pipeline = |signal: SignalKind| {
            SignalPipeline::new(
                signal,
                codec,
                queues.get(signal).clone(),
                Arc::clone(&metrics),
            )
        };
        (
            router(
                pipeline(SignalKind::Traces),
                pipeline(SignalKind::Metrics),
                pipeline(SignalKind::Logs),
                BODY_LIMIT,
            ),
            metrics,
            consumers,
        )
    }

    async fn body_string(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_post_json_traces_returns_200() {
        let (router, metrics, _consumers) = test_router(10);
        let response = router
            .oneshot(
                Request::post("/v1/traces")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"resourceSpans":[]}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/json"
        );
        assert_eq!(body_string(response).await, "{}");
        assert_eq!(metrics.received(SignalKind::Traces), 1);
    }

    #[tokio::test]
    async fn test_post_protobuf_metrics_returns_200() {
        let request = ExportMetricsServiceRequest {
            resource_metrics: vec![],
        };
        let (router, metrics, _consumers) = test_router(10);
        let response = router
            .oneshot(
                Request::post("/v1/metrics")
                    .header("content-type", "application/x-protobuf")
                    .body(Body::from(request.encode_to_vec()))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(metrics.received(SignalKind::Metrics), 1);
    }

    #[tokio::test]
    async fn test_missing_content_type_falls_back_to_protobuf() {
        let request = ExportLogsServiceRequest {
            resource_logs: vec![],
        };
        let (router, metrics, _consumers) = test_router(10);
        let response = router
            .oneshot(
                Request::post("/v1/logs")
                    .body(Body::from(request.encode_to_vec()))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(metrics.received(SignalKind::Logs), 1);
    }

    #[tokio::test]
    async fn test_json_parse_ignores_unknown_fields() {
        let (router, metrics, _consumers) = test_router(10);
        let response = router
            .oneshot(
                Request::post("/v1/traces")
                    .header("content-type", "application/json; charset=utf-8")
                    .body(Body::from(r#"{"resourceSpans":[],"futureField":true}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(metrics.received(SignalKind::Traces), 1);
    }

    #[tokio::test]
    async fn test_invalid_body_returns_400_with_error_body() {
        let (router, metrics, _consumers) = test_router(10);
        let response = router
            .oneshot(
                Request::post("/v1/traces")
                    .header("content-type", "application/json")
                    .body(Body::from("not json"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_string(response).await;
        assert!(body.contains("\"error\""));
        // Nothing enqueued, nothing counted
        assert_eq!(metrics.total_received(), 0);
    }

    #[tokio::test]
    async fn test_get_on_known_path_returns_405() {
        let (router, metrics, _consumers) = test_router(10);
        let response = router
            .oneshot(
                Request::get("/v1/traces")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(metrics.total_received(), 0);
    }

    #[tokio::test]
    async fn test_unknown_path_returns_404_with_uri() {
        let (router, _metrics, _consumers) = test_router(10);
        let response = router
            .oneshot(
                Request::post("/v2/spans")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_string(response).await;
        assert!(body.contains("Unknown endpoint: /v2/spans"));
    }

    #[tokio::test]
    async fn test_prefix_match_accepts_trailing_segments() {
        let (router, metrics, _consumers) = test_router(10);
        let response = router
            .oneshot(
                Request::post("/v1/traces/extra")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"resourceSpans":[]}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(metrics.received(SignalKind::Traces), 1);
    }

    #[tokio::test]
    async fn test_queue_full_returns_503() {
        let (router, metrics, _consumers) = test_router(1);

        for expected in [StatusCode::OK, StatusCode::SERVICE_UNAVAILABLE] {
            let response = router
                .clone()
                .oneshot(
                    Request::post("/v1/logs")
                        .header("content-type", "application/json")
                        .body(Body::from(r#"{"resourceLogs":[]}"#))
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(response.status(), expected);
        }

        assert_eq!(metrics.received(SignalKind::Logs), 1);
        assert_eq!(metrics.dropped(SignalKind::Logs), 1);
    }

    /// Valid trace request whose wire encoding is exactly `target` bytes,
    /// found by adjusting a schema_url padding field until the size lands
    fn trace_body_of_exact_len(target: usize) -> Vec<u8> {
        use opentelemetry_proto::tonic::trace::v1::ResourceSpans;

        let mut pad = target.saturating_sub(16);
        loop {
            let request = ExportTraceServiceRequest {
                resource_spans: vec![ResourceSpans {
                    schema_url: "x".repeat(pad),
                    ..Default::default()
                }],
            };
            let body = request.encode_to_vec();
            if body.len() == target {
                return body;
            }
            pad = (pad as i64 + target as i64 - body.len() as i64) as usize;
        }
    }

    #[tokio::test]
    async fn test_body_at_exact_limit_is_accepted() {
        let (router, metrics, _consumers) = test_router(10);
        let body = trace_body_of_exact_len(BODY_LIMIT);
        assert_eq!(body.len(), BODY_LIMIT);

        let response = router
            .oneshot(
                Request::post("/v1/traces")
                    .header("content-type", "application/x-protobuf")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(metrics.received(SignalKind::Traces), 1);
    }

    #[tokio::test]
    async fn test_body_over_limit_is_rejected_by_transport() {
        let (router, metrics, _consumers) = test_router(10);
        let oversized = vec![b'x'; BODY_LIMIT + 1];
        let response = router
            .oneshot(
                Request::post("/v1/traces")
                    .header("content-type", "application/x-protobuf")
                    .body(Body::from(oversized))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(metrics.total_received(), 0);
    }
}
