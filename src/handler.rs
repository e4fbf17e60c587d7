//! Per-path request handling.
//!
//! One [`RequestHandler`] is bound to each configured path. For every
//! request it selects a rule, applies that rule's latency, then emits the
//! canned response (or the not-found fallback).

use crate::config::{LogSettings, RuleDefinition};
use crate::latency::LatencyInjector;
use crate::matcher::{self, InboundRequest};
use crate::response::{self, BufferedResponse, ResponseSink};
use axum::body::Body;
use axum::extract::{Request, State};
use axum::response::{IntoResponse, Response};
use std::sync::Arc;
use tracing::{error, info, warn, Instrument};
use uuid::Uuid;

/// Handles every request routed to one configured path.
#[derive(Debug)]
pub struct RequestHandler {
    path: String,
    rules: Arc<[RuleDefinition]>,
    latency: Arc<LatencyInjector>,
    settings: LogSettings,
    max_body_bytes: usize,
}

impl RequestHandler {
    pub fn new(
        path: impl Into<String>,
        rules: Arc<[RuleDefinition]>,
        latency: Arc<LatencyInjector>,
        settings: LogSettings,
        max_body_bytes: usize,
    ) -> Self {
        Self {
            path: path.into(),
            rules,
            latency,
            settings,
            max_body_bytes,
        }
    }

    /// The path this handler was registered under.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Match, delay and respond to a request whose body is already buffered.
    pub async fn handle<S: ResponseSink>(&self, request: &InboundRequest, sink: &mut S) {
        let selected = matcher::select(&self.rules, request);

        let result = match selected {
            Some(rule) => {
                if self.settings.log_matches {
                    info!(
                        method = %request.method,
                        path = %request.path,
                        route = %self.path,
                        status = rule.response.status_code,
                        "Request matched"
                    );
                }
                self.latency.apply(rule.response.latency.as_ref()).await;
                response::emit(sink, &rule.response)
            }
            None => {
                if self.settings.log_unmatched {
                    warn!(
                        method = %request.method,
                        path = %request.path,
                        route = %self.path,
                        "No matching mock found"
                    );
                }
                response::emit_not_found(sink)
            }
        };

        if let Err(e) = result {
            error!(error = %e, path = %request.path, "Failed to write response");
        }
    }

    /// Buffer the body of a raw request, then handle it.
    pub async fn serve(&self, request: Request) -> Response {
        let request_id = Uuid::new_v4();
        let span = tracing::info_span!("request", id = %request_id);

        async move {
            let (parts, body) = request.into_parts();
            let mut sink = BufferedResponse::new();

            let body = match axum::body::to_bytes(body, self.max_body_bytes).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    error!(error = %e, path = %parts.uri.path(), "Failed to read request body");
                    if let Err(e) = response::emit_body_read_failed(&mut sink) {
                        error!(error = %e, "Failed to write response");
                    }
                    return sink.into_response();
                }
            };

            let inbound = InboundRequest {
                method: parts.method,
                path: parts.uri.path().to_string(),
                headers: parts.headers,
                body,
            };
            self.handle(&inbound, &mut sink).await;
            sink.into_response()
        }
        .instrument(span)
        .await
    }
}

/// axum entry point for a path's route.
pub async fn serve_route(
    State(handler): State<Arc<RequestHandler>>,
    request: Request<Body>,
) -> Response {
    handler.serve(request).await
}

/// axum fallback for paths no rule is registered under.
pub async fn serve_unregistered(request: Request<Body>) -> Response {
    warn!(
        method = %request.method(),
        path = %request.uri().path(),
        "No mocks registered for path"
    );
    let mut sink = BufferedResponse::new();
    if let Err(e) = response::emit_not_found(&mut sink) {
        error!(error = %e, "Failed to write response");
    }
    sink.into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LatencyConfig, LatencyKind, RequestMatcher, ResponseDefinition};
    use crate::latency::tests::RecordingSleeper;
    use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
    use std::collections::HashMap;
    use std::io;
    use std::sync::Mutex;
    use std::time::Duration;
    use tracing_subscriber::fmt::MakeWriter;

    fn hello_rule(body: &str) -> RuleDefinition {
        RuleDefinition {
            request: RequestMatcher {
                path: "/hello".to_string(),
                method: String::new(),
                headers: HashMap::from([(
                    "Content-Type".to_string(),
                    "application/json".to_string(),
                )]),
                body: body.to_string(),
            },
            response: ResponseDefinition {
                status_code: 200,
                headers: HashMap::new(),
                body: "test".to_string(),
                latency: None,
            },
        }
    }

    fn handler_with(rules: Vec<RuleDefinition>, sleeper: Arc<RecordingSleeper>) -> RequestHandler {
        handler_with_settings(rules, sleeper, LogSettings::default())
    }

    fn handler_with_settings(
        rules: Vec<RuleDefinition>,
        sleeper: Arc<RecordingSleeper>,
        settings: LogSettings,
    ) -> RequestHandler {
        RequestHandler::new(
            "/hello",
            Arc::from(rules),
            Arc::new(LatencyInjector::new(sleeper)),
            settings,
            1024,
        )
    }

    /// Log output collected by a test subscriber.
    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl CapturedLogs {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for CapturedLogs {
        type Writer = Self;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    /// Handle one matching and one unmatched request, returning the log output.
    async fn logs_for(settings: LogSettings) -> String {
        let logs = CapturedLogs::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(logs.clone())
            .with_ansi(false)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let handler = handler_with_settings(vec![hello_rule("")], Arc::default(), settings);
        run(&handler, &json_request(Method::GET, "application/json")).await;
        run(&handler, &json_request(Method::GET, "application/xml")).await;

        logs.contents()
    }

    fn json_request(method: Method, content_type: &'static str) -> InboundRequest {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", HeaderValue::from_static(content_type));
        InboundRequest::new(method, "/hello").with_headers(headers)
    }

    async fn run(handler: &RequestHandler, request: &InboundRequest) -> (StatusCode, String) {
        let mut sink = BufferedResponse::new();
        handler.handle(request, &mut sink).await;
        let response = sink.into_response();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_matching_request_gets_canned_response() {
        let handler = handler_with(vec![hello_rule("")], Arc::default());
        let request = json_request(Method::GET, "application/json");

        let (status, body) = run(&handler, &request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "test");
    }

    #[tokio::test]
    async fn test_header_mismatch_is_not_found() {
        let handler = handler_with(vec![hello_rule("")], Arc::default());
        let request = json_request(Method::GET, "application/xml");

        let (status, body) = run(&handler, &request).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, "mock not found");
    }

    #[tokio::test]
    async fn test_method_mismatch_is_not_found() {
        let handler = handler_with(vec![hello_rule("")], Arc::default());
        let request = json_request(Method::POST, "application/json");

        let (status, body) = run(&handler, &request).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, "mock not found");
    }

    #[tokio::test]
    async fn test_body_must_match() {
        let handler = handler_with(vec![hello_rule("expected")], Arc::default());

        let other = json_request(Method::GET, "application/json").with_body("other");
        assert_eq!(
            run(&handler, &other).await,
            (StatusCode::NOT_FOUND, "mock not found".to_string())
        );

        let expected = json_request(Method::GET, "application/json").with_body("expected");
        assert_eq!(
            run(&handler, &expected).await,
            (StatusCode::OK, "test".to_string())
        );
    }

    #[tokio::test]
    async fn test_latency_applied_only_to_matched_rule() {
        let mut rule = hello_rule("");
        rule.response.latency = Some(LatencyConfig {
            kind: LatencyKind::Simple,
            delay: Duration::from_millis(750),
        });
        let sleeper = Arc::new(RecordingSleeper::default());
        let handler = handler_with(vec![rule], sleeper.clone());

        run(&handler, &json_request(Method::GET, "application/xml")).await;
        assert!(sleeper.calls().is_empty());

        run(&handler, &json_request(Method::GET, "application/json")).await;
        assert_eq!(sleeper.calls(), vec![Duration::from_millis(750)]);
    }

    #[tokio::test]
    async fn test_not_found_has_no_extra_headers() {
        let handler = handler_with(vec![], Arc::default());
        let mut sink = BufferedResponse::new();
        handler
            .handle(&InboundRequest::new(Method::GET, "/hello"), &mut sink)
            .await;

        let response = sink.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response.headers().is_empty());
    }

    #[tokio::test]
    async fn test_serve_buffers_body() {
        let handler = handler_with(vec![hello_rule("expected")], Arc::default());
        let request = axum::http::Request::builder()
            .method(Method::GET)
            .uri("/hello")
            .header("Content-Type", "application/json")
            .body(Body::from("expected"))
            .unwrap();

        let response = handler.serve(request).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_oversized_body_is_server_error() {
        let handler = handler_with(vec![hello_rule("")], Arc::default());
        let request = axum::http::Request::builder()
            .uri("/hello")
            .body(Body::from(vec![b'x'; 4096]))
            .unwrap();

        let response = handler.serve(request).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"failed to read request body");
    }

    #[tokio::test]
    async fn test_logs_matched_and_unmatched_by_default() {
        let logs = logs_for(LogSettings::default()).await;
        assert!(logs.contains("Request matched"));
        assert!(logs.contains("No matching mock found"));
    }

    #[tokio::test]
    async fn test_log_switches_silence_each_outcome() {
        let logs = logs_for(LogSettings {
            log_matches: false,
            log_unmatched: true,
        })
        .await;
        assert!(!logs.contains("Request matched"));
        assert!(logs.contains("No matching mock found"));

        let logs = logs_for(LogSettings {
            log_matches: true,
            log_unmatched: false,
        })
        .await;
        assert!(logs.contains("Request matched"));
        assert!(!logs.contains("No matching mock found"));
    }
}
