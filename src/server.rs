//! HTTP server setup.
//!
//! Builds an axum router with one route per configured path, each bound to
//! its own [`RequestHandler`], and serves it until Ctrl-C.

use crate::config::{MockConfig, ServerSettings};
use crate::handler::{self, RequestHandler};
use crate::latency::LatencyInjector;
use crate::ruleset::RuleSet;
use axum::routing::any;
use axum::Router;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::info;

/// The mock HTTP server.
#[derive(Debug)]
pub struct MockServer {
    router: Router,
    settings: ServerSettings,
}

impl MockServer {
    /// Create a server whose latency sleeps on the tokio timer.
    pub fn new(config: MockConfig) -> Self {
        Self::with_latency(config, Arc::new(LatencyInjector::default()))
    }

    /// Create a server with a caller-supplied latency injector.
    pub fn with_latency(config: MockConfig, latency: Arc<LatencyInjector>) -> Self {
        let rule_set = RuleSet::new(&config.matchers);
        info!(
            matchers = config.matchers.len(),
            paths = rule_set.len(),
            "Mock server initialized"
        );

        let router = build_router(&rule_set, &config, latency);
        Self {
            router,
            settings: config.server,
        }
    }

    /// The router, for driving the server without a socket.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Address from the configuration, as `host:port`.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.settings.host, self.settings.port)
    }

    /// Serve on `listener` until Ctrl-C.
    pub async fn run(self, listener: TcpListener) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        info!(address = %addr, "Listening");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("Mock server stopped");
        Ok(())
    }
}

#[allow(deprecated)]
fn build_router(
    rule_set: &RuleSet,
    config: &MockConfig,
    latency: Arc<LatencyInjector>,
) -> Router {
    let mut router = Router::new();

    for (path, rules) in rule_set.iter() {
        let handler = Arc::new(RequestHandler::new(
            path,
            rules.clone(),
            latency.clone(),
            config.settings.clone(),
            config.server.max_body_bytes,
        ));
        router = router.route(path, any(handler::serve_route).with_state(handler));
    }

    router
        .fallback(handler::serve_unregistered)
        .layer(TimeoutLayer::new(config.server.request_timeout))
        .layer(TraceLayer::new_for_http())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
