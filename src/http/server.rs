//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with all handlers
//! - Wire up middleware (CORS, request ID, tracing, timeout backstop)
//! - Build the shared forwarding state once, at startup
//! - Serve until the shutdown signal fires

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderName, Method, Request,
    },
    routing::{get, post},
    Router,
};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::{resolve_blocked_hostnames, ConfigError, ProxyConfig};
use crate::forward::executor::{default_user_agent, ExecutorError, RequestExecutor};
use crate::forward::loop_guard::LoopDetector;
use crate::forward::model::RequestDefaults;
use crate::http::handlers;
use crate::http::request::{request_id_layers, X_REQUEST_ID};
use crate::http::response::X_SLINGSHOT_STREAMING;

/// Extra time the router-wide timeout allows past the longest caller deadline.
const TIMEOUT_GRACE_SECS: u64 = 10;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub executor: Arc<RequestExecutor>,
    pub loop_detector: Arc<LoopDetector>,
    pub defaults: RequestDefaults,
    pub local_files: bool,
    pub max_body_bytes: usize,
    pub version: Arc<str>,
}

impl AppState {
    pub fn from_config(config: &ProxyConfig, version: &str) -> Result<Self, ServerError> {
        let blocked = resolve_blocked_hostnames(&config.loop_guard)?;
        tracing::info!(count = blocked.len(), "Hostname blocklist ready");

        let user_agent = default_user_agent(&config.loop_guard.signature, version);
        let executor = RequestExecutor::new(&config.upstream, &config.timeouts, &user_agent)?;

        Ok(Self {
            executor: Arc::new(executor),
            loop_detector: Arc::new(LoopDetector::new(config.loop_guard.signature.clone(), blocked)),
            defaults: RequestDefaults::from(&config.timeouts),
            local_files: config.features.local_files,
            max_body_bytes: config.limits.max_body_bytes,
            version: Arc::from(version),
        })
    }
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Executor(#[from] ExecutorError),
}

/// HTTP server for the forwarding proxy.
pub struct HttpServer {
    router: Router,
    config: ProxyConfig,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: ProxyConfig) -> Result<Self, ServerError> {
        let state = AppState::from_config(&config, crate::VERSION)?;
        let router = Self::build_router(&config, state);
        Ok(Self { router, config })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ProxyConfig, state: AppState) -> Router {
        let backstop = Duration::from_secs(config.timeouts.max_request_secs + TIMEOUT_GRACE_SECS);
        let (set_request_id, propagate_request_id) = request_id_layers();

        Router::new()
            .route("/proxy/request", post(handlers::proxy_request))
            .route("/proxy/form", post(handlers::proxy_form))
            .route("/health", get(handlers::health))
            .route("/", get(handlers::root))
            .route("/file", post(handlers::read_file))
            .route("/dir", post(handlers::list_dir))
            .fallback(handlers::not_found)
            .with_state(state)
            .layer(TimeoutLayer::new(backstop))
            .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                let request_id = request
                    .headers()
                    .get(X_REQUEST_ID)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("unknown");
                tracing::info_span!(
                    "request",
                    method = %request.method(),
                    path = %request.uri().path(),
                    request_id = %request_id,
                )
            }))
            .layer(propagate_request_id)
            .layer(set_request_id)
            .layer(cors_layer())
    }

    /// Run the server, accepting connections on the given listener until
    /// `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            local_files = self.config.features.local_files,
            "HTTP server starting"
        );

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// The fully layered router, for serving on a custom transport.
    pub fn router(&self) -> Router {
        self.router.clone()
    }
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            CONTENT_TYPE,
            AUTHORIZATION,
            HeaderName::from_static("x-requested-with"),
        ])
        .expose_headers([X_SLINGSHOT_STREAMING])
        .max_age(Duration::from_secs(86400))
}
