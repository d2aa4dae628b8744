//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with all handlers
//! - Wire up middleware (tracing, body limit, request ID)
//! - Map HTTP methods onto the operations they accept
//! - Bound each call by the request timeout
//! - Serve until the shutdown signal fires
//!
//! # Design Decisions
//! - Calls run on their own task. A timed-out or abandoned request stops
//!   waiting, but the call still finishes and releases its connection

use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::HeaderMap,
    response::IntoResponse,
    routing::get,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::Instrument;

use crate::config::GatewayConfig;
use crate::dispatch::OperationKind;
use crate::error::GatewayError;
use crate::gateway::{Gateway, GatewayRequest};
use crate::http::request::request_id;
use crate::http::response::HttpReply;
use crate::http::sessions::SessionLimiter;
use crate::http::websocket;
use crate::lifecycle::Shutdown;

const POST_OPERATIONS: &[OperationKind] = &[
    OperationKind::Create,
    OperationKind::Find,
    OperationKind::Insert,
];
const PUT_OPERATIONS: &[OperationKind] = &[OperationKind::Update];
const DELETE_OPERATIONS: &[OperationKind] = &[OperationKind::Delete];

pub const WELCOME: &str = "Welcome to the MongoDB gateway";

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub gateway: Gateway,
    pub sessions: SessionLimiter,
    pub shutdown: Shutdown,
    pub max_message_size: usize,
    pub request_timeout: Duration,
}

/// HTTP server for the gateway.
pub struct HttpServer {
    router: Router,
    config: GatewayConfig,
}

impl HttpServer {
    /// Create a new HTTP server around `gateway`.
    ///
    /// Open sessions are closed when `shutdown` is triggered.
    pub fn new(config: GatewayConfig, gateway: Gateway, shutdown: Shutdown) -> Self {
        let state = AppState {
            gateway,
            sessions: SessionLimiter::new(config.session.max_sessions),
            shutdown,
            max_message_size: config.session.max_message_size,
            request_timeout: Duration::from_secs(config.timeouts.request_secs),
        };

        let router = Self::build_router(&config, state);
        Self { router, config }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(config: &GatewayConfig, state: AppState) -> Router {
        Router::new()
            .route("/", get(root))
            .route(
                "/mongodb",
                get(method_not_supported)
                    .post(post_operation)
                    .put(put_operation)
                    .delete(delete_operation),
            )
            .route("/mongodb/ws", get(websocket::upgrade))
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                    .layer(TraceLayer::new_for_http())
                    .layer(PropagateRequestIdLayer::x_request_id())
                    .layer(RequestBodyLimitLayer::new(config.security.max_body_size))
                    .layer(DefaultBodyLimit::disable()),
            )
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            max_sessions = self.config.session.max_sessions,
            "HTTP server starting"
        );

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }
}

async fn root() -> &'static str {
    WELCOME
}

async fn post_operation(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> HttpReply {
    serve_call(&state, &headers, body, POST_OPERATIONS).await
}

async fn put_operation(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> HttpReply {
    serve_call(&state, &headers, body, PUT_OPERATIONS).await
}

async fn delete_operation(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> HttpReply {
    serve_call(&state, &headers, body, DELETE_OPERATIONS).await
}

async fn method_not_supported() -> impl IntoResponse {
    HttpReply(Err(GatewayError::UnsupportedOperation(
        "Use POST, PUT or DELETE on /mongodb, or upgrade on /mongodb/ws".to_string(),
    )))
}

async fn serve_call(
    state: &AppState,
    headers: &HeaderMap,
    body: Bytes,
    accepts: &'static [OperationKind],
) -> HttpReply {
    let span = tracing::info_span!("call", request_id = %request_id(headers));
    let gateway = state.gateway.clone();
    let call = tokio::spawn(
        async move {
            match GatewayRequest::from_slice(&body) {
                Ok(request) => gateway.handle(request, accepts).await,
                Err(e) => Err(e),
            }
        }
        .instrument(span.clone()),
    );

    let outcome = match tokio::time::timeout(state.request_timeout, call).await {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(e)) => {
            tracing::error!(parent: &span, error = %e, "Call task failed");
            Err(GatewayError::Execution("Internal error while running the operation".to_string()))
        }
        Err(_) => {
            tracing::warn!(
                parent: &span,
                timeout_secs = state.request_timeout.as_secs(),
                "Request timed out, call continues until released"
            );
            Err(GatewayError::Execution(format!(
                "Request timed out after {}s",
                state.request_timeout.as_secs()
            )))
        }
    };
    HttpReply(outcome)
}
