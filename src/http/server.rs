//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Build the dispatcher from configuration (signer, sessions, static files)
//! - Create the Axum Router that feeds every request to the dispatcher
//! - Wire up middleware (tracing, timeout, body limit, request ID)
//! - Serve on a listener until shutdown, then stop the session sweeper
//!
//! # Design Decisions
//! - Handlers are synchronous; each request runs on the blocking pool
//! - A panicking handler becomes a 500, never a dropped connection

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::{Request as HttpRequest, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::{AppConfig, ListenerConfig};
use crate::cookie::CookieSigner;
use crate::http::connection::BufferedConnection;
use crate::http::dispatcher::Dispatcher;
use crate::http::request::{Request, UuidRequestId, X_REQUEST_ID};
use crate::http::static_files::StaticFiles;
use crate::routing::RouteTable;
use crate::session::build_store;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
}

/// HTTP server for an application's route table.
pub struct HttpServer {
    router: Router,
    dispatcher: Arc<Dispatcher>,
}

impl HttpServer {
    /// Build the server from configuration. Must run inside a Tokio
    /// runtime so the session sweeper can start.
    pub fn new(config: &AppConfig, routes: RouteTable) -> Self {
        let signer = Arc::new(CookieSigner::new(config.security.cookie_secret.as_deref()));
        let sessions = build_store(&config.session);

        let mut dispatcher =
            Dispatcher::new(routes, sessions, signer).with_server_name(config.server.name.as_str());

        if let Some(root) = &config.static_files.root {
            match StaticFiles::new(root) {
                Ok(files) => {
                    tracing::info!(root = %root.display(), "Serving static files");
                    dispatcher = dispatcher
                        .with_static_files(files.with_index_file(config.static_files.index_file.as_str()));
                }
                Err(e) => tracing::error!(error = %e, "Static file serving disabled"),
            }
        }

        Self::from_dispatcher(dispatcher, &config.listener)
    }

    /// Wrap an already assembled dispatcher.
    pub fn from_dispatcher(dispatcher: Dispatcher, listener: &ListenerConfig) -> Self {
        tracing::info!(
            routes = dispatcher.routes().len(),
            session_store = dispatcher.sessions().name(),
            "Dispatcher ready"
        );
        let dispatcher = Arc::new(dispatcher);
        let state = AppState {
            dispatcher: Arc::clone(&dispatcher),
        };
        let router = Self::build_router(listener, state);
        Self { router, dispatcher }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(listener: &ListenerConfig, state: AppState) -> Router {
        Router::new()
            .route("/{*path}", any(dispatch_handler))
            .route("/", any(dispatch_handler))
            .with_state(state)
            .layer(RequestBodyLimitLayer::new(listener.max_body_bytes))
            .layer(TimeoutLayer::new(Duration::from_secs(listener.request_timeout_secs)))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http().make_span_with(|request: &HttpRequest<Body>| {
                let request_id = request
                    .headers()
                    .get(X_REQUEST_ID)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("unknown");
                tracing::info_span!(
                    "request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %request_id,
                )
            }))
            .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
    }

    /// The router, for serving or for driving with `tower::ServiceExt`.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Run the server until `shutdown` fires, then stop session sweeping.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let result = axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received, draining connections");
            })
            .await;

        self.dispatcher.sessions().shutdown();
        result?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Collect the body, then run the dispatcher on the blocking pool.
async fn dispatch_handler(State(state): State<AppState>, request: HttpRequest<Body>) -> Response {
    let (parts, body) = request.into_parts();
    let body = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(path = %parts.uri.path(), error = %e, "Could not read request body");
            return (StatusCode::BAD_REQUEST, "Could not read request body").into_response();
        }
    };

    let request = match Request::from_parts(&parts, body) {
        Ok(request) => request,
        Err(e) => {
            tracing::warn!(error = %e, "Rejecting request");
            return (StatusCode::BAD_REQUEST, "Bad request path").into_response();
        }
    };
    let (conn, done) = BufferedConnection::new();
    let dispatcher = Arc::clone(&state.dispatcher);

    if let Err(e) = tokio::task::spawn_blocking(move || dispatcher.handle(request, Box::new(conn))).await {
        tracing::error!(path = %parts.uri.path(), error = %e, "Handler failed");
        return internal_error();
    }

    match done.await {
        Ok(response) => response,
        Err(_) => {
            tracing::error!(path = %parts.uri.path(), "Handler finished without a response");
            internal_error()
        }
    }
}

fn internal_error() -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
}
