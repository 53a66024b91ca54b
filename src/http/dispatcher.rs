//! Request dispatch.
//!
//! # Responsibilities
//! - Parse parameters and cookies
//! - Set the default response headers
//! - Serve static files, then routes, then the index page, then 404
//! - Wrap every handler call in a session load/save
//! - Write a handler's returned body if it did not respond itself
//!
//! # Data Flow
//! ```text
//! Request + Connection
//!     → parse params/cookies (failures logged, request continues)
//!     → Context (Content-Type, Server, Date)
//!     → static files (GET/HEAD)          → served? done
//!     → RouteTable::find(path, method)
//!         none: "/" → index file, else 404 "Page not found"
//!     → sessions.load → handler(ctx, captures) → sessions.save
//!     → Reply::Body and not started → Content-Length, 200, body
//!     → close
//! ```
//!
//! # Design Decisions
//! - Synchronous; the transport runs it on the blocking pool
//! - The session is saved even if the handler aborted the response
//! - Handler arity was checked at registration, so binding cannot fail here

use std::sync::Arc;
use std::time::Instant;

use axum::http::{header, Method, StatusCode};
use chrono::Utc;

use crate::cookie::{http_date, CookieSigner};
use crate::http::connection::Connection;
use crate::http::context::Context;
use crate::http::request::Request;
use crate::http::static_files::StaticFiles;
use crate::observability::metrics;
use crate::routing::{HttpMethod, Reply, RouteTable};
use crate::session::{NullStore, SessionStore};

const DEFAULT_CONTENT_TYPE: &str = "text/html; charset=utf-8";
const NOT_FOUND_BODY: &str = "Page not found";

/// Resolves requests to handlers. Shared by every request.
pub struct Dispatcher {
    routes: Arc<RouteTable>,
    sessions: Arc<dyn SessionStore>,
    signer: Arc<CookieSigner>,
    static_files: Option<StaticFiles>,
    server_name: String,
}

impl Dispatcher {
    pub fn new(routes: RouteTable, sessions: Arc<dyn SessionStore>, signer: Arc<CookieSigner>) -> Self {
        Self {
            routes: Arc::new(routes),
            sessions,
            signer,
            static_files: None,
            server_name: env!("CARGO_PKG_NAME").to_string(),
        }
    }

    /// A dispatcher with no sessions and no cookie secret.
    pub fn bare(routes: RouteTable) -> Self {
        Self::new(routes, Arc::new(NullStore), Arc::new(CookieSigner::new(None)))
    }

    pub fn with_static_files(mut self, static_files: StaticFiles) -> Self {
        self.static_files = Some(static_files);
        self
    }

    pub fn with_server_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = name.into();
        self
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    pub fn sessions(&self) -> &Arc<dyn SessionStore> {
        &self.sessions
    }

    /// Handle one request, writing the response to `conn`.
    pub fn handle(&self, mut request: Request, conn: Box<dyn Connection>) {
        let start = Instant::now();
        let method = request.method.clone();
        tracing::info!("{} {}", method, request.target());

        if let Err(e) = request.parse_params() {
            tracing::warn!(path = %request.path, error = %e, "Could not parse request parameters");
        }
        if let Err(e) = request.parse_cookies() {
            tracing::warn!(path = %request.path, error = %e, "Could not parse cookies");
        }

        let mut ctx = Context::new(request, conn, Arc::clone(&self.signer));
        ctx.set_header(header::CONTENT_TYPE.as_str(), DEFAULT_CONTENT_TYPE, true);
        ctx.set_header(header::SERVER.as_str(), &self.server_name, true);
        ctx.set_header(header::DATE.as_str(), &http_date(Utc::now()), true);

        self.route(&mut ctx, &method);

        ctx.close();
        let status = ctx.status().unwrap_or(StatusCode::OK);
        metrics::record_request(method.as_str(), status.as_u16(), start);
    }

    fn route(&self, ctx: &mut Context, method: &Method) {
        let fetch = method == Method::GET || method == Method::HEAD;

        if fetch {
            if let Some(files) = &self.static_files {
                if files.serve(ctx) {
                    return;
                }
            }
        }

        let found = HttpMethod::from_http(method).and_then(|m| {
            self.routes
                .find(ctx.path(), m)
                .map(|found| (found.route.handler.clone(), found.captures))
        });

        let Some((handler, captures)) = found else {
            if fetch && ctx.path() == "/" {
                if let Some(files) = &self.static_files {
                    if files.index(ctx) {
                        return;
                    }
                }
            }
            tracing::debug!(method = %method, path = %ctx.path(), "No route matched");
            ctx.not_found(NOT_FOUND_BODY);
            return;
        };

        self.sessions.load(ctx);
        let reply = handler.call(ctx, captures);
        self.sessions.save(ctx);

        if let Reply::Body(body) = reply {
            if ctx.is_started() {
                tracing::debug!(path = %ctx.path(), "Response already started; returned body ignored");
                return;
            }
            ctx.set_header(header::CONTENT_LENGTH.as_str(), &body.len().to_string(), true);
            ctx.start_response(StatusCode::OK);
            ctx.write_str(&body);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::connection::BufferedConnection;
    use crate::session::MemoryStore;
    use axum::body::{Body, Bytes};
    use axum::http::Response;
    use std::time::Duration;
    use tempfile::TempDir;

    fn dispatch(dispatcher: &Dispatcher, request: Request) -> (StatusCode, axum::http::HeaderMap, Bytes) {
        let (conn, mut rx) = BufferedConnection::new();
        dispatcher.handle(request, Box::new(conn));
        let response: Response<Body> = rx.try_recv().unwrap();
        let (parts, body) = response.into_parts();
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let body = rt.block_on(axum::body::to_bytes(body, usize::MAX)).unwrap();
        (parts.status, parts.headers, body)
    }

    fn hello_routes() -> RouteTable {
        let mut routes = RouteTable::new();
        routes.get("/hello/([a-z]+)", |name: String| format!("Hi {}", name));
        routes
    }

    #[test]
    fn test_hello_scenario() {
        let dispatcher = Dispatcher::bare(hello_routes());

        let (status, headers, body) = dispatch(&dispatcher, Request::new(Method::GET, "/hello/bob"));
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "Hi bob");
        assert_eq!(headers[header::CONTENT_LENGTH], "6");
        assert_eq!(headers[header::CONTENT_TYPE], DEFAULT_CONTENT_TYPE);
        assert_eq!(headers[header::SERVER], "micro-web");
        assert!(headers[header::DATE].to_str().unwrap().ends_with(" GMT"));

        let (status, _, body) = dispatch(&dispatcher, Request::new(Method::POST, "/hello/bob"));
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, NOT_FOUND_BODY);

        let (status, _, _) = dispatch(&dispatcher, Request::new(Method::GET, "/hello/Bob"));
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_head_matches_get_route_without_body() {
        let dispatcher = Dispatcher::bare(hello_routes());
        let (status, headers, body) = dispatch(&dispatcher, Request::new(Method::HEAD, "/hello/bob"));
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[header::CONTENT_LENGTH], "6");
        assert!(body.is_empty());
    }

    #[test]
    fn test_handler_response_wins_over_returned_body() {
        let mut routes = RouteTable::new();
        routes.get("/secret", |ctx: &mut Context| {
            ctx.abort(StatusCode::FORBIDDEN, "go away");
            "ignored"
        });
        let dispatcher = Dispatcher::bare(routes);
        let (status, _, body) = dispatch(&dispatcher, Request::new(Method::GET, "/secret"));
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body, "go away");
    }

    #[test]
    fn test_params_reach_handler() {
        let mut routes = RouteTable::new();
        routes.get("/greet", |ctx: &mut Context| {
            format!("Hello {}", ctx.param("name").unwrap_or("stranger"))
        });
        let dispatcher = Dispatcher::bare(routes);
        let (_, _, body) = dispatch(&dispatcher, Request::new(Method::GET, "/greet?name=Ada"));
        assert_eq!(body, "Hello Ada");
    }

    #[test]
    fn test_session_saved_after_abort() {
        let mut routes = RouteTable::new();
        routes.get("/", |ctx: &mut Context| {
            let hits = ctx.session().get::<u64>("hits").unwrap_or(0) + 1;
            ctx.session_mut().insert("hits", hits);
            ctx.abort(StatusCode::ACCEPTED, &hits.to_string());
        });
        let store = Arc::new(MemoryStore::new(600, Duration::from_secs(60)));
        let sessions: Arc<dyn SessionStore> = store.clone();
        let dispatcher = Dispatcher::new(routes, sessions, Arc::new(CookieSigner::new(Some("k"))));

        let (status, headers, body) = dispatch(&dispatcher, Request::new(Method::GET, "/"));
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body, "1");
        assert_eq!(store.len(), 1);

        let cookie = headers[header::SET_COOKIE].to_str().unwrap();
        let pair = cookie.split(';').next().unwrap();
        let request = Request::new(Method::GET, "/").with_header(header::COOKIE, pair);
        let (_, _, body) = dispatch(&dispatcher, request);
        assert_eq!(body, "2");
    }

    #[test]
    fn test_static_files_and_index() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("home.html"), "<p>home</p>").unwrap();
        std::fs::write(dir.path().join("app.js"), "run()").unwrap();

        let dispatcher = Dispatcher::bare(RouteTable::new())
            .with_static_files(StaticFiles::new(dir.path()).unwrap().with_index_file("home.html"));

        let (status, headers, body) = dispatch(&dispatcher, Request::new(Method::GET, "/app.js"));
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[header::CONTENT_TYPE], "application/javascript");
        assert_eq!(body, "run()");

        let (status, _, body) = dispatch(&dispatcher, Request::new(Method::GET, "/"));
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "<p>home</p>");

        let (status, _, _) = dispatch(&dispatcher, Request::new(Method::POST, "/app.js"));
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_routes_shadow_index_but_not_files() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("index.html"), "static").unwrap();
        let mut routes = RouteTable::new();
        routes.get("/", || "dynamic");
        let dispatcher = Dispatcher::bare(routes)
            .with_static_files(StaticFiles::new(dir.path()).unwrap());

        let (_, _, body) = dispatch(&dispatcher, Request::new(Method::GET, "/"));
        assert_eq!(body, "dynamic");
        let (_, _, body) = dispatch(&dispatcher, Request::new(Method::GET, "/index.html"));
        assert_eq!(body, "static");
    }

    #[test]
    fn test_unsupported_method_is_not_found() {
        let dispatcher = Dispatcher::bare(hello_routes());
        let (status, _, _) = dispatch(&dispatcher, Request::new(Method::OPTIONS, "/hello/bob"));
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
