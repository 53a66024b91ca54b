//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, HeaderMap, Request, StatusCode};
use axum::Router;
use tokio::net::TcpListener;
use tower::ServiceExt;

use micro_web::config::{AppConfig, SessionBackend};
use micro_web::{Context, HttpServer, RouteTable, Shutdown};

pub const SECRET: &str = "integration-test-secret";

/// Default config with a cookie secret and the given session backend.
pub fn test_config(store: SessionBackend) -> AppConfig {
    let mut config = AppConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.security.cookie_secret = Some(SECRET.to_string());
    config.session.store = store;
    config
}

fn counter(ctx: &mut Context) -> String {
    let count = ctx.session().get::<u64>("count").unwrap_or(0) + 1;
    ctx.session_mut().insert("count", count);
    count.to_string()
}

/// `/` counts visits in the session; `/hello/([a-z]+)` greets.
pub fn demo_routes() -> RouteTable {
    let mut routes = RouteTable::new();
    routes
        .get("/", counter)
        .get("/hello/([a-z]+)", |name: String| format!("Hi {}", name));
    routes
}

pub struct Reply {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl Reply {
    /// `Set-Cookie` headers turned into a `Cookie` request header value.
    pub fn cookie_header(&self) -> String {
        self.headers
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .filter_map(|v| v.split(';').next())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Drive one request through the router without a socket.
pub async fn send(router: &Router, request: Request<Body>) -> Reply {
    let response = router.clone().oneshot(request).await.unwrap();
    let (parts, body) = response.into_parts();
    let body = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    Reply {
        status: parts.status,
        headers: parts.headers,
        body: String::from_utf8(body.to_vec()).unwrap(),
    }
}

pub fn get(uri: &str, cookies: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(cookies) = cookies {
        builder = builder.header(header::COOKIE, cookies);
    }
    builder.body(Body::empty()).unwrap()
}

/// Serve `routes` on an ephemeral port. Trigger the returned shutdown to stop.
pub async fn start_server(config: AppConfig, routes: RouteTable) -> (SocketAddr, Shutdown) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let server = HttpServer::new(&config, routes);
    let server_shutdown = shutdown.subscribe();

    tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    (addr, shutdown)
}
