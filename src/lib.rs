//! Minimal web framework library.
//!
//! Regex routes bound to typed handlers, HMAC-signed cookies, and
//! pluggable session stores, served over Axum.

pub mod clock;
pub mod config;
pub mod cookie;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod routing;
pub mod session;

pub use config::AppConfig;
pub use http::{Context, HttpServer};
pub use lifecycle::Shutdown;
pub use routing::{HttpMethod, Reply, RouteTable};
pub use session::{Session, SessionStore};
