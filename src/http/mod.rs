//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, timeout, body limit)
//!     → request.rs (method, path, query, headers, body)
//!     → dispatcher.rs (blocking pool)
//!         → context.rs (response state, cookies, session)
//!         → static_files.rs | routing | 404
//!     → connection.rs (buffered response, delivered on close)
//!     → Send to client
//! ```

pub mod connection;
pub mod context;
pub mod dispatcher;
pub mod request;
pub mod server;
pub mod static_files;

pub use connection::{BufferedConnection, Connection};
pub use context::{Context, ResponseState};
pub use dispatcher::Dispatcher;
pub use request::{urlencode, Request, RequestError, X_REQUEST_ID};
pub use server::{AppState, HttpServer};
pub use static_files::{StaticFiles, StaticFilesError};
