//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Registration (at startup):
//!     (pattern, method, handler)
//!     → matcher.rs (compile anchored regex)
//!     → handler.rs (fixed handler shape + arity)
//!     → router.rs (arity == capture count, else log + drop)
//!
//! Incoming request (path, method):
//!     → router.rs (scan in registration order)
//!     → matcher.rs (method filter, full-path regex match)
//!     → Return: RouteMatch { route, captures } or None
//! ```
//!
//! # Design Decisions
//! - Routes compiled at startup, immutable at runtime
//! - Regex patterns for arbitrary captures; route counts are small
//! - First full match wins; registration order is the priority
//! - Handler arity is checked once, at registration

pub mod handler;
pub mod matcher;
pub mod router;

pub use handler::{Handler, IntoHandler, IntoReply, Reply};
pub use matcher::{HttpMethod, RoutePattern};
pub use router::{Route, RouteError, RouteMatch, RouteTable};
