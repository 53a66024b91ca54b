//! Cookie security subsystem.
//!
//! # Data Flow
//! ```text
//! Outbound (set_secure_cookie):
//!     value → base64 → HMAC-SHA1(secret, b64 || timestamp)
//!     → "b64|timestamp|hexsig" → jar.rs (Set-Cookie line with expires)
//!
//! Inbound (get_secure_cookie):
//!     Cookie header → jar.rs (name → raw value map)
//!     → signer.rs (split, verify signature, check age, decode base64)
//!     → Some(value) or None
//! ```
//!
//! # Design Decisions
//! - Secret is set once at startup and read-only afterwards
//! - No secret means fail closed: nothing is signed, nothing verifies
//! - Every integrity failure reads as "cookie absent", never as an error
//!   surfaced to the client

pub mod jar;
pub mod signer;

pub use jar::{format_set_cookie, http_date, parse_cookie_header};
pub use signer::{CookieError, CookieSigner, SignedValue, MAX_COOKIE_AGE_SECS};
