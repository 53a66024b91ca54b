//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     trigger → every subscriber (HTTP server) wakes
//!     → stop accepting → drain connections → stop session sweeper → exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//! ```
//!
//! # Design Decisions
//! - Ordered shutdown: stop accept, drain, then background tasks

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
pub use signals::{spawn_signal_listener, wait_for_signal};
