//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → AppConfig (validated, immutable)
//!     → passed by reference into signer, session store, dispatcher, server
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; there is no global state
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    AppConfig, ListenerConfig, LogFormat, ObservabilityConfig, SecurityConfig, ServerConfig,
    SessionBackend, SessionConfig, StaticFilesConfig,
};
pub use validation::{validate_config, ValidationError};
