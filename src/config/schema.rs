//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the
//! framework. All types derive Serde traits for deserialization from config
//! files, and every field has a default so an empty file is valid.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration for an application.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Listener configuration (bind address, limits).
    pub listener: ListenerConfig,

    /// Server identity.
    pub server: ServerConfig,

    /// Cookie signing.
    pub security: SecurityConfig,

    /// Session backend selection and expiry.
    pub session: SessionConfig,

    /// Static file serving.
    pub static_files: StaticFilesConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "127.0.0.1:9999").
    pub bind_address: String,

    /// Whole-request timeout.
    pub request_timeout_secs: u64,

    /// Largest accepted request body.
    pub max_body_bytes: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:9999".to_string(),
            request_timeout_secs: 30,
            max_body_bytes: 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Value of the `Server` response header.
    pub name: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: "micro-web".to_string(),
        }
    }
}

/// Cookie signing configuration.
#[derive(Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct SecurityConfig {
    /// HMAC key for signed cookies. Without it signed cookies are refused.
    pub cookie_secret: Option<String>,
}

impl fmt::Debug for SecurityConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecurityConfig")
            .field("cookie_secret", &self.cookie_secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Which session backend to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SessionBackend {
    #[default]
    Memory,
    Cookie,
    File,
    None,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    pub store: SessionBackend,

    /// Idle lifetime of a session, also the session cookie's age.
    pub duration_secs: u64,

    /// Tick of the memory/file expiry sweep.
    pub sweep_interval_secs: u64,

    /// Directory for the file backend.
    pub directory: Option<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            store: SessionBackend::Memory,
            duration_secs: 600,
            sweep_interval_secs: 60,
            directory: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StaticFilesConfig {
    /// Directory to serve from. Unset disables static serving.
    pub root: Option<PathBuf>,

    /// File served for `/` when no route matches.
    pub index_file: String,
}

impl Default for StaticFilesConfig {
    fn default() -> Self {
        Self {
            root: None,
            index_file: "index.html".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9100".to_string(),
        }
    }
}
