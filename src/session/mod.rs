//! Session subsystem.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     SessionConfig → build_store()
//!     → backend.init() (memory/file: spawn sweeper.rs; file: check dir)
//!     → on failure: null.rs (sessions never persist, requests still work)
//!
//! Per request (dispatcher):
//!     store.load(ctx)
//!         → load_session_id() (signed `sessionId` cookie, or a new id;
//!           re-issued either way so the cookie expiry slides)
//!         → backend lookup → ctx.session
//!     handler runs, mutates ctx.session
//!     store.save(ctx) → backend persists ctx.session under ctx.session_id
//! ```
//!
//! # Design Decisions
//! - A session is a JSON object; values are typed at the accessors
//! - Session ids are checked for shape before they touch any store
//! - Concurrent requests on one id are not serialized: last save wins
//! - Sweepers are owned tasks, stopped by `shutdown()` or on drop

pub mod cookie;
pub mod file;
pub mod memory;
pub mod null;
pub mod sweeper;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::config::{SessionBackend, SessionConfig};
use crate::http::context::Context;
use crate::observability::metrics;

pub use cookie::CookieStore;
pub use file::FileStore;
pub use memory::MemoryStore;
pub use null::NullStore;
pub use sweeper::Sweeper;

/// Cookie carrying the signed session id.
pub const SESSION_ID_COOKIE: &str = "sessionId";

const MAX_SESSION_ID_LEN: usize = 128;

/// Errors raised while setting up or persisting sessions.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no Tokio runtime available to run the session sweeper")]
    NoRuntime,

    #[error("session directory {0:?} does not exist or is not a directory")]
    MissingDirectory(PathBuf),

    #[error("file store selected but no session directory configured")]
    NoDirectoryConfigured,

    #[error("session I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("session serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Opaque, random session identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    /// 256 random bits as lowercase hex.
    pub fn generate() -> Self {
        let bytes: [u8; 32] = rand::thread_rng().gen();
        Self(hex::encode(bytes))
    }

    /// Accept an id read back from a client: 1-128 ASCII alphanumerics.
    pub fn parse(raw: &str) -> Option<Self> {
        let valid = !raw.is_empty()
            && raw.len() <= MAX_SESSION_ID_LEN
            && raw.bytes().all(|b| b.is_ascii_alphanumeric());
        valid.then(|| Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per-client key/value state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Session(Map<String, Value>);

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Typed read. `None` if absent or of a different shape.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.0
            .get(key)
            .and_then(|value| T::deserialize(value).ok())
    }

    pub fn get_value(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Typed write. Values that cannot be represented as JSON are logged
    /// and skipped.
    pub fn insert<T: Serialize>(&mut self, key: impl Into<String>, value: T) {
        let key = key.into();
        match serde_json::to_value(value) {
            Ok(value) => {
                self.0.insert(key, value);
            }
            Err(e) => tracing::warn!(key = %key, error = %e, "Session value not stored"),
        }
    }

    pub fn insert_value(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(key.into(), value)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.0)
    }

    /// Parse a stored session. Blank input is an empty session.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        if raw.trim().is_empty() {
            return Ok(Self::new());
        }
        serde_json::from_str(raw)
    }
}

/// A session persistence backend.
pub trait SessionStore: Send + Sync {
    /// Short backend name for logs and metrics.
    fn name(&self) -> &'static str;

    /// Backend setup. A failed init means the caller falls back to
    /// [`NullStore`].
    fn init(&self) -> Result<(), SessionError>;

    /// Resolve the session id and attach the session to `ctx`.
    fn load(&self, ctx: &mut Context);

    /// Persist `ctx`'s session under its id.
    fn save(&self, ctx: &mut Context);

    /// Session lifetime in seconds (also the session cookie's age).
    fn duration_secs(&self) -> u64;

    /// Stop background work. Idempotent.
    fn shutdown(&self) {}
}

/// Read the signed session id cookie, or issue a fresh id.
///
/// The cookie is re-issued on every request, so it expires
/// `duration_secs` after the last visit rather than the first.
/// Returns true if an existing id was found.
pub fn load_session_id(ctx: &mut Context, store: &'static str, duration_secs: u64) -> bool {
    let existing = ctx
        .get_secure_cookie(SESSION_ID_COOKIE)
        .and_then(|raw| SessionId::parse(&raw));
    let found = existing.is_some();

    let id = existing.unwrap_or_else(|| {
        tracing::debug!(store = store, "New session issued");
        metrics::record_session_created(store);
        SessionId::generate()
    });
    // A refusal is logged by the context; the id then lives for this request only.
    let _ = ctx.set_secure_cookie(SESSION_ID_COOKIE, id.as_str(), duration_secs);
    ctx.set_session_id(id);
    found
}

/// Build and initialize the configured backend, falling back to
/// [`NullStore`] when none is selected or initialization fails.
pub fn build_store(config: &SessionConfig) -> Arc<dyn SessionStore> {
    let duration = config.duration_secs;
    let interval = Duration::from_secs(config.sweep_interval_secs);

    let selected: Result<Option<Arc<dyn SessionStore>>, SessionError> = match config.store {
        SessionBackend::Memory => Ok(Some(Arc::new(MemoryStore::new(duration, interval)))),
        SessionBackend::Cookie => Ok(Some(Arc::new(CookieStore::new(duration)))),
        SessionBackend::File => match &config.directory {
            Some(dir) => Ok(Some(Arc::new(FileStore::new(dir, duration, interval)))),
            None => Err(SessionError::NoDirectoryConfigured),
        },
        SessionBackend::None => Ok(None),
    };

    let store = match selected {
        Ok(Some(store)) => store,
        Ok(None) => {
            tracing::info!("Sessions disabled by configuration");
            return Arc::new(NullStore);
        }
        Err(e) => {
            tracing::error!(error = %e, "Session store unavailable; sessions will not persist");
            return Arc::new(NullStore);
        }
    };

    match store.init() {
        Ok(()) => {
            tracing::info!(store = store.name(), duration_secs = duration, "Session store initialized");
            store
        }
        Err(e) => {
            tracing::error!(
                store = store.name(),
                error = %e,
                "Session store failed to initialize; sessions will not persist"
            );
            Arc::new(NullStore)
        }
    }
}
