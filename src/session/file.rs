//! Session store backed by one JSON file per session.
//!
//! # Responsibilities
//! - Map a session id to `<directory>/<id>.json`
//! - Read (creating an empty file if absent) and atomically rewrite sessions
//! - Periodically remove files not modified within the session duration
//!
//! # Design Decisions
//! - Writes go to a temp file in the same directory and are renamed into
//!   place, so a reader never observes a half-written session
//! - Expiry uses the file's modification time; every save refreshes it
//! - Ids are validated before they reach this module, so they are safe
//!   as file names

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tempfile::NamedTempFile;

use crate::clock::{unix_now, unix_seconds};
use crate::http::context::Context;
use crate::session::sweeper::Sweeper;
use crate::session::{load_session_id, Session, SessionError, SessionId, SessionStore};

const STORE_NAME: &str = "file";
const EXTENSION: &str = "json";

#[derive(Debug)]
pub struct FileStore {
    directory: PathBuf,
    duration_secs: u64,
    sweep_interval: Duration,
    sweeper: Mutex<Option<Sweeper>>,
}

impl FileStore {
    pub fn new(directory: impl Into<PathBuf>, duration_secs: u64, sweep_interval: Duration) -> Self {
        Self {
            directory: directory.into(),
            duration_secs,
            sweep_interval,
            sweeper: Mutex::new(None),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn path_for(&self, id: &SessionId) -> PathBuf {
        self.directory.join(format!("{}.{}", id, EXTENSION))
    }

    /// Read a session, creating an empty file if none exists yet.
    pub fn read(&self, id: &SessionId) -> Result<Session, SessionError> {
        let path = self.path_for(id);
        match fs::read_to_string(&path) {
            Ok(raw) => Ok(Session::from_json(&raw)?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                match OpenOptions::new().write(true).create_new(true).open(&path) {
                    Ok(_) => {}
                    Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
                    Err(e) => return Err(e.into()),
                }
                Ok(Session::new())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Replace a session file atomically.
    pub fn write(&self, id: &SessionId, session: &Session) -> Result<(), SessionError> {
        let json = session.to_json()?;
        let mut tmp = NamedTempFile::new_in(&self.directory)?;
        tmp.write_all(json.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(self.path_for(id)).map_err(|e| e.error)?;
        Ok(())
    }

    /// Remove session files last modified at or before `now - duration`.
    pub fn purge_expired(&self, now: u64) -> usize {
        purge(&self.directory, self.duration_secs, now)
    }
}

fn purge(directory: &Path, duration_secs: u64, now: u64) -> usize {
    let entries = match fs::read_dir(directory) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!(directory = %directory.display(), error = %e, "Session directory unreadable");
            return 0;
        }
    };

    let mut evicted = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some(EXTENSION) {
            continue;
        }
        let modified = match entry.metadata().and_then(|meta| meta.modified()) {
            Ok(modified) => unix_seconds(modified),
            Err(_) => continue,
        };
        if modified.saturating_add(duration_secs) > now {
            continue;
        }
        match fs::remove_file(&path) {
            Ok(()) => evicted += 1,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "Could not remove expired session"),
        }
    }
    evicted
}

impl SessionStore for FileStore {
    fn name(&self) -> &'static str {
        STORE_NAME
    }

    fn init(&self) -> Result<(), SessionError> {
        if !self.directory.is_dir() {
            return Err(SessionError::MissingDirectory(self.directory.clone()));
        }
        let mut slot = self.sweeper.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return Ok(());
        }
        let directory = self.directory.clone();
        let duration = self.duration_secs;
        let sweeper = Sweeper::spawn(STORE_NAME, self.sweep_interval, move || {
            purge(&directory, duration, unix_now())
        })?;
        *slot = Some(sweeper);
        Ok(())
    }

    fn load(&self, ctx: &mut Context) {
        load_session_id(ctx, STORE_NAME, self.duration_secs);
        let Some(id) = ctx.session_id().cloned() else {
            return;
        };

        let session = self.read(&id).unwrap_or_else(|e| {
            tracing::warn!(session = %id, error = %e, "Session file unreadable; starting empty");
            Session::new()
        });
        ctx.set_session(session);
    }

    fn save(&self, ctx: &mut Context) {
        let Some(id) = ctx.session_id().cloned() else {
            return;
        };
        if let Err(e) = self.write(&id, ctx.session()) {
            tracing::error!(session = %id, error = %e, "Session file not saved");
        }
    }

    fn duration_secs(&self) -> u64 {
        self.duration_secs
    }

    fn shutdown(&self) {
        let mut slot = self.sweeper.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(mut sweeper) = slot.take() {
            sweeper.stop();
        }
    }
}
