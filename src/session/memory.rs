//! In-process session store.
//!
//! # Responsibilities
//! - Keep sessions and their last-access time in a shared concurrent map
//! - Evict sessions idle for longer than the session duration
//!
//! # Design Decisions
//! - Session data and access time live in one map entry, so an eviction
//!   can never leave one without the other
//! - `DashMap` shards the lock; request handlers and the sweeper never
//!   touch the same shard concurrently
//! - A session is evicted when `last_access + duration <= now`

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use dashmap::DashMap;

use crate::clock::unix_now;
use crate::http::context::Context;
use crate::session::sweeper::Sweeper;
use crate::session::{load_session_id, Session, SessionError, SessionId, SessionStore};

const STORE_NAME: &str = "memory";

#[derive(Debug, Clone)]
struct Entry {
    session: Session,
    last_access: u64,
}

#[derive(Debug)]
pub struct MemoryStore {
    entries: Arc<DashMap<SessionId, Entry>>,
    duration_secs: u64,
    sweep_interval: Duration,
    sweeper: Mutex<Option<Sweeper>>,
}

impl MemoryStore {
    pub fn new(duration_secs: u64, sweep_interval: Duration) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            duration_secs,
            sweep_interval,
            sweeper: Mutex::new(None),
        }
    }

    /// Drop every session idle since before `now - duration`.
    pub fn purge_expired(&self, now: u64) -> usize {
        purge(&self.entries, self.duration_secs, now)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: &SessionId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn last_access(&self, id: &SessionId) -> Option<u64> {
        self.entries.get(id).map(|entry| entry.last_access)
    }

    fn touch(&self, id: &SessionId, session: Session) {
        self.entries.insert(
            id.clone(),
            Entry {
                session,
                last_access: unix_now(),
            },
        );
    }
}

fn purge(entries: &DashMap<SessionId, Entry>, duration_secs: u64, now: u64) -> usize {
    let before = entries.len();
    entries.retain(|_, entry| entry.last_access.saturating_add(duration_secs) > now);
    before.saturating_sub(entries.len())
}

impl SessionStore for MemoryStore {
    fn name(&self) -> &'static str {
        STORE_NAME
    }

    fn init(&self) -> Result<(), SessionError> {
        let mut slot = self.sweeper.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return Ok(());
        }
        let entries = Arc::clone(&self.entries);
        let duration = self.duration_secs;
        let sweeper = Sweeper::spawn(STORE_NAME, self.sweep_interval, move || {
            purge(&entries, duration, unix_now())
        })?;
        *slot = Some(sweeper);
        Ok(())
    }

    fn load(&self, ctx: &mut Context) {
        load_session_id(ctx, STORE_NAME, self.duration_secs);
        let Some(id) = ctx.session_id().cloned() else {
            return;
        };

        let session = match self.entries.get_mut(&id) {
            Some(mut entry) => {
                entry.last_access = unix_now();
                entry.session.clone()
            }
            None => Session::new(),
        };
        ctx.set_session(session);
    }

    fn save(&self, ctx: &mut Context) {
        if let Some(id) = ctx.session_id().cloned() {
            self.touch(&id, ctx.session().clone());
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
