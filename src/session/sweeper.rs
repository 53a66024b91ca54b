//! Background expiry sweep.
//!
//! # Responsibilities
//! - Run a store's purge routine on a fixed tick
//! - Stop on request or when the owning store is dropped
//!
//! # Design Decisions
//! - One owned task per store; no detached loops
//! - The purge runs on the blocking pool, since the file store does disk I/O
//! - The first sweep happens one interval after start, not immediately

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::observability::metrics;
use crate::session::SessionError;

/// Handle to a running sweep task.
#[derive(Debug)]
pub struct Sweeper {
    store: &'static str,
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl Sweeper {
    /// Start sweeping on the current Tokio runtime. `sweep` returns the
    /// number of sessions it evicted.
    pub fn spawn<F>(store: &'static str, interval: Duration, sweep: F) -> Result<Self, SessionError>
    where
        F: Fn() -> usize + Send + Sync + 'static,
    {
        let handle = Handle::try_current().map_err(|_| SessionError::NoRuntime)?;
        let (stop, mut stopped) = oneshot::channel();
        let sweep = Arc::new(sweep);

        let task = handle.spawn(async move {
            tracing::info!(store = store, interval_secs = interval.as_secs(), "Session sweeper starting");

            let mut ticker = time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let sweep = Arc::clone(&sweep);
                        match tokio::task::spawn_blocking(move || sweep()).await {
                            Ok(0) => {}
                            Ok(evicted) => {
                                tracing::debug!(store = store, evicted = evicted, "Expired sessions evicted");
                                metrics::record_sessions_evicted(store, evicted);
                            }
                            Err(e) => tracing::error!(store = store, error = %e, "Session sweep failed"),
                        }
                    }
                    _ = &mut stopped => {
                        tracing::info!(store = store, "Session sweeper stopping");
                        break;
                    }
                }
            }
        });

        Ok(Self {
            store,
            stop: Some(stop),
            task,
        })
    }

    /// Ask the task to stop after its current sweep. Idempotent.
    pub fn stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub fn store(&self) -> &'static str {
        self.store
    }
}

impl Drop for Sweeper {
    fn drop(&mut self) {
        self.stop();
        self.task.abort();
    }
}
