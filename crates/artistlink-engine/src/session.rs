//! Search sessions keyed by opaque ids.
//!
//! [`SessionRegistry`] owns the observer channel of each active search and
//! keeps finished results for a grace period so a reconnecting observer can
//! still collect them. Expired results are removed by
//! [`SessionRegistry::sweep_expired`], run periodically by
//! [`SessionRegistry::start_expiry_sweep`].

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::RouteError;
use crate::finder::RouteResult;
use crate::notifier::{ChannelNotifier, ProgressEvent};

/// Opaque session identifier (UUID v4 newtype).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

struct Session {
    notifier: Arc<ChannelNotifier>,
}

struct FinishedSearch {
    outcome: Result<RouteResult, RouteError>,
    finished_at: Instant,
}

/// Registry of active sessions and recently finished results.
pub struct SessionRegistry {
    sessions: DashMap<SessionId, Session>,
    results: DashMap<SessionId, FinishedSearch>,
    buffer: usize,
    grace: Duration,
}

impl SessionRegistry {
    pub fn new(buffer: usize, grace: Duration) -> Self {
        SessionRegistry {
            sessions: DashMap::new(),
            results: DashMap::new(),
            buffer,
            grace,
        }
    }

    /// Opens a session. The receiver yields the session's progress events.
    pub fn create(&self) -> (SessionId, mpsc::Receiver<ProgressEvent>) {
        let id = SessionId(Uuid::new_v4());
        let (notifier, rx) = ChannelNotifier::channel(self.buffer);
        self.sessions.insert(
            id,
            Session {
                notifier: Arc::new(notifier),
            },
        );
        debug!(session = %id, "session created");
        (id, rx)
    }

    /// The notifier feeding the session's observer.
    pub fn notifier(&self, id: &SessionId) -> Option<Arc<ChannelNotifier>> {
        self.sessions
            .get(id)
            .map(|entry| Arc::clone(&entry.notifier))
    }

    /// Closes a session. A search still running for it keeps its notifier
    /// and finishes normally. Returns `true` if the session existed.
    pub fn teardown(&self, id: &SessionId) -> bool {
        let removed = self.sessions.remove(id).is_some();
        if removed {
            debug!(session = %id, "session torn down");
        }
        removed
    }

    pub fn is_active(&self, id: &SessionId) -> bool {
        self.sessions.contains_key(id)
    }

    pub fn active_count(&self) -> usize {
        self.sessions.len()
    }

    /// Keeps the outcome of a finished search for the grace period.
    pub fn store_result(&self, id: SessionId, outcome: Result<RouteResult, RouteError>) {
        self.results.insert(
            id,
            FinishedSearch {
                outcome,
                finished_at: Instant::now(),
            },
        );
    }

    /// Removes and returns a finished outcome, if still within its grace
    /// period.
    pub fn take_result(&self, id: &SessionId) -> Option<Result<RouteResult, RouteError>> {
        let (_, finished) = self.results.remove(id)?;
        (finished.finished_at.elapsed() < self.grace).then_some(finished.outcome)
    }

    pub fn has_result(&self, id: &SessionId) -> bool {
        self.results.contains_key(id)
    }

    /// Drops results older than the grace period. Returns how many were
    /// removed.
    pub fn sweep_expired(&self) -> usize {
        let mut removed = 0;
        self.results.retain(|_, finished| {
            let keep = finished.finished_at.elapsed() < self.grace;
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }

    /// Spawns a background task calling [`SessionRegistry::sweep_expired`]
    /// every `interval`.
    pub fn start_expiry_sweep(self: &Arc<Self>, interval: Duration) {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(interval);
            loop {
                tick.tick().await;
                let removed = registry.sweep_expired();
                if removed > 0 {
                    info!(removed, "swept expired search results");
                }
            }
        });
    }
}
