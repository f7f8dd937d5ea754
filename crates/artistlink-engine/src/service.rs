//! The entry point used by transport layers.
//!
//! [`RouteService`] wires the shared pieces together: one rate limiter and
//! one store for the whole process, plus the session registry that owns
//! observer channels and finished results.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use artistlink_core::EntityRecord;
use artistlink_storage::{InMemoryStore, SqliteStore};

use crate::config::{EngineConfig, SpotifyConfig};
use crate::error::RouteError;
use crate::finder::{RouteFinder, RouteResult};
use crate::notifier::{Notifier, ProgressEvent};
use crate::rate_limit::RateLimiter;
use crate::resolver::{shared_store, ConnectionResolver, SharedStore};
use crate::session::{SessionId, SessionRegistry};
use crate::source::CollaborationSource;
use crate::spotify::SpotifySource;
use crate::throttle::Throttle;

/// A search started in the background.
pub struct SearchHandle {
    pub session: SessionId,
    pub events: mpsc::Receiver<ProgressEvent>,
    pub task: JoinHandle<()>,
}

#[derive(Clone)]
pub struct RouteService {
    finder: Arc<RouteFinder>,
    sessions: Arc<SessionRegistry>,
}

impl RouteService {
    /// Builds a service over `source` and `store`.
    ///
    /// When called inside a tokio runtime, also starts the background sweep
    /// of expired results.
    pub fn new(
        source: Arc<dyn CollaborationSource>,
        store: SharedStore,
        config: &EngineConfig,
    ) -> Self {
        let resolver = Arc::new(ConnectionResolver::new(source, store, config));
        let sessions = Arc::new(SessionRegistry::new(
            config.notification_buffer,
            config.result_grace(),
        ));

        if tokio::runtime::Handle::try_current().is_ok() {
            let interval = (config.result_grace() / 2).max(Duration::from_secs(1));
            sessions.start_expiry_sweep(interval);
        } else {
            debug!("no runtime, result sweep not started");
        }

        RouteService {
            finder: Arc::new(RouteFinder::new(resolver)),
            sessions,
        }
    }

    /// A service backed by the Spotify Web API and a SQLite database at
    /// `db_path`.
    pub fn spotify(
        spotify: SpotifyConfig,
        db_path: &str,
        config: &EngineConfig,
    ) -> Result<Self, RouteError> {
        config.validate()?;
        let limiter = Arc::new(RateLimiter::from_config(&config.rate_limit));
        let throttle = Arc::new(Throttle::new(limiter, config.retry.clone()));
        let source = Arc::new(SpotifySource::new(spotify, throttle));
        let store = shared_store(SqliteStore::new(db_path)?);
        Ok(Self::new(source, store, config))
    }

    /// A service over `source` with an in-memory store (for testing).
    pub fn in_memory(source: Arc<dyn CollaborationSource>, config: &EngineConfig) -> Self {
        Self::new(source, shared_store(InMemoryStore::new()), config)
    }

    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }

    pub fn store(&self) -> &SharedStore {
        self.finder.resolver().store()
    }

    /// Runs a search to completion on the current task.
    pub async fn find_route(
        &self,
        start: &EntityRecord,
        end: &EntityRecord,
        notifier: &dyn Notifier,
        full_graph: bool,
    ) -> Result<RouteResult, RouteError> {
        self.finder.find_route(start, end, notifier, full_graph).await
    }

    /// Opens a session and runs the search in a spawned task.
    ///
    /// Events arrive on the returned receiver. Dropping the receiver or
    /// tearing the session down does not stop the search; its outcome is
    /// kept in the registry for the grace period either way.
    pub fn start_search(
        &self,
        start: EntityRecord,
        end: EntityRecord,
        full_graph: bool,
    ) -> Result<SearchHandle, RouteError> {
        let (session, events) = self.sessions.create();
        let notifier = self
            .sessions
            .notifier(&session)
            .ok_or_else(|| RouteError::Task(format!("session {} vanished", session)))?;
        let finder = Arc::clone(&self.finder);
        let sessions = Arc::clone(&self.sessions);

        let task = tokio::spawn(async move {
            let outcome = finder
                .find_route(&start, &end, notifier.as_ref(), full_graph)
                .await;
            if let Err(err) = &outcome {
                warn!(session = %session, error = %err, "search failed");
            }
            sessions.store_result(session, outcome);
            sessions.teardown(&session);
        });

        Ok(SearchHandle {
            session,
            events,
            task,
        })
    }

    /// The outcome of a background search, once finished.
    pub fn take_result(&self, session: &SessionId) -> Option<Result<RouteResult, RouteError>> {
        self.sessions.take_result(session)
    }
}
