//! End-to-end route searches over a scripted collaboration source.
//!
//! Each test builds a small collaboration world in a [`FakeSource`], runs a
//! search through [`RouteService`] backed by an in-memory store, and checks
//! the returned path, the emitted events and what was persisted.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use artistlink_core::{ArtistId, EntityRecord, GraphPayload, StubEntity, VisualNode};
use artistlink_engine::{
    shared_store, ChannelNotifier, CollaborationSource, EngineConfig, Notifier, NullNotifier,
    ProgressEvent, RouteError, RouteService, UpdateType, UpstreamError,
};
use artistlink_storage::{ArtistStore, SqliteStore};

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn id(raw: &str) -> ArtistId {
    ArtistId::from(raw)
}

fn ids(path: &[EntityRecord]) -> Vec<&str> {
    path.iter().map(|r| r.id.as_str()).collect()
}

/// A collaboration world defined up front. Every artist has details; unknown
/// ids have no collaborators.
#[derive(Default)]
struct FakeSource {
    collaborators: HashMap<ArtistId, Vec<StubEntity>>,
    popularity: HashMap<ArtistId, i32>,
    genres: HashMap<ArtistId, Vec<String>>,
    failing: HashSet<ArtistId>,
    calls: Mutex<Vec<ArtistId>>,
}

impl FakeSource {
    fn new() -> Self {
        Self::default()
    }

    fn link(mut self, artist: &str, neighbors: &[&str]) -> Self {
        let stubs = neighbors
            .iter()
            .map(|n| StubEntity::new(*n, n.to_uppercase()))
            .collect();
        self.collaborators.insert(id(artist), stubs);
        self
    }

    fn popularity(mut self, artist: &str, popularity: i32) -> Self {
        self.popularity.insert(id(artist), popularity);
        self
    }

    fn genres(mut self, artist: &str, genres: &[&str]) -> Self {
        self.genres
            .insert(id(artist), genres.iter().map(|g| g.to_string()).collect());
        self
    }

    fn failing(mut self, artist: &str) -> Self {
        self.failing.insert(id(artist));
        self
    }

    fn record(&self, artist: &str) -> EntityRecord {
        self.details_for(&id(artist))
    }

    fn details_for(&self, artist: &ArtistId) -> EntityRecord {
        let popularity = self.popularity.get(artist).copied().unwrap_or(50);
        let genres = self.genres.get(artist).cloned().unwrap_or_default();
        EntityRecord::new(artist.clone(), artist.as_str().to_uppercase(), popularity)
            .with_genres(genres)
    }

    /// Ids whose collaborators were fetched, in order.
    fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|a| a.as_str().to_string())
            .collect()
    }
}

#[async_trait]
impl CollaborationSource for FakeSource {
    async fn fetch_collaborators(
        &self,
        artist: &ArtistId,
    ) -> Result<Vec<StubEntity>, UpstreamError> {
        self.calls.lock().unwrap().push(artist.clone());
        if self.failing.contains(artist) {
            return Err(UpstreamError::Unavailable {
                status: 503,
                message: format!("no data for {}", artist),
            });
        }
        Ok(self.collaborators.get(artist).cloned().unwrap_or_default())
    }

    async fn fetch_details(&self, ids: &[ArtistId]) -> Result<Vec<EntityRecord>, UpstreamError> {
        Ok(ids.iter().map(|artist| self.details_for(artist)).collect())
    }
}

fn service(source: &Arc<FakeSource>) -> RouteService {
    RouteService::in_memory(source.clone(), &EngineConfig::default())
}

async fn collect(rx: &mut tokio::sync::mpsc::Receiver<ProgressEvent>) -> Vec<ProgressEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

// ---------------------------------------------------------------------------
// Search outcomes
// ---------------------------------------------------------------------------

#[tokio::test]
async fn same_artist_is_a_single_element_path() {
    let source = Arc::new(FakeSource::new());
    let service = service(&source);
    let s = source.record("s");

    let result = service.find_route(&s, &s, &NullNotifier, true).await.unwrap();
    assert_eq!(ids(&result.path), vec!["s"]);
    assert!(result.graph.is_none());
    assert!(source.calls().is_empty());
}

#[tokio::test]
async fn direct_hit_returns_two_hops() {
    init_tracing();
    let source = Arc::new(
        FakeSource::new()
            .link("s", &["a", "e"])
            .link("e", &["s", "b"])
            .popularity("s", 10)
            .popularity("e", 60),
    );
    let service = service(&source);

    let result = service
        .find_route(&source.record("s"), &source.record("e"), &NullNotifier, true)
        .await
        .unwrap();

    assert_eq!(ids(&result.path), vec!["s", "e"]);
    let graph = result.graph.unwrap();
    assert!(graph.edge(&id("s"), &id("e")).unwrap().in_route);
    assert!(!graph.edge(&id("s"), &id("a")).unwrap().in_route);
}

#[tokio::test]
async fn meets_in_the_middle_through_target_neighbor() {
    let source = Arc::new(
        FakeSource::new()
            .link("s", &["n", "x"])
            .link("e", &["n", "y"])
            .link("n", &["s", "e"])
            .popularity("s", 10)
            .popularity("e", 60),
    );
    let service = service(&source);

    let result = service
        .find_route(&source.record("s"), &source.record("e"), &NullNotifier, true)
        .await
        .unwrap();

    assert_eq!(ids(&result.path), vec!["s", "n", "e"]);
    assert_eq!(source.calls(), vec!["s", "e", "n"]);
}

#[tokio::test]
async fn exhausted_frontier_returns_empty_path() {
    let source = Arc::new(
        FakeSource::new()
            .link("s", &["a"])
            .link("a", &[])
            .link("e", &["b"])
            .popularity("s", 10)
            .popularity("e", 60),
    );
    let service = service(&source);

    let result = service
        .find_route(&source.record("s"), &source.record("e"), &NullNotifier, true)
        .await
        .unwrap();

    assert!(!result.is_found());
    assert!(result.path.is_empty());
    // Golden-set members are never expanded.
    assert_eq!(source.calls(), vec!["s", "e", "a"]);
    assert!(result.graph.is_some());
}

#[tokio::test]
async fn swapped_endpoints_are_reversed_back() {
    let source = Arc::new(
        FakeSource::new()
            .link("big", &["m"])
            .link("small", &["m"])
            .link("m", &["big", "small"])
            .popularity("big", 90)
            .popularity("small", 10),
    );
    let service = service(&source);

    let result = service
        .find_route(&source.record("big"), &source.record("small"), &NullNotifier, false)
        .await
        .unwrap();

    // The search starts from the less popular side.
    assert_eq!(source.calls()[0], "small");
    assert_eq!(ids(&result.path), vec!["big", "m", "small"]);
    assert!(result.graph.is_none());
}

#[tokio::test]
async fn multi_hop_route_sets_depths_and_route_edges() {
    let source = Arc::new(
        FakeSource::new()
            .link("s", &["a"])
            .link("a", &["s", "c"])
            .link("c", &["a", "g"])
            .link("g", &["e", "c"])
            .link("e", &["g"])
            .popularity("s", 10)
            .popularity("e", 60),
    );
    let service = service(&source);

    let result = service
        .find_route(&source.record("s"), &source.record("e"), &NullNotifier, true)
        .await
        .unwrap();

    assert_eq!(ids(&result.path), vec!["s", "a", "c", "g", "e"]);
    let graph = result.graph.unwrap();
    for (depth, artist) in ["s", "a", "c", "g", "e"].iter().enumerate() {
        assert_eq!(graph.node(&id(artist)).unwrap().depth, depth as i32, "{}", artist);
    }
    for pair in [("s", "a"), ("a", "c"), ("c", "g"), ("g", "e")] {
        assert!(graph.edge(&id(pair.0), &id(pair.1)).unwrap().in_route);
    }
}

#[tokio::test]
async fn heavier_candidate_is_expanded_first() {
    let source = Arc::new(
        FakeSource::new()
            .link("s", &["lo", "hi"])
            .link("lo", &["z"])
            .link("hi", &["g"])
            .link("e", &["g"])
            .popularity("s", 10)
            .popularity("e", 60)
            .popularity("lo", 5)
            .popularity("hi", 80)
            .genres("hi", &["rock"])
            .genres("e", &["rock"]),
    );
    let service = service(&source);

    let result = service
        .find_route(&source.record("s"), &source.record("e"), &NullNotifier, true)
        .await
        .unwrap();

    assert_eq!(ids(&result.path), vec!["s", "hi", "g", "e"]);
    assert!(!source.calls().contains(&"lo".to_string()));
}

#[tokio::test]
async fn upstream_failure_aborts_search() {
    let source = Arc::new(
        FakeSource::new()
            .link("s", &["a"])
            .link("e", &["b"])
            .failing("a")
            .popularity("s", 10)
            .popularity("e", 60),
    );
    let service = service(&source);

    let err = service
        .find_route(&source.record("s"), &source.record("e"), &NullNotifier, true)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        RouteError::Upstream(UpstreamError::Unavailable { status: 503, .. })
    ));
    assert!(err.is_fatal());
}

// ---------------------------------------------------------------------------
// Progress events
// ---------------------------------------------------------------------------

#[tokio::test]
async fn delta_events_arrive_in_order() {
    let source = Arc::new(
        FakeSource::new()
            .link("s", &["n", "x"])
            .link("e", &["n", "y"])
            .link("n", &["s", "e"])
            .popularity("s", 10)
            .popularity("e", 60),
    );
    let service = service(&source);
    let (notifier, mut rx) = ChannelNotifier::channel(64);

    service
        .find_route(&source.record("s"), &source.record("e"), &notifier, false)
        .await
        .unwrap();
    let events = collect(&mut rx).await;

    assert_eq!(events.first().unwrap().update_type, UpdateType::Start);
    assert_eq!(events.last().unwrap().update_type, UpdateType::Complete);
    assert!(events.iter().any(|e| e.update_type == UpdateType::Selection));
    assert!(events.iter().all(|e| !e.is_full_graph));

    let seen: HashSet<&str> = events
        .iter()
        .flat_map(|e| e.graph.nodes.iter().map(|n| n.id.as_str()))
        .collect();
    for artist in ["s", "n", "x", "e", "y"] {
        assert!(seen.contains(artist), "{} never appeared in a delta", artist);
    }
}

/// Refuses the first `refuse` events, then accepts everything.
struct Congested {
    refuse: Mutex<usize>,
    accepted: Mutex<Vec<ProgressEvent>>,
}

impl Congested {
    fn refusing(refuse: usize) -> Self {
        Congested {
            refuse: Mutex::new(refuse),
            accepted: Mutex::new(Vec::new()),
        }
    }
}

impl Notifier for Congested {
    fn notify(&self, event: ProgressEvent) -> bool {
        let mut refuse = self.refuse.lock().unwrap();
        if *refuse > 0 {
            *refuse -= 1;
            return false;
        }
        self.accepted.lock().unwrap().push(event);
        true
    }
}

type Nodes = HashMap<String, VisualNode>;
type Links = HashMap<(String, String), bool>;

fn undirected(source: &ArtistId, target: &ArtistId) -> (String, String) {
    let (a, b) = (source.as_str().to_string(), target.as_str().to_string());
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Applies payloads in order; later states of a node or link win.
fn replay<'a>(payloads: impl Iterator<Item = &'a GraphPayload>) -> (Nodes, Links) {
    let mut nodes = HashMap::new();
    let mut links = HashMap::new();
    for payload in payloads {
        for node in &payload.nodes {
            nodes.insert(node.id.as_str().to_string(), node.clone());
        }
        for link in &payload.links {
            links.insert(undirected(&link.source, &link.target), link.in_route);
        }
    }
    (nodes, links)
}

#[tokio::test]
async fn dropped_deltas_are_carried_by_later_events() {
    let world = || {
        Arc::new(
            FakeSource::new()
                .link("s", &["a", "x"])
                .link("a", &["s", "c"])
                .link("c", &["a", "g"])
                .link("e", &["g", "y"])
                .popularity("s", 10)
                .popularity("e", 60),
        )
    };

    let source = world();
    let notifier = Congested::refusing(3);
    service(&source)
        .find_route(&source.record("s"), &source.record("e"), &notifier, false)
        .await
        .unwrap();
    let accepted = notifier.accepted.into_inner().unwrap();
    assert!(accepted.len() > 1);
    assert_eq!(accepted.last().unwrap().update_type, UpdateType::Complete);

    let source = world();
    let expected = service(&source)
        .find_route(&source.record("s"), &source.record("e"), &NullNotifier, true)
        .await
        .unwrap()
        .graph
        .unwrap()
        .to_payload();

    let (nodes, links) = replay(accepted.iter().map(|e| &e.graph));
    let (full_nodes, full_links) = replay(std::iter::once(&expected));
    assert_eq!(nodes, full_nodes);
    assert_eq!(links, full_links);
}

#[tokio::test]
async fn full_graph_events_never_shrink() {
    let source = Arc::new(
        FakeSource::new()
            .link("s", &["a"])
            .link("a", &["s", "c"])
            .link("c", &["a", "g"])
            .link("e", &["g"])
            .popularity("s", 10)
            .popularity("e", 60),
    );
    let service = service(&source);
    let (notifier, mut rx) = ChannelNotifier::channel(64);

    service
        .find_route(&source.record("s"), &source.record("e"), &notifier, true)
        .await
        .unwrap();
    let events = collect(&mut rx).await;

    assert!(events.iter().all(|e| e.is_full_graph));
    let sizes: Vec<usize> = events.iter().map(|e| e.graph.nodes.len()).collect();
    assert!(sizes.windows(2).all(|w| w[0] <= w[1]), "{:?}", sizes);
}

#[tokio::test]
async fn exhausted_search_still_completes() {
    let source = Arc::new(
        FakeSource::new()
            .link("s", &[])
            .link("e", &["b"])
            .popularity("s", 10)
            .popularity("e", 60),
    );
    let service = service(&source);
    let (notifier, mut rx) = ChannelNotifier::channel(64);

    let result = service
        .find_route(&source.record("s"), &source.record("e"), &notifier, false)
        .await
        .unwrap();
    let events = collect(&mut rx).await;

    assert!(result.path.is_empty());
    assert_eq!(events.last().unwrap().update_type, UpdateType::Complete);
}

// ---------------------------------------------------------------------------
// Persistence and caching
// ---------------------------------------------------------------------------

#[tokio::test]
async fn route_and_edges_are_persisted() {
    let source = Arc::new(
        FakeSource::new()
            .link("s", &["n", "x"])
            .link("e", &["n", "y"])
            .link("n", &["s", "e"])
            .popularity("s", 10)
            .popularity("e", 60),
    );
    let service = service(&source);

    service
        .find_route(&source.record("s"), &source.record("e"), &NullNotifier, false)
        .await
        .unwrap();

    let store = service.store().lock().await;
    for artist in ["s", "n", "e"] {
        let stored = store.get(&id(artist)).unwrap().unwrap();
        assert!(stored.is_resolved(), "{} not resolved", artist);
        assert!(stored.last_updated.is_some());
    }
    assert!(store.find_edge(&id("n"), &id("s")).unwrap());
    assert!(store.find_edge(&id("e"), &id("y")).unwrap());
}

#[tokio::test]
async fn second_search_is_served_from_cache() {
    let source = Arc::new(
        FakeSource::new()
            .link("s", &["n", "x1", "x2"])
            .link("e", &["n", "y1", "y2"])
            .link("n", &["s", "e", "z"])
            .popularity("s", 10)
            .popularity("e", 60),
    );
    let service = service(&source);
    let (s, e) = (source.record("s"), source.record("e"));

    let first = service.find_route(&s, &e, &NullNotifier, false).await.unwrap();
    let calls_after_first = source.calls().len();
    let second = service.find_route(&s, &e, &NullNotifier, false).await.unwrap();

    assert_eq!(ids(&first.path), ids(&second.path));
    assert_eq!(calls_after_first, 3);
    assert_eq!(source.calls().len(), 3);
}

#[tokio::test]
async fn sqlite_cache_survives_a_new_service() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("artists.db");
    let path = path.to_str().unwrap();
    let source = Arc::new(
        FakeSource::new()
            .link("s", &["n", "x1", "x2"])
            .link("e", &["n", "y1", "y2"])
            .link("n", &["s", "e", "z"])
            .popularity("s", 10)
            .popularity("e", 60),
    );
    let (s, e) = (source.record("s"), source.record("e"));
    let config = EngineConfig::default();

    {
        let store = shared_store(SqliteStore::new(path).unwrap());
        let service = RouteService::new(source.clone(), store, &config);
        let result = service.find_route(&s, &e, &NullNotifier, false).await.unwrap();
        assert_eq!(ids(&result.path), vec!["s", "n", "e"]);
    }

    let store = shared_store(SqliteStore::new(path).unwrap());
    let service = RouteService::new(source.clone(), store, &config);
    let result = service.find_route(&s, &e, &NullNotifier, false).await.unwrap();

    assert_eq!(ids(&result.path), vec!["s", "n", "e"]);
    assert_eq!(source.calls().len(), 3);
}

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn dropped_observer_does_not_abort_search() {
    let source = Arc::new(
        FakeSource::new()
            .link("s", &["n"])
            .link("e", &["n"])
            .link("n", &["s", "e"])
            .popularity("s", 10)
            .popularity("e", 60),
    );
    let service = service(&source);

    let handle = service
        .start_search(source.record("s"), source.record("e"), false)
        .unwrap();
    let session = handle.session;
    drop(handle.events);
    handle.task.await.unwrap();

    let result = service.take_result(&session).unwrap().unwrap();
    assert_eq!(ids(&result.path), vec!["s", "n", "e"]);
    assert!(!service.sessions().is_active(&session));
}

#[tokio::test]
async fn background_search_streams_until_complete() {
    let source = Arc::new(
        FakeSource::new()
            .link("s", &["e"])
            .link("e", &["s"])
            .popularity("s", 10)
            .popularity("e", 60),
    );
    let service = service(&source);

    let mut handle = service
        .start_search(source.record("s"), source.record("e"), true)
        .unwrap();

    let mut last = None;
    while let Some(event) = handle.events.recv().await {
        last = Some(event.update_type);
    }
    // The channel closes once the search finishes and the session is torn down.
    assert_eq!(last, Some(UpdateType::Complete));
    handle.task.await.unwrap();
    assert!(service.take_result(&handle.session).unwrap().is_ok());
}

#[tokio::test]
async fn failed_background_search_keeps_its_error() {
    let source = Arc::new(
        FakeSource::new()
            .link("s", &["a"])
            .link("e", &["b"])
            .failing("a")
            .popularity("s", 10)
            .popularity("e", 60),
    );
    let service = service(&source);

    let handle = service
        .start_search(source.record("s"), source.record("e"), false)
        .unwrap();
    handle.task.await.unwrap();

    let outcome = service.take_result(&handle.session).unwrap();
    assert!(matches!(outcome, Err(RouteError::Upstream(_))));
}
