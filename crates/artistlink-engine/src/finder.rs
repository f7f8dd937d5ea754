//! Weighted best-first route search with a meet-in-the-middle shortcut.
//!
//! The search runs `INIT -> EXPAND_ENDPOINTS -> FRONTIER_LOOP` and ends in
//! `FOUND` (non-empty path) or `EXHAUSTED` (empty path). Both endpoints are
//! resolved first. The target's neighbors form the "golden set": reaching any
//! of them closes the route in one more hop. Expansion is strictly
//! sequential, so progress events are emitted in discovery order.

use std::collections::HashSet;
use std::sync::Arc;

use indexmap::IndexSet;
use tracing::{debug, info};

use artistlink_core::{
    absorb, ArtistId, Catalog, EntityRecord, GraphModel, GraphSnapshot, DEPTH_UNROUTED,
};
use artistlink_storage::{save_all, save_reachable};

use crate::error::RouteError;
use crate::frontier::{Frontier, FrontierEntry};
use crate::notifier::{Notifier, ProgressEvent, UpdateType};
use crate::resolver::{ConnectionResolver, Resolution};

/// A finished search.
#[derive(Debug, Clone, Default)]
pub struct RouteResult {
    /// Start to end inclusive, in the caller's orientation. Empty when no
    /// route was found.
    pub path: Vec<EntityRecord>,
    /// The final graph, in full-graph mode.
    pub graph: Option<GraphSnapshot>,
}

impl RouteResult {
    pub fn is_found(&self) -> bool {
        !self.path.is_empty()
    }

    pub fn ids(&self) -> Vec<ArtistId> {
        self.path.iter().map(|r| r.id.clone()).collect()
    }
}

/// How a route closes from an expanded node.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Closure {
    /// The node neighbors the target.
    Direct,
    /// The node neighbors a member of the golden set.
    Via(ArtistId),
}

/// Runs route searches against a shared resolver.
pub struct RouteFinder {
    resolver: Arc<ConnectionResolver>,
}

impl RouteFinder {
    pub fn new(resolver: Arc<ConnectionResolver>) -> Self {
        RouteFinder { resolver }
    }

    pub fn resolver(&self) -> &Arc<ConnectionResolver> {
        &self.resolver
    }

    /// Searches for a path from `start` to `end`.
    ///
    /// Events go to `notifier` and carry the full graph when `full_graph` is
    /// set, the delta since the previous event otherwise. Upstream failures
    /// abort the search; an exhausted frontier is an empty path.
    pub async fn find_route(
        &self,
        start: &EntityRecord,
        end: &EntityRecord,
        notifier: &dyn Notifier,
        full_graph: bool,
    ) -> Result<RouteResult, RouteError> {
        if start.id == end.id {
            return Ok(RouteResult {
                path: vec![start.clone()],
                graph: None,
            });
        }

        // Searching from the less popular side tends to be cheaper.
        let swapped = start.popularity > end.popularity;
        let (start, end) = if swapped { (end, start) } else { (start, end) };
        info!(start = %start.id, end = %end.id, swapped, "route search started");

        let mut search = Search::new(self.resolver.as_ref(), notifier, full_graph, end);
        let route = search.run(start).await?;

        if !route.is_empty() {
            search.post_process(&route).await?;
        }
        search.finish(&route)?;

        let mut path = search.records(&route);
        if swapped {
            path.reverse();
        }
        info!(
            hops = path.len().saturating_sub(1),
            found = !path.is_empty(),
            "route search finished"
        );

        Ok(RouteResult {
            path,
            graph: full_graph.then(|| search.graph.full().clone()),
        })
    }
}

/// Per-search state. Owned by one search and dropped with it.
struct Search<'a> {
    resolver: &'a ConnectionResolver,
    notifier: &'a dyn Notifier,
    full_graph: bool,
    graph: GraphModel,
    catalog: Catalog,
    end: EntityRecord,
    /// Resolved neighbors of the target.
    golden: IndexSet<ArtistId>,
    /// Expanded nodes that did not close a route.
    visited: HashSet<ArtistId>,
    frontier: Frontier,
}

impl<'a> Search<'a> {
    fn new(
        resolver: &'a ConnectionResolver,
        notifier: &'a dyn Notifier,
        full_graph: bool,
        end: &EntityRecord,
    ) -> Self {
        Search {
            resolver,
            notifier,
            full_graph,
            graph: GraphModel::new(),
            catalog: Catalog::new(),
            end: end.clone(),
            golden: IndexSet::new(),
            visited: HashSet::new(),
            frontier: Frontier::new(),
        }
    }

    /// Endpoint expansion and the frontier loop. Returns the route as ids in
    /// search orientation, or empty when exhausted.
    async fn run(&mut self, start: &EntityRecord) -> Result<Vec<ArtistId>, RouteError> {
        let end_id = self.end.id.clone();
        self.graph.add_entity(start, 0, &[]);
        self.emit(
            UpdateType::Start,
            format!("Starting route finding: {} -> {}", start.name, self.end.name),
            &start.id,
        );

        // EXPAND_ENDPOINTS
        let start_res = self.resolver.resolve(start, &self.catalog).await?;
        self.learn(&start_res, 0)?;
        self.persist(&start.id).await?;
        let start_record = start_res.record.clone();

        let end = self.end.clone();
        self.select(&end);
        let end_res = self.resolver.resolve(&end, &self.catalog).await?;
        self.golden = end_res.record.neighbor_ids().iter().cloned().collect();
        self.learn(&end_res, DEPTH_UNROUTED)?;
        self.persist(&end_id).await?;
        self.end = end_res.record.clone();
        debug!(golden = self.golden.len(), "target neighbors resolved");

        if start_record.has_neighbor(&end_id) {
            return Ok(vec![start_record.id, end_id]);
        }
        if let Some(closure) = self.check_if_complete(&start_record) {
            return self.close(Vec::new(), &start_record, 0, closure).await;
        }

        self.enqueue(&start_res.neighbors, 1, &[start_record.id.clone()]);

        // FRONTIER_LOOP
        let target = self.end.clone();
        while let Some(entry) = self.frontier.pop_best(&target) {
            debug!(
                artist = %entry.record.id,
                depth = entry.depth,
                weight = entry.weight.unwrap_or_default(),
                queued = self.frontier.len(),
                "expanding"
            );
            let current = match self.catalog.get(&entry.record.id) {
                Some(known) => known.clone(),
                None => entry.record.clone(),
            };
            self.select(&current);

            let resolution = self.resolver.resolve(&current, &self.catalog).await?;
            self.learn(&resolution, entry.depth as i32)?;
            self.persist(&current.id).await?;
            let record = resolution.record;

            if resolution.neighbors.is_empty() {
                self.visited.insert(record.id.clone());
                debug!(artist = %record.id, "dead end");
                continue;
            }

            if let Some(closure) = self.check_if_complete(&record) {
                return self.close(entry.path, &record, entry.depth, closure).await;
            }

            let mut path = entry.path;
            path.push(record.id.clone());
            self.enqueue(&resolution.neighbors, entry.depth + 1, &path);
        }

        // EXHAUSTED
        info!("frontier exhausted without a route");
        Ok(Vec::new())
    }

    /// Closes the route from `node`, or marks it visited.
    fn check_if_complete(&mut self, node: &EntityRecord) -> Option<Closure> {
        let end_id = &self.end.id;
        // The target lists `node` even if `node` does not list the target.
        if self.golden.contains(&node.id) {
            return Some(Closure::Direct);
        }
        for neighbor in node.neighbor_ids() {
            if neighbor == end_id {
                return Some(Closure::Direct);
            }
            if self.golden.contains(neighbor) {
                return Some(Closure::Via(neighbor.clone()));
            }
        }
        self.visited.insert(node.id.clone());
        None
    }

    /// Builds the final id route for a closure at `node`, resolving the
    /// bridging artist when the route goes through the golden set.
    async fn close(
        &mut self,
        mut route: Vec<ArtistId>,
        node: &EntityRecord,
        depth: u32,
        closure: Closure,
    ) -> Result<Vec<ArtistId>, RouteError> {
        route.push(node.id.clone());
        if let Closure::Via(bridge_id) = closure {
            let bridge = self
                .catalog
                .get(&bridge_id)
                .cloned()
                .unwrap_or_else(|| EntityRecord::stub(bridge_id.clone(), ""));
            let mut resolution = self.resolver.resolve(&bridge, &self.catalog).await?;
            // The source is not always symmetric: the target lists the bridge
            // but the bridge may not list the target.
            if !resolution.record.has_neighbor(&self.end.id) {
                resolution
                    .record
                    .neighbors
                    .get_or_insert_with(Vec::new)
                    .push(self.end.id.clone());
                resolution.neighbors.push(self.end.clone());
            }
            self.learn(&resolution, depth as i32 + 1)?;
            self.persist(&bridge_id).await?;
            route.push(bridge_id);
        }
        route.push(self.end.id.clone());
        info!(hops = route.len() - 1, "route found");
        Ok(route)
    }

    /// Backfills metadata for stubs on the route and persists every member.
    async fn post_process(&mut self, route: &[ArtistId]) -> Result<(), RouteError> {
        let needs_details = route
            .iter()
            .any(|id| self.catalog.get(id).map_or(true, EntityRecord::is_stub));
        if needs_details {
            let details = self.resolver.fetch_details(route).await?;
            debug!(fetched = details.len(), "backfilled route metadata");
            for detail in details {
                if let Some(record) = self.catalog.get_mut(&detail.id) {
                    record.apply_details(&detail);
                } else {
                    self.catalog.insert(detail.id.clone(), detail);
                }
            }
        }

        let records = self.records(route);
        let mut store = self.resolver.store().lock().await;
        save_all(&mut **store, &records)?;
        Ok(())
    }

    /// Writes route depths, finalizes the graph and emits the completion
    /// event.
    fn finish(&mut self, route: &[ArtistId]) -> Result<(), RouteError> {
        for (depth, id) in route.iter().enumerate() {
            if let Some(record) = self.catalog.get(id) {
                self.graph.add_entity(record, depth as i32, &[]);
            }
        }
        let end_id = self.end.id.clone();
        self.graph.finalize(&end_id, route)?;

        let message = if route.is_empty() {
            format!("No route found to {}", self.end.name)
        } else {
            format!("Route complete in {} link(s)", route.len() - 1)
        };
        self.emit(UpdateType::Complete, message, &end_id);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Bookkeeping
    // -----------------------------------------------------------------------

    /// Adds a resolution to the catalog and the graph, then emits.
    fn learn(&mut self, resolution: &Resolution, depth: i32) -> Result<(), RouteError> {
        absorb(&mut self.catalog, resolution.record.clone())?;
        for neighbor in &resolution.neighbors {
            absorb(&mut self.catalog, neighbor.clone())?;
            self.frontier.refresh(&self.catalog[&neighbor.id]);
        }
        let record = &self.catalog[&resolution.record.id];
        self.graph.add_entity(record, depth, &resolution.neighbors);

        let message = format!("Connections for {} added", record.name);
        let id = record.id.clone();
        self.emit(UpdateType::Route, message, &id);
        Ok(())
    }

    fn select(&mut self, record: &EntityRecord) {
        self.graph.set_selected(record);
        self.emit(
            UpdateType::Selection,
            format!("Artist selected for expansion: {}", record.name),
            &record.id,
        );
    }

    async fn persist(&self, id: &ArtistId) -> Result<(), RouteError> {
        let mut store = self.resolver.store().lock().await;
        save_reachable(&mut **store, id, &self.catalog, 1)?;
        Ok(())
    }

    fn emit(&mut self, update_type: UpdateType, message: String, id: &ArtistId) {
        let delta = self.graph.take_delta();
        let graph = if self.full_graph {
            self.graph.full().to_payload()
        } else {
            delta.to_payload()
        };
        let delivered = self.notifier.notify(ProgressEvent {
            update_type,
            message,
            entity_id: Some(id.clone()),
            graph,
            is_full_graph: self.full_graph,
        });
        // A dropped delta rides along with the next event instead.
        if !delivered && !self.full_graph {
            self.graph.requeue_delta(delta);
        }
    }

    /// Queues every neighbor not yet visited, queued or in the golden set.
    fn enqueue(&mut self, neighbors: &[EntityRecord], depth: u32, path: &[ArtistId]) {
        for neighbor in neighbors {
            if self.is_known(&neighbor.id) {
                continue;
            }
            let record = self.catalog.get(&neighbor.id).unwrap_or(neighbor).clone();
            self.frontier.push(FrontierEntry::new(record, depth, path.to_vec()));
        }
    }

    fn is_known(&self, id: &ArtistId) -> bool {
        self.visited.contains(id) || self.golden.contains(id) || self.frontier.contains(id)
    }

    fn records(&self, route: &[ArtistId]) -> Vec<EntityRecord> {
        route
            .iter()
            .map(|id| {
                self.catalog
                    .get(id)
                    .cloned()
                    .unwrap_or_else(|| EntityRecord::stub(id.clone(), ""))
            })
            .collect()
    }
}
