//! GraphModel: the discovered subgraph as shown to an observer.
//!
//! Two independent [`GraphSnapshot`]s are maintained:
//! - **full**: cumulative, never reset during a search
//! - **delta**: everything mutated since the last [`GraphModel::take_delta`]
//!
//! Every mutation applied to `full` is mirrored into `delta` in the same call,
//! so a consumer that only ever reads deltas reconstructs the full graph.
//!
//! # Depths
//!
//! A node's depth is its hop count from the search start. Two negative
//! sentinels mark nodes whose distance is unknown:
//! - [`DEPTH_UNROUTED`]: selected for expansion before any route reached it
//! - [`DEPTH_INDIRECT`]: discovered as a neighbor of an unrouted node
//!
//! Sentinels never overwrite a known depth, and a known depth only ever
//! shrinks. When a node's depth drops, the drop is carried outward to every
//! node reachable through it.

use std::collections::{HashMap, HashSet, VecDeque};

use petgraph::graph::NodeIndex;
use petgraph::stable_graph::StableGraph;
use petgraph::visit::{EdgeRef, IntoEdgeReferences};
use petgraph::Undirected;
use serde::{Deserialize, Serialize};

use crate::entity::EntityRecord;
use crate::error::CoreError;
use crate::id::ArtistId;

/// Depth sentinel: selected but not yet reached by a route.
pub const DEPTH_UNROUTED: i32 = -1;
/// Depth sentinel: discovered indirectly, distance unknown.
pub const DEPTH_INDIRECT: i32 = -2;

/// Display view of one artist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisualNode {
    pub id: ArtistId,
    pub name: String,
    pub depth: i32,
    /// Neighbors fully resolved.
    pub is_complete: bool,
    /// Currently being expanded. At most one node per model.
    pub is_selected: bool,
    pub connection_count: usize,
}

impl VisualNode {
    fn new(id: ArtistId, name: String, depth: i32) -> Self {
        VisualNode {
            id,
            name,
            depth,
            is_complete: false,
            is_selected: false,
            connection_count: 0,
        }
    }
}

/// Edge weight in the visual graph. Endpoints are implied by the graph.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisualEdge {
    /// Set during finalization for edges on the returned route.
    pub in_route: bool,
}

/// Serialized link: one entry per undirected edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkPayload {
    pub source: ArtistId,
    pub target: ArtistId,
    pub in_route: bool,
}

/// Wire form of a [`GraphSnapshot`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphPayload {
    pub nodes: Vec<VisualNode>,
    pub links: Vec<LinkPayload>,
}

/// A set of visual nodes (unique by id) and undirected edges (unique per pair).
#[derive(Debug, Clone, Default)]
pub struct GraphSnapshot {
    graph: StableGraph<VisualNode, VisualEdge, Undirected, u32>,
    index: HashMap<ArtistId, NodeIndex<u32>>,
}

impl GraphSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0 && self.graph.edge_count() == 0
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn node(&self, id: &ArtistId) -> Option<&VisualNode> {
        self.index.get(id).and_then(|&idx| self.graph.node_weight(idx))
    }

    fn node_mut(&mut self, id: &ArtistId) -> Option<&mut VisualNode> {
        let idx = *self.index.get(id)?;
        self.graph.node_weight_mut(idx)
    }

    /// Iterates nodes in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &VisualNode> {
        self.graph.node_indices().filter_map(|idx| self.graph.node_weight(idx))
    }

    /// Returns the edge between `a` and `b` in either orientation.
    pub fn edge(&self, a: &ArtistId, b: &ArtistId) -> Option<&VisualEdge> {
        let (&ia, &ib) = (self.index.get(a)?, self.index.get(b)?);
        let e = self.graph.find_edge(ia, ib)?;
        self.graph.edge_weight(e)
    }

    pub fn contains_edge(&self, a: &ArtistId, b: &ArtistId) -> bool {
        self.edge(a, b).is_some()
    }

    /// Ids adjacent to `id`.
    pub fn neighbors(&self, id: &ArtistId) -> Vec<&ArtistId> {
        match self.index.get(id) {
            Some(&idx) => self
                .graph
                .neighbors(idx)
                .map(|n| &self.graph[n].id)
                .collect(),
            None => Vec::new(),
        }
    }

    /// Inserts `node`, or overwrites the stored node with the same id.
    fn upsert_node(&mut self, node: VisualNode) {
        match self.index.get(&node.id) {
            Some(&idx) => self.graph[idx] = node,
            None => {
                let id = node.id.clone();
                let idx = self.graph.add_node(node);
                self.index.insert(id, idx);
            }
        }
    }

    /// Adds an edge between two present nodes. Returns `true` if added.
    fn ensure_edge(&mut self, a: &ArtistId, b: &ArtistId) -> bool {
        let (Some(&ia), Some(&ib)) = (self.index.get(a), self.index.get(b)) else {
            return false;
        };
        if ia == ib || self.graph.find_edge(ia, ib).is_some() {
            return false;
        }
        self.graph.add_edge(ia, ib, VisualEdge::default());
        true
    }

    /// Overwrites (or creates) the edge between two present nodes.
    fn set_edge(&mut self, a: &ArtistId, b: &ArtistId, weight: VisualEdge) {
        let (Some(&ia), Some(&ib)) = (self.index.get(a), self.index.get(b)) else {
            return;
        };
        match self.graph.find_edge(ia, ib) {
            Some(e) => self.graph[e] = weight,
            None => {
                self.graph.add_edge(ia, ib, weight);
            }
        }
    }

    pub fn to_payload(&self) -> GraphPayload {
        let nodes = self.nodes().cloned().collect();
        let links = self
            .graph
            .edge_references()
            .map(|e| LinkPayload {
                source: self.graph[e.source()].id.clone(),
                target: self.graph[e.target()].id.clone(),
                in_route: e.weight().in_route,
            })
            .collect();
        GraphPayload { nodes, links }
    }
}

impl Serialize for GraphSnapshot {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_payload().serialize(serializer)
    }
}

/// The per-search visualization model: full graph plus delta buffer.
#[derive(Debug, Default)]
pub struct GraphModel {
    full: GraphSnapshot,
    delta: GraphSnapshot,
    selected: Option<ArtistId>,
}

impl GraphModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cumulative graph.
    pub fn full(&self) -> &GraphSnapshot {
        &self.full
    }

    /// Id of the node currently selected for expansion.
    pub fn selected(&self) -> Option<&ArtistId> {
        self.selected.as_ref()
    }

    /// Inserts or refreshes the node for `entity` at `depth`, and links it to
    /// each of `neighbors`.
    ///
    /// Returns the entity's id when this call is the one that marked it
    /// complete (it has neighbors and was not complete before).
    pub fn add_entity(
        &mut self,
        entity: &EntityRecord,
        depth: i32,
        neighbors: &[EntityRecord],
    ) -> Option<ArtistId> {
        let has_neighbors = !neighbors.is_empty();
        let mut completed = None;

        let node = match self.full.node_mut(&entity.id) {
            Some(existing) => {
                existing.depth = reconcile_depth(existing.depth, depth);
                if !entity.name.is_empty() {
                    existing.name = entity.name.clone();
                }
                if has_neighbors {
                    existing.connection_count = neighbors.len();
                    if !existing.is_complete {
                        existing.is_complete = true;
                        completed = Some(entity.id.clone());
                    }
                }
                existing.clone()
            }
            None => {
                let mut node = VisualNode::new(entity.id.clone(), entity.name.clone(), depth);
                if has_neighbors {
                    node.is_complete = true;
                    node.connection_count = neighbors.len();
                    completed = Some(entity.id.clone());
                }
                self.full.upsert_node(node.clone());
                node
            }
        };
        self.delta.upsert_node(node);

        let child_depth = if depth >= 0 { depth + 1 } else { DEPTH_INDIRECT };
        let mut origins = vec![entity.id.clone()];
        for neighbor in neighbors.iter().filter(|n| n.id != entity.id) {
            let changed = match self.full.node_mut(&neighbor.id) {
                Some(existing) => {
                    let corrected = reconcile_depth(existing.depth, child_depth);
                    let changed = corrected != existing.depth;
                    existing.depth = corrected;
                    changed.then(|| existing.clone())
                }
                None => {
                    let node =
                        VisualNode::new(neighbor.id.clone(), neighbor.name.clone(), child_depth);
                    self.full.upsert_node(node.clone());
                    Some(node)
                }
            };
            if let Some(node) = changed {
                self.delta.upsert_node(node);
            }
            origins.push(neighbor.id.clone());
            if self.full.ensure_edge(&entity.id, &neighbor.id) {
                self.mirror_node(&neighbor.id);
                self.delta.ensure_edge(&entity.id, &neighbor.id);
            }
        }

        self.propagate_depth(origins);

        completed
    }

    /// Pushes known depths outward from `origins` until every reachable
    /// node holds at most one more than its shallowest neighbor.
    fn propagate_depth(&mut self, origins: Vec<ArtistId>) {
        let mut worklist: VecDeque<NodeIndex<u32>> = origins
            .iter()
            .filter_map(|id| self.full.index.get(id).copied())
            .collect();

        while let Some(idx) = worklist.pop_front() {
            let depth = self.full.graph[idx].depth;
            if depth < 0 {
                continue;
            }
            let adjacent: Vec<NodeIndex<u32>> = self.full.graph.neighbors(idx).collect();
            for next in adjacent {
                let current = self.full.graph[next].depth;
                let corrected = reconcile_depth(current, depth + 1);
                if corrected != current {
                    self.full.graph[next].depth = corrected;
                    let node = self.full.graph[next].clone();
                    self.delta.upsert_node(node);
                    worklist.push_back(next);
                }
            }
        }
    }

    /// Marks `entity` as the node under expansion.
    ///
    /// The previously selected node, if any, is deselected and marked
    /// complete. Unknown entities are inserted at [`DEPTH_UNROUTED`].
    pub fn set_selected(&mut self, entity: &EntityRecord) {
        if let Some(previous) = self.selected.take() {
            if previous != entity.id {
                if let Some(node) = self.full.node_mut(&previous) {
                    node.is_selected = false;
                    node.is_complete = true;
                }
                self.mirror_node(&previous);
            }
        }

        match self.full.node_mut(&entity.id) {
            Some(node) => node.is_selected = true,
            None => {
                let mut node =
                    VisualNode::new(entity.id.clone(), entity.name.clone(), DEPTH_UNROUTED);
                node.is_selected = true;
                self.full.upsert_node(node);
            }
        }
        self.mirror_node(&entity.id);
        self.selected = Some(entity.id.clone());
    }

    /// Returns everything changed since the previous call and resets the
    /// delta buffer to empty.
    pub fn take_delta(&mut self) -> GraphSnapshot {
        std::mem::take(&mut self.delta)
    }

    /// Puts a delta that never reached the observer back into the buffer.
    ///
    /// Nodes and edges are re-read from the full graph, so anything changed
    /// since `undelivered` was taken is requeued in its current state.
    pub fn requeue_delta(&mut self, undelivered: GraphSnapshot) {
        for node in undelivered.nodes() {
            self.mirror_node(&node.id);
        }
        for edge in undelivered.graph.edge_references() {
            let a = &undelivered.graph[edge.source()].id;
            let b = &undelivered.graph[edge.target()].id;
            if let Some(&weight) = self.full.edge(a, b) {
                self.mirror_node(a);
                self.mirror_node(b);
                self.delta.set_edge(a, b, weight);
            }
        }
    }

    /// Resolves leftover sentinels around `end` and flags route edges.
    ///
    /// Every neighbor of `end` still holding a negative depth gets
    /// `end.depth + 1` (when `end`'s own depth is known). Every edge whose
    /// endpoints both lie on `route` is marked `in_route`.
    pub fn finalize(&mut self, end: &ArtistId, route: &[ArtistId]) -> Result<(), CoreError> {
        let end_idx = *self
            .full
            .index
            .get(end)
            .ok_or_else(|| CoreError::NodeNotFound { id: end.clone() })?;
        let end_depth = self.full.graph[end_idx].depth;

        if end_depth >= 0 {
            let adjacent: Vec<NodeIndex<u32>> = self.full.graph.neighbors(end_idx).collect();
            for idx in adjacent {
                if self.full.graph[idx].depth < 0 {
                    self.full.graph[idx].depth = end_depth + 1;
                    let node = self.full.graph[idx].clone();
                    self.delta.upsert_node(node);
                }
            }
        }

        let members: HashSet<&ArtistId> = route.iter().collect();
        let on_route: Vec<(ArtistId, ArtistId)> = self
            .full
            .graph
            .edge_references()
            .filter_map(|e| {
                let a = &self.full.graph[e.source()].id;
                let b = &self.full.graph[e.target()].id;
                (members.contains(a) && members.contains(b)).then(|| (a.clone(), b.clone()))
            })
            .collect();

        for (a, b) in on_route {
            self.full.set_edge(&a, &b, VisualEdge { in_route: true });
            self.mirror_node(&a);
            self.mirror_node(&b);
            self.delta.set_edge(&a, &b, VisualEdge { in_route: true });
        }

        #[cfg(debug_assertions)]
        self.assert_consistency()?;

        Ok(())
    }

    /// Copies the current full-graph state of `id` into the delta.
    fn mirror_node(&mut self, id: &ArtistId) {
        if let Some(node) = self.full.node(id) {
            let node = node.clone();
            self.delta.upsert_node(node);
        }
    }

    #[cfg(debug_assertions)]
    fn assert_consistency(&self) -> Result<(), CoreError> {
        for node in self.delta.nodes() {
            if self.full.node(&node.id).is_none() {
                return Err(CoreError::GraphInconsistency {
                    reason: format!("delta node '{}' missing from full graph", node.id),
                });
            }
        }
        Ok(())
    }
}

/// Sentinels never replace a known depth; known depths only shrink.
fn reconcile_depth(current: i32, proposed: i32) -> i32 {
    match (current >= 0, proposed >= 0) {
        (_, false) => current,
        (false, true) => proposed,
        (true, true) => current.min(proposed),
    }
}
